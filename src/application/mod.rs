// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates the other layers to accomplish one
// goal each: train, answer, or accept a submission.
//
// Rules for this layer:
//   - No ML math or model code here
//   - No UI or printing here (that's Layer 1)
//   - Storage and notification only through the domain traits
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// The training job state machine
pub mod train_use_case;

// Single-flight background runner for the training job
pub mod coordinator;

// The inference service
pub mod ask_use_case;

// Gatekept corpus submissions
pub mod submit_use_case;

// Concept, step and explanation tables
pub mod explain;
