// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain structs, enums and traits describing what the system
// works with. No Burn types, no file or database access.
//
//   example.rs    — corpus rows, submissions, training history
//   prediction.rs — prediction results and validation reports
//   job_state.rs  — the shared training status record
//   bundle.rs     — the four-part model artifact bundle
//   traits.rs     — corpus / artifact / notification contracts

pub mod bundle;
pub mod example;
pub mod job_state;
pub mod prediction;
pub mod traits;
