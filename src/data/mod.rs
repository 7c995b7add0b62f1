// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between a raw (problem, solution) row and a tensor
// batch ready for the model.
//
//   corpus rows
//       │
//       ▼
//   Gatekeeper        → rejects unusable pairs, scores predictions
//       │
//       ▼
//   Normalizer        → canonical text for inputs and labels
//       │
//       ▼
//   Vocabulary        → words to fixed-length id sequences
//   LabelSpace        → solution strings to class indices
//       │
//       ▼
//   Splitter          → stratified train / validation split
//       │
//       ▼
//   ClassDataset      → vectorised samples behind Burn's Dataset trait
//       │
//       ▼
//   ClassBatcher      → Burn Batcher, stacks samples into tensors
//
// Each module is responsible for exactly one step.

/// Canonicalises problem and solution text
pub mod normalizer;

/// Validation rules for training pairs and predictions
pub mod gatekeeper;

/// Frequency-ranked word vocabulary backed by a WordLevel tokenizer
pub mod vocabulary;

/// Bijection between solution strings and class indices
pub mod label_space;

/// Stratified train/validation split
pub mod splitter;

/// Vectorised samples served to the DataLoader
pub mod dataset;

/// Stacks samples into tensor batches
pub mod batcher;
