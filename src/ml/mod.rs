// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Model code that talks to Burn tensors lives here, plus the
// batcher in the data layer.
//
//   model.rs      — Embedding → BiLSTM → masked mean pool →
//                   dense/ReLU → linear head over the label space
//
//   trainer.rs    — Mini-batch Adam loop with early stopping
//                   (best weights restored) and LR decay on
//                   plateau of the monitored loss
//
//   inferencer.rs — Frozen scorer loaded from a bundle; softmax
//                   and a lowest-index argmax tie-break
//
//   evaluation.rs — Accuracy and support-weighted P/R/F1
//
// Both backends run on the CPU via ndarray, so training and
// serving work without a GPU and in tests.
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Hochreiter & Schmidhuber (1997) LSTM

use burn::backend::{Autodiff, NdArray};

/// Backend used for gradient-based fitting.
pub type TrainBackend = Autodiff<NdArray>;

/// Backend used for validation and serving (no autodiff overhead).
pub type InferBackend = NdArray;

/// Bidirectional LSTM classifier
pub mod model;

/// Training loop with early stopping and LR decay
pub mod trainer;

/// Frozen scorer built from an artifact bundle
pub mod inferencer;

/// Accuracy and weighted precision/recall/F1
pub mod evaluation;
