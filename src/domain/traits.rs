// ============================================================
// Layer 3 — Collaborator Traits
// ============================================================
// The core talks to storage and notification only through these
// traits. Concrete implementations live in the infra layer:
//
//   CorpusStore      → SqliteCorpusStore, InMemoryCorpusStore
//   ArtifactStore    → FsArtifactStore
//   NotificationSink → TracingNotifier, ChannelNotifier
//
// All three are `Send + Sync` so the coordinator can hand them to
// its worker thread behind an `Arc`.

use serde_json::Value;

use crate::domain::bundle::ModelArtifactBundle;
use crate::domain::example::{
    ExampleId, NewExample, TrainingExample, TrainingSession, ValidationStatus,
};
use crate::error::Result;

// ─── CorpusStore ──────────────────────────────────────────────────────────────
/// Labelled corpus plus training history.
pub trait CorpusStore: Send + Sync {
    /// Rows with `consumed = false` and `validation_status = approved`,
    /// in insertion order.
    fn fetch_unconsumed_approved(&self) -> Result<Vec<TrainingExample>>;

    /// Flip `consumed` to true for the given rows. Returns rows updated.
    fn mark_consumed(&self, ids: &[ExampleId]) -> Result<usize>;

    /// Insert a new row and return its id.
    fn append_submission(&self, example: NewExample) -> Result<ExampleId>;

    /// Append one record to the training history.
    fn append_training_session(&self, session: &TrainingSession) -> Result<()>;

    /// Move a row between pending / approved / rejected.
    fn set_validation_status(&self, id: ExampleId, status: ValidationStatus) -> Result<()>;

    /// Page through every row, newest first. `page` starts at 1.
    fn list_examples(&self, page: usize, per_page: usize) -> Result<Vec<TrainingExample>>;

    /// All recorded training sessions, oldest first.
    fn training_history(&self) -> Result<Vec<TrainingSession>>;
}

// ─── ArtifactStore ────────────────────────────────────────────────────────────
/// Durable home of the served bundle.
pub trait ArtifactStore: Send + Sync {
    /// The current bundle, or `None` when nothing was ever saved.
    fn load_bundle(&self) -> Result<Option<ModelArtifactBundle>>;

    /// Persist `bundle` and make it current. Readers observe either the
    /// previous bundle or this one, never a partial write.
    fn save_bundle(&self, bundle: &ModelArtifactBundle) -> Result<()>;

    /// Housekeeping: drop bundles that are no longer current.
    fn delete_stale_bundles(&self) -> Result<usize> {
        Ok(0)
    }
}

// ─── NotificationSink ─────────────────────────────────────────────────────────
/// Fire-and-forget event broadcast. Callers log and ignore errors.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, event: &str, payload: Value) -> Result<()>;
}
