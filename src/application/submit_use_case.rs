// ============================================================
// Layer 2 — SubmitUseCase
// ============================================================
// Gatekept entry point into the corpus:
//
//   validate_training_pair → reject with the full issue list, or
//   append_submission      → pending row (approved when trusted)
//   publish                → training_data_added
//
// Rejected pairs never reach the store.

use std::sync::Arc;

use serde_json::json;

use crate::data::gatekeeper::validate_training_pair;
use crate::domain::example::{ExampleId, NewExample, ValidationStatus};
use crate::domain::traits::{CorpusStore, NotificationSink};
use crate::error::{PipelineError, Result};

pub const EVENT_DATA_ADDED: &str = "training_data_added";

pub struct SubmitUseCase {
    corpus:   Arc<dyn CorpusStore>,
    notifier: Arc<dyn NotificationSink>,
}

impl SubmitUseCase {
    pub fn new(corpus: Arc<dyn CorpusStore>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self { corpus, notifier }
    }

    /// Gatekeep and store one pair. `trusted` submissions skip review and
    /// land as approved.
    pub fn submit(&self, mut example: NewExample, trusted: bool) -> Result<ExampleId> {
        let verdict = validate_training_pair(&example.problem_text, &example.solution_text);
        if !verdict.accepted {
            tracing::info!("Submission rejected: {}", verdict.issues.join("; "));
            return Err(PipelineError::ValidationFailure { issues: verdict.issues });
        }

        example.problem_text  = example.problem_text.trim().to_string();
        example.solution_text = example.solution_text.trim().to_string();
        example.validation_status = if trusted {
            ValidationStatus::Approved
        } else {
            ValidationStatus::Pending
        };

        let problem_text = example.problem_text.clone();
        let contributor  = example.contributor.clone();
        let id = self.corpus.append_submission(example)?;
        tracing::info!("Stored submission {} from {}", id, contributor);

        let payload = json!({ "id": id, "problem_text": problem_text, "contributor": contributor });
        if let Err(e) = self.notifier.publish(EVENT_DATA_ADDED, payload) {
            tracing::warn!("Dropping '{}' notification: {e}", EVENT_DATA_ADDED);
        }
        Ok(id)
    }

    /// Move a stored row between review states.
    pub fn review(&self, id: ExampleId, status: ValidationStatus) -> Result<()> {
        self.corpus.set_validation_status(id, status)?;
        tracing::info!("Row {} marked {}", id, status);
        Ok(())
    }
}
