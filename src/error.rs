// ============================================================
// Error Taxonomy
// ============================================================
// Every layer below the CLI returns `Result<T, PipelineError>`.
// The CLI converts into anyhow::Error and adds context there.
//
// Recoverable kinds (ValidationFailure, UnknownLabel,
// TrainingInProgress) are ordinary values callers match on;
// the rest abort the operation that raised them and nothing more.

use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used throughout the core layers.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A corpus pair or a prediction failed gatekeeping.
    #[error("validation failed: {}", issues.join("; "))]
    ValidationFailure { issues: Vec<String> },

    /// Training aborted before any artifact was touched.
    #[error("insufficient training data: {found} qualifying rows, at least {required} required")]
    InsufficientData { found: usize, required: usize },

    /// The config record and the artifact cardinalities disagree.
    #[error("artifact mismatch: {0}")]
    ArtifactMismatch(String),

    /// One of the four bundle parts is absent.
    #[error("bundle part '{part}' is missing at {}", path.display())]
    ArtifactMissing { part: &'static str, path: PathBuf },

    /// Encode-time lookup miss in a fitted label space.
    #[error("solution was never seen while fitting the label space: {0:?}")]
    UnknownLabel(String),

    /// A second start request arrived while a job is running.
    #[error("training job {training_id} is already in progress")]
    TrainingInProgress { training_id: String },

    #[error("training job {0} was cancelled")]
    Cancelled(String),

    #[error("no model is loaded")]
    NotLoaded,

    #[error("no corpus row with id {0}")]
    ExampleNotFound(i64),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("corpus store error: {0}")]
    Corpus(#[from] rusqlite::Error),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("notification sink error: {0}")]
    Notify(String),
}

impl PipelineError {
    /// Wrap an `io::Error` together with the path that produced it.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
