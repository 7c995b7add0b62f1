// ============================================================
// Layer 3 — Model Artifact Bundle
// ============================================================
// The four artifacts a served model needs, moved around as one
// value. A bundle whose config disagrees with its own vocabulary
// or label space is rejected by `check_consistency`, never
// patched up.

use serde::{Deserialize, Serialize};

use crate::data::label_space::LabelSpace;
use crate::data::vocabulary::Vocabulary;
use crate::error::{PipelineError, Result};

pub const ARCHITECTURE_ID: &str = "bilstm_meanpool_v1";

/// Architecture and provenance record saved next to the weights.
/// Enough to rebuild the model shape before loading weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleConfig {
    pub max_sequence_length: usize,
    pub vocab_size: usize,
    pub embedding_dim: usize,
    pub hidden_dim: usize,
    pub dense_dim: usize,
    pub architecture_id: String,
    pub trained_at: String,
    pub num_classes: usize,
    pub training_id: String,
}

#[derive(Debug, Clone)]
pub struct ModelArtifactBundle {
    /// Burn record bytes (BinBytesRecorder, full precision).
    pub model_weights: Vec<u8>,
    pub vocabulary: Vocabulary,
    pub label_space: LabelSpace,
    pub config: BundleConfig,
}

impl ModelArtifactBundle {
    /// Check the config record against the artifacts it describes.
    pub fn check_consistency(&self) -> Result<()> {
        if self.model_weights.is_empty() {
            return Err(PipelineError::ArtifactMismatch(
                "model weights are empty".to_string(),
            ));
        }
        if self.config.architecture_id != ARCHITECTURE_ID {
            return Err(PipelineError::ArtifactMismatch(format!(
                "unsupported architecture '{}' (expected '{ARCHITECTURE_ID}')",
                self.config.architecture_id
            )));
        }
        let vocab_len = self.vocabulary.len();
        if vocab_len != self.config.vocab_size {
            return Err(PipelineError::ArtifactMismatch(format!(
                "config records vocab_size={} but vocabulary holds {vocab_len} tokens",
                self.config.vocab_size
            )));
        }
        let classes = self.label_space.len();
        if classes != self.config.num_classes {
            return Err(PipelineError::ArtifactMismatch(format!(
                "config records num_classes={} but label space holds {classes} labels",
                self.config.num_classes
            )));
        }
        Ok(())
    }
}
