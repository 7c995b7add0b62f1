// ============================================================
// Layer 3 — Prediction Domain Types
// ============================================================
// What the Inference Service hands back per query. Nothing in
// here is persisted by the core.

use serde::{Deserialize, Serialize};

/// Grade attached to a prediction by the gatekeeper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub confidence: f32,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

impl ValidationReport {
    pub fn new(confidence: f32) -> Self {
        Self {
            valid: true,
            confidence,
            issues: Vec::new(),
            warnings: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    /// Record an issue; any issue invalidates the report.
    pub fn reject(&mut self, issue: impl Into<String>) {
        self.valid = false;
        self.issues.push(issue.into());
    }
}

/// Full answer for one problem statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub solution: String,
    /// Softmax probability of the chosen class, in [0, 1].
    pub confidence: f32,
    pub concepts: Vec<String>,
    pub steps: Vec<String>,
    pub explanation: Vec<String>,
    pub variables: Vec<String>,
    pub processed_problem: String,
    pub model_loaded: bool,
    pub validation: ValidationReport,
    /// Wall-clock seconds spent producing this result.
    pub processing_time: f64,
}

/// One entry of a batch prediction. A failure is local to its entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub problem: String,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BatchOutcome {
    Ok(PredictionResult),
    Error { error: String },
}

impl BatchEntry {
    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Ok(_))
    }
}

/// Summary of the currently served bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModelInfo {
    NotLoaded,
    Loaded {
        vocab_size: usize,
        max_sequence_length: usize,
        embedding_dim: usize,
        architecture: String,
        classes: usize,
        trained_at: String,
        training_id: String,
    },
}

impl ModelInfo {
    pub fn is_loaded(&self) -> bool {
        matches!(self, ModelInfo::Loaded { .. })
    }
}
