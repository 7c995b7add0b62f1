// ============================================================
// Layer 3 — TrainingExample Domain Type
// ============================================================
// One labelled (problem, solution) row of the corpus.
//
// Rows are created by the submission flow, approved or rejected
// by a reviewer, and flipped to `consumed` exactly once: the
// first time they are part of a training run that completed.
// The core never deletes rows.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Row identifier assigned by the corpus store.
pub type ExampleId = i64;

/// How hard the contributor judged the problem to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" => Ok(Difficulty::Beginner),
            "intermediate" => Ok(Difficulty::Intermediate),
            "advanced" => Ok(Difficulty::Advanced),
            other => Err(format!("unknown difficulty '{other}'")),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Review state of a corpus row. Only `Approved` rows are trainable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Pending => "pending",
            ValidationStatus::Approved => "approved",
            ValidationStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for ValidationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(ValidationStatus::Pending),
            "approved" => Ok(ValidationStatus::Approved),
            "rejected" => Ok(ValidationStatus::Rejected),
            other => Err(format!("unknown validation status '{other}'")),
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A corpus row as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub id: ExampleId,
    pub problem_text: String,
    pub solution_text: String,
    pub concepts: BTreeSet<String>,
    pub difficulty: Difficulty,
    pub contributor: String,
    /// RFC 3339 timestamp set by the store on insert.
    pub created_at: String,
    pub consumed: bool,
    pub validation_status: ValidationStatus,
}

impl TrainingExample {
    /// Rows the Training Job is allowed to pull.
    pub fn is_trainable(&self) -> bool {
        !self.consumed && self.validation_status == ValidationStatus::Approved
    }
}

/// A submission before the store has assigned an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExample {
    pub problem_text: String,
    pub solution_text: String,
    #[serde(default)]
    pub concepts: BTreeSet<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default = "anonymous")]
    pub contributor: String,
    #[serde(default)]
    pub validation_status: ValidationStatus,
}

fn anonymous() -> String {
    "Anonymous".to_string()
}

impl NewExample {
    pub fn new(problem_text: impl Into<String>, solution_text: impl Into<String>) -> Self {
        Self {
            problem_text: problem_text.into(),
            solution_text: solution_text.into(),
            concepts: BTreeSet::new(),
            difficulty: Difficulty::default(),
            contributor: anonymous(),
            validation_status: ValidationStatus::default(),
        }
    }

    pub fn approved(mut self) -> Self {
        self.validation_status = ValidationStatus::Approved;
        self
    }

    pub fn with_concepts<I, S>(mut self, concepts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.concepts = concepts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_contributor(mut self, contributor: impl Into<String>) -> Self {
        self.contributor = contributor.into();
        self
    }
}

/// One row of the persistent training history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSession {
    pub training_id: String,
    pub model_name: String,
    pub version: String,
    pub accuracy: f64,
    pub corpus_size: usize,
    pub duration_secs: f64,
    pub created_at: String,
}
