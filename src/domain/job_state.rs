// ============================================================
// Layer 3 — Training Job State
// ============================================================
// The process-wide status record for training. Exactly one
// writer (the coordinator) mutates it; everyone else reads a
// cloned snapshot.

use serde::{Deserialize, Serialize};

/// Phases of one training run, in the order they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPhase {
    Idle,
    Loading,
    Preparing,
    Fitting,
    Evaluating,
    Persisting,
}

impl JobPhase {
    /// Progress value published on entering the phase.
    pub fn entry_progress(&self) -> u8 {
        match self {
            JobPhase::Idle => 0,
            JobPhase::Loading => 5,
            JobPhase::Preparing => 15,
            JobPhase::Fitting => 20,
            JobPhase::Evaluating => 85,
            JobPhase::Persisting => 95,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobPhase::Idle => "idle",
            JobPhase::Loading => "loading corpus",
            JobPhase::Preparing => "preparing examples",
            JobPhase::Fitting => "fitting model",
            JobPhase::Evaluating => "evaluating model",
            JobPhase::Persisting => "persisting bundle",
        }
    }
}

/// Snapshot of the training status, as served to pollers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingJobState {
    pub is_training: bool,
    pub progress: u8,
    pub message: String,
    pub training_id: Option<String>,
    pub phase: JobPhase,
}

impl Default for TrainingJobState {
    fn default() -> Self {
        Self {
            is_training: false,
            progress: 0,
            message: "Idle".to_string(),
            training_id: None,
            phase: JobPhase::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_progress_is_monotone() {
        let phases = [
            JobPhase::Idle,
            JobPhase::Loading,
            JobPhase::Preparing,
            JobPhase::Fitting,
            JobPhase::Evaluating,
            JobPhase::Persisting,
        ];
        for pair in phases.windows(2) {
            assert!(pair[0].entry_progress() < pair[1].entry_progress());
        }
    }

    #[test]
    fn test_default_state_is_idle() {
        let s = TrainingJobState::default();
        assert!(!s.is_training);
        assert_eq!(s.training_id, None);
        assert_eq!(s.phase, JobPhase::Idle);
    }
}
