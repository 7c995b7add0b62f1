// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records per-epoch training metrics to a CSV file.
//
// Metrics recorded per epoch:
//   - epoch:         the epoch number (1, 2, 3, ...)
//   - train_loss:    mean cross-entropy over training batches
//   - val_loss:      mean cross-entropy over the validation split
//                    (NaN when the split is empty)
//   - val_accuracy:  fraction of validation rows classified correctly
//   - learning_rate: rate used for this epoch, after any decay
//
// Output file: <metrics_dir>/metrics.csv
//
//   epoch,train_loss,val_loss,val_accuracy,learning_rate
//   1,2.302500,2.298100,0.100000,0.001000
//   2,2.101700,2.154300,0.250000,0.001000
//
// Logging is best-effort from the trainer's point of view: a
// failed write is reported with a warning and training goes on.

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

const HEADER: &str = "epoch,train_loss,val_loss,val_accuracy,learning_rate";

/// One row of metrics data for a single training epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// The epoch number (starts at 1)
    pub epoch: usize,

    /// Average cross-entropy loss over all training batches
    pub train_loss: f64,

    /// Average cross-entropy loss on the validation split
    pub val_loss: f64,

    /// Fraction of validation rows whose argmax matches the label
    pub val_accuracy: f64,

    pub learning_rate: f64,
}

impl EpochMetrics {
    /// The loss early stopping and LR decay watch: validation loss
    /// when a validation split exists, training loss otherwise.
    pub fn monitored_loss(&self) -> f64 {
        if self.val_loss.is_finite() { self.val_loss } else { self.train_loss }
    }

    /// Returns true if this epoch improved over the previous best monitored loss
    pub fn is_improvement(&self, best_loss: f64) -> bool {
        self.monitored_loss() < best_loss
    }
}

/// Appends epoch metrics to `metrics.csv` in a directory.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet, so repeated
    /// runs append to one log.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path).map_err(|e| PipelineError::io(&csv_path, e))?;
            writeln!(f, "{HEADER}").map_err(|e| PipelineError::io(&csv_path, e))?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    /// Append one epoch's metrics as a new row in the CSV.
    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .map_err(|e| PipelineError::io(&self.csv_path, e))?;

        writeln!(
            f,
            "{},{:.6},{:.6},{:.6},{:.6}",
            m.epoch, m.train_loss, m.val_loss, m.val_accuracy, m.learning_rate,
        )
        .map_err(|e| PipelineError::io(&self.csv_path, e))?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, val_loss={:.4}",
            m.epoch,
            m.train_loss,
            m.val_loss,
        );

        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(epoch: usize, train_loss: f64, val_loss: f64) -> EpochMetrics {
        EpochMetrics { epoch, train_loss, val_loss, val_accuracy: 0.5, learning_rate: 1e-3 }
    }

    #[test]
    fn test_is_improvement() {
        let m = metrics(2, 2.5, 2.3);
        // 2.3 < 3.0 → this is an improvement
        assert!(m.is_improvement(3.0));
        // 2.3 is NOT less than 2.0 → not an improvement
        assert!(!m.is_improvement(2.0));
    }

    #[test]
    fn test_monitor_falls_back_to_train_loss() {
        let m = metrics(1, 1.5, f64::NAN);
        assert_eq!(m.monitored_loss(), 1.5);
    }

    #[test]
    fn test_log_appends_rows_after_header() {
        let dir = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path()).unwrap();
        logger.log(&metrics(1, 2.0, 1.9)).unwrap();
        logger.log(&metrics(2, 1.0, 0.9)).unwrap();

        // A second logger on the same directory keeps the existing rows.
        let again = MetricsLogger::new(dir.path()).unwrap();
        let text = std::fs::read_to_string(again.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], HEADER);
        assert!(lines[2].starts_with("2,1.000000,0.900000"));
    }
}
