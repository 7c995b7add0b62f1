// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the subcommands and all their configurable flags:
//
//   train    → run one training job in the foreground
//   ask      → answer one problem
//   batch    → answer every line of a file
//   submit   → gatekeep and store a new pair
//   review   → approve / reject a stored pair
//   validate → run the gatekeeper without storing anything
//   status   → served model, training history, recent rows
//   prune    → delete bundles that are no longer current
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, etc.)
//
// Reference: Rust Book §12 (Building a CLI Program)

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::application::train_use_case::TrainConfig;
use crate::domain::example::{Difficulty, ValidationStatus};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a new model bundle on the approved, unconsumed corpus
    Train(TrainArgs),

    /// Predict the solution for one problem
    Ask(AskArgs),

    /// Predict solutions for every non-empty line of a file
    Batch(BatchArgs),

    /// Submit a new problem/solution pair to the corpus
    Submit(SubmitArgs),

    /// Set the review status of a stored pair
    Review(ReviewArgs),

    /// Check a problem/solution pair against the gatekeeper
    Validate(ValidateArgs),

    /// Show the served model, training history and recent corpus rows
    Status(StatusArgs),

    /// Delete stale model bundles
    Prune,
}

/// All arguments for the `train` command.
/// Each field becomes a --flag on the command line.
#[derive(Args, Debug, Clone)]
pub struct TrainArgs {
    /// JSON file with a full TrainConfig; replaces every flag below
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Fixed token length of every problem sequence
    #[arg(long, default_value_t = 128)]
    pub max_seq_len: usize,

    /// Vocabulary cap, including [PAD] and [UNK]
    #[arg(long, default_value_t = 10_000)]
    pub vocab_size: usize,

    #[arg(long, default_value_t = 128)]
    pub embedding_dim: usize,

    /// Per-direction LSTM width
    #[arg(long, default_value_t = 64)]
    pub hidden_dim: usize,

    #[arg(long, default_value_t = 128)]
    pub dense_dim: usize,

    #[arg(long, default_value_t = 0.3)]
    pub dropout: f64,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    /// Upper bound on epochs; early stopping usually ends sooner
    #[arg(long, default_value_t = 100)]
    pub epochs: usize,

    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    /// Epochs without improvement before training stops
    #[arg(long, default_value_t = 10)]
    pub patience: usize,

    /// Share of each class held out for validation
    #[arg(long, default_value_t = 0.2)]
    pub val_fraction: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Write per-epoch metrics.csv into this directory
    #[arg(long)]
    pub metrics_dir: Option<PathBuf>,
}

/// Converts CLI arguments into the application-level TrainConfig.
/// This keeps Layer 1 and Layer 2 decoupled; Layer 2 never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            max_sequence_length:     a.max_seq_len,
            vocab_size:              a.vocab_size,
            embedding_dim:           a.embedding_dim,
            hidden_dim:              a.hidden_dim,
            dense_dim:               a.dense_dim,
            dropout:                 a.dropout,
            batch_size:              a.batch_size,
            max_epochs:              a.epochs,
            learning_rate:           a.lr,
            early_stopping_patience: a.patience,
            validation_fraction:     a.val_fraction,
            seed:                    a.seed,
            metrics_dir:             a.metrics_dir,
            ..TrainConfig::default()
        }
    }
}

#[derive(Args, Debug)]
pub struct AskArgs {
    /// The problem statement
    #[arg(long, short)]
    pub problem: String,

    /// Print concepts, steps and the validation report as JSON
    #[arg(long)]
    pub explain: bool,
}

#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Text file with one problem per line
    #[arg(long, short)]
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct SubmitArgs {
    #[arg(long, short)]
    pub problem: String,

    #[arg(long, short)]
    pub solution: String,

    /// Comma-separated concept tags
    #[arg(long, value_delimiter = ',')]
    pub concepts: Vec<String>,

    #[arg(long, default_value = "intermediate")]
    pub difficulty: Difficulty,

    #[arg(long, default_value = "Anonymous")]
    pub contributor: String,

    /// Store as approved instead of pending
    #[arg(long)]
    pub trusted: bool,
}

#[derive(Args, Debug)]
pub struct ReviewArgs {
    /// Row id as printed by `submit` or `status`
    #[arg(long)]
    pub id: i64,

    /// pending, approved or rejected
    #[arg(long)]
    pub status: ValidationStatus,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[arg(long, short)]
    pub problem: String,

    #[arg(long, short)]
    pub solution: String,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Page of corpus rows to list, newest first
    #[arg(long, default_value_t = 1)]
    pub page: usize,

    #[arg(long, default_value_t = 10)]
    pub per_page: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_train_flags_map_onto_config() {
        let cli = Cli::try_parse_from(["prog", "train", "--epochs", "7", "--lr", "0.01"]).unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg: TrainConfig = args.into();
        assert_eq!(cfg.max_epochs, 7);
        assert_eq!(cfg.learning_rate, 0.01);
        assert_eq!(cfg.min_corpus_rows, 10);
    }

    #[test]
    fn test_submit_parses_concepts_and_enums() {
        let cli = Cli::try_parse_from([
            "prog", "submit", "-p", "Solve for x: x + 1 = 2", "-s", "x = 1",
            "--concepts", "algebra,linear", "--difficulty", "beginner",
        ])
        .unwrap();
        let Commands::Submit(args) = cli.command else { panic!("expected submit") };
        assert_eq!(args.concepts, vec!["algebra", "linear"]);
        assert_eq!(args.difficulty, Difficulty::Beginner);
        assert!(!args.trusted);
    }

    #[test]
    fn test_review_rejects_unknown_status() {
        assert!(Cli::try_parse_from(["prog", "review", "--id", "3", "--status", "maybe"]).is_err());
    }
}
