// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// The two global flags locate the corpus database and the
// artifact store root; every subcommand builds the stores it
// needs from them.
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use commands::{
    AskArgs, BatchArgs, Commands, ReviewArgs, StatusArgs, SubmitArgs, TrainArgs, ValidateArgs,
};

use crate::application::ask_use_case::InferenceService;
use crate::application::coordinator::TrainingCoordinator;
use crate::application::submit_use_case::SubmitUseCase;
use crate::application::train_use_case::TrainConfig;
use crate::data::gatekeeper::{estimate_confidence, validate_training_pair};
use crate::domain::example::NewExample;
use crate::domain::prediction::ModelInfo;
use crate::domain::traits::{ArtifactStore, CorpusStore};
use crate::infra::artifact_store::FsArtifactStore;
use crate::infra::corpus_store::SqliteCorpusStore;
use crate::infra::notifier::TracingNotifier;

/// The main CLI struct; clap reads the fields and generates
/// argument parsing code via the Parser derive macro.
#[derive(Parser, Debug)]
#[command(
    name = "math-answer-classifier",
    version,
    about = "Learn to map math problems to previously seen solutions, then answer new ones."
)]
pub struct Cli {
    /// SQLite file holding the corpus and training history
    #[arg(long, global = true, default_value = "data/corpus.sqlite3")]
    pub db: PathBuf,

    /// Root directory of the model bundle store
    #[arg(long, global = true, default_value = "artifacts")]
    pub artifacts: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match &self.command {
            Commands::Train(args)    => self.run_train(args),
            Commands::Ask(args)      => self.run_ask(args),
            Commands::Batch(args)    => self.run_batch(args),
            Commands::Submit(args)   => self.run_submit(args),
            Commands::Review(args)   => self.run_review(args),
            Commands::Validate(args) => run_validate(args),
            Commands::Status(args)   => self.run_status(args),
            Commands::Prune          => self.run_prune(),
        }
    }

    fn corpus(&self) -> Result<Arc<SqliteCorpusStore>> {
        let store = SqliteCorpusStore::open(&self.db)
            .with_context(|| format!("opening corpus database {}", self.db.display()))?;
        Ok(Arc::new(store))
    }

    fn artifact_store(&self) -> Result<Arc<FsArtifactStore>> {
        let store = FsArtifactStore::new(&self.artifacts)
            .with_context(|| format!("opening artifact store {}", self.artifacts.display()))?;
        Ok(Arc::new(store))
    }

    /// An unloadable bundle is logged and the service answers with the
    /// untrained fallback.
    fn inference(&self) -> Result<InferenceService> {
        let service = InferenceService::new(self.artifact_store()?);
        if let Err(e) = service.load() {
            tracing::warn!(
                "Current bundle in '{}' could not be loaded, serving fallback answers: {e}",
                self.artifacts.display()
            );
        }
        Ok(service)
    }

    /// Runs one job through the coordinator and blocks until it ends.
    fn run_train(&self, args: &TrainArgs) -> Result<()> {
        let config = match &args.config {
            Some(path) => TrainConfig::from_json_file(path)
                .with_context(|| format!("reading training config {}", path.display()))?,
            None => args.clone().into(),
        };
        let coordinator = TrainingCoordinator::new(
            config,
            self.corpus()?,
            self.artifact_store()?,
            Arc::new(TracingNotifier),
        );

        let training_id = coordinator.start().context("starting training")?;
        println!("Training {training_id} started");
        let report = coordinator
            .wait()
            .context("training worker vanished")?
            .with_context(|| format!("training {training_id} failed"))?;

        println!("{}", serde_json::to_string_pretty(&report)?);
        println!("Training complete. Bundle {training_id} is now current.");
        Ok(())
    }

    fn run_ask(&self, args: &AskArgs) -> Result<()> {
        let service = self.inference()?;
        if args.explain {
            let result = service.predict_with_explanation(&args.problem)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            let (solution, confidence) = service.predict(&args.problem)?;
            println!("\nSolution:   {solution}");
            println!("Confidence: {:.1}%", confidence * 100.0);
        }
        Ok(())
    }

    fn run_batch(&self, args: &BatchArgs) -> Result<()> {
        let text = std::fs::read_to_string(&args.file)
            .with_context(|| format!("reading {}", args.file.display()))?;
        let problems: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();

        let entries = self.inference()?.batch_predict(&problems);
        let failed = entries.iter().filter(|e| !e.is_ok()).count();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        eprintln!("{} problems, {} failed", entries.len(), failed);
        Ok(())
    }

    fn run_submit(&self, args: &SubmitArgs) -> Result<()> {
        let example = NewExample::new(&args.problem, &args.solution)
            .with_concepts(args.concepts.iter().map(|c| c.trim()).filter(|c| !c.is_empty()))
            .with_contributor(&args.contributor);
        let example = NewExample { difficulty: args.difficulty, ..example };

        let use_case = SubmitUseCase::new(self.corpus()?, Arc::new(TracingNotifier));
        let id = use_case.submit(example, args.trusted)?;
        let status = if args.trusted { "approved" } else { "pending review" };
        println!("Stored as row {id} ({status})");
        Ok(())
    }

    fn run_review(&self, args: &ReviewArgs) -> Result<()> {
        let use_case = SubmitUseCase::new(self.corpus()?, Arc::new(TracingNotifier));
        use_case
            .review(args.id, args.status)
            .with_context(|| format!("reviewing row {}", args.id))?;
        println!("Row {} is now {}", args.id, args.status);
        Ok(())
    }

    fn run_status(&self, args: &StatusArgs) -> Result<()> {
        match self.inference()?.model_info() {
            ModelInfo::NotLoaded => println!("Model: not trained"),
            ModelInfo::Loaded { training_id, classes, vocab_size, trained_at, .. } => println!(
                "Model: {training_id} | {classes} solutions | vocabulary {vocab_size} | trained {trained_at}"
            ),
        }

        let corpus = self.corpus()?;
        let pending = corpus.fetch_unconsumed_approved()?.len();
        println!("Approved rows waiting for training: {pending}");

        println!("\nTraining history:");
        for s in corpus.training_history()? {
            println!(
                "  {}  {}  accuracy {:.1}%  {} rows  {:.1}s",
                s.created_at, s.training_id, s.accuracy * 100.0, s.corpus_size, s.duration_secs,
            );
        }

        println!("\nCorpus (page {}):", args.page);
        for row in corpus.list_examples(args.page, args.per_page)? {
            let used = if row.consumed { "consumed" } else { "fresh" };
            println!(
                "  #{:<5} {:<9} {:<8} {} => {}",
                row.id, row.validation_status.as_str(), used, row.problem_text, row.solution_text,
            );
        }
        Ok(())
    }

    fn run_prune(&self) -> Result<()> {
        let removed = self.artifact_store()?.delete_stale_bundles()?;
        println!("Removed {removed} stale bundle(s)");
        Ok(())
    }
}

/// Gatekeeper dry run; touches no store.
fn run_validate(args: &ValidateArgs) -> Result<()> {
    let verdict = validate_training_pair(&args.problem, &args.solution);
    if verdict.accepted {
        println!("Accepted");
    } else {
        println!("Rejected:");
        for issue in &verdict.issues {
            println!("  - {issue}");
        }
    }
    println!(
        "Heuristic confidence: {:.2}",
        estimate_confidence(&args.problem, &args.solution)
    );
    Ok(())
}
