// ============================================================
// Layer 2 — Training Coordinator
// ============================================================
// Owns the process-wide TrainingJobState and runs at most one
// TrainUseCase at a time on a dedicated worker thread.
//
//   start()    → claims the job slot under the state write lock,
//                publishes training_started, spawns the worker
//   snapshot() → cloned state for pollers
//   cancel()   → raises the flag the job checks between phases
//                and epochs
//   wait()     → joins the worker and returns its report
//
// The worker is the only writer of the state while a job runs.
// Progress written to the state never decreases, and each job
// publishes exactly one of training_completed / training_failed.
// A panic inside the job is caught on the worker and reported
// through the failed path like any other error.
// Notification failures are logged and otherwise ignored.
//
// Reference: Rust Book §16 (Fearless Concurrency)

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};

use serde_json::{json, Value};

use crate::application::ask_use_case::InferenceService;
use crate::application::train_use_case::{
    new_training_id, ProgressUpdate, TrainConfig, TrainUseCase, TrainingReport,
};
use crate::domain::job_state::{JobPhase, TrainingJobState};
use crate::domain::traits::{ArtifactStore, CorpusStore, NotificationSink};
use crate::error::{PipelineError, Result};

pub const EVENT_STARTED: &str = "training_started";
pub const EVENT_PROGRESS: &str = "training_progress";
pub const EVENT_COMPLETED: &str = "training_completed";
pub const EVENT_FAILED: &str = "training_failed";

type Worker = JoinHandle<Result<TrainingReport>>;

pub struct TrainingCoordinator {
    config:    TrainConfig,
    corpus:    Arc<dyn CorpusStore>,
    artifacts: Arc<dyn ArtifactStore>,
    notifier:  Arc<dyn NotificationSink>,
    inference: Option<Arc<InferenceService>>,
    state:     Arc<RwLock<TrainingJobState>>,
    cancel:    Arc<AtomicBool>,
    worker:    Mutex<Option<Worker>>,
}

impl TrainingCoordinator {
    pub fn new(
        config:    TrainConfig,
        corpus:    Arc<dyn CorpusStore>,
        artifacts: Arc<dyn ArtifactStore>,
        notifier:  Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            config,
            corpus,
            artifacts,
            notifier,
            inference: None,
            state:     Arc::new(RwLock::new(TrainingJobState::default())),
            cancel:    Arc::new(AtomicBool::new(false)),
            worker:    Mutex::new(None),
        }
    }

    /// Reload this service after every successful run.
    pub fn with_inference(mut self, inference: Arc<InferenceService>) -> Self {
        self.inference = Some(inference);
        self
    }

    /// Start a job and return its id. Rejected while another job runs;
    /// the running job's id is left as it was.
    pub fn start(&self) -> Result<String> {
        let training_id = {
            let mut state = write_state(&self.state);
            if state.is_training {
                let running = state.training_id.clone().unwrap_or_default();
                tracing::warn!("Start rejected: {} is still running", running);
                return Err(PipelineError::TrainingInProgress { training_id: running });
            }
            let training_id = new_training_id();
            *state = TrainingJobState {
                is_training: true,
                progress:    0,
                message:     "Training started".to_string(),
                training_id: Some(training_id.clone()),
                phase:       JobPhase::Idle,
            };
            training_id
        };

        // A finished worker from the previous run is reaped here.
        let mut slot = self.worker.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(previous) = slot.take() {
            let _ = previous.join();
        }

        self.cancel.store(false, Ordering::Relaxed);
        publish(&*self.notifier, EVENT_STARTED, json!({ "training_id": training_id, "progress": 0 }));
        tracing::info!("Training {} started", training_id);

        let job = TrainUseCase::new(self.config.clone(), self.corpus.clone(), self.artifacts.clone());
        let ctx = WorkerContext {
            training_id: training_id.clone(),
            state:       self.state.clone(),
            cancel:      self.cancel.clone(),
            notifier:    self.notifier.clone(),
            inference:   self.inference.clone(),
        };
        let handle = thread::Builder::new()
            .name(format!("trainer-{training_id}"))
            .spawn(move || ctx.run(job))
            .map_err(|e| {
                let err = PipelineError::io("trainer thread", e);
                *write_state(&self.state) = TrainingJobState {
                    message: format!("Training failed: {err}"),
                    ..TrainingJobState::default()
                };
                err
            })?;
        *slot = Some(handle);
        Ok(training_id)
    }

    pub fn snapshot(&self) -> TrainingJobState {
        self.state.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn is_training(&self) -> bool {
        self.snapshot().is_training
    }

    /// Ask the running job to stop at its next checkpoint.
    pub fn cancel(&self) {
        if self.is_training() {
            tracing::info!("Cancellation requested");
            self.cancel.store(true, Ordering::Relaxed);
        }
    }

    /// Block until the current worker finishes. `None` when no job was
    /// started since the last wait.
    pub fn wait(&self) -> Option<Result<TrainingReport>> {
        let handle = self.worker.lock().unwrap_or_else(|p| p.into_inner()).take()?;
        Some(handle.join().unwrap_or_else(|_| {
            let mut state = write_state(&self.state);
            state.is_training = false;
            state.phase       = JobPhase::Idle;
            state.message     = "Training failed: worker panicked".to_string();
            Err(PipelineError::Model("training worker panicked".to_string()))
        }))
    }
}

// ─── Worker side ──────────────────────────────────────────────────────────────

struct WorkerContext {
    training_id: String,
    state:       Arc<RwLock<TrainingJobState>>,
    cancel:      Arc<AtomicBool>,
    notifier:    Arc<dyn NotificationSink>,
    inference:   Option<Arc<InferenceService>>,
}

impl WorkerContext {
    fn run(self, job: TrainUseCase) -> Result<TrainingReport> {
        let mut on_progress = |update: ProgressUpdate| self.progress(update);
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            job.execute(&self.training_id, &self.cancel, &mut on_progress)
        }))
        .unwrap_or_else(|payload| {
            Err(PipelineError::Model(format!("training worker panicked: {}", panic_message(&*payload))))
        });

        match &result {
            Ok(report) => {
                if let Some(inference) = &self.inference {
                    if let Err(e) = inference.reload() {
                        tracing::warn!("Trained bundle saved but reload failed: {e}");
                    }
                }
                let message = format!(
                    "Training completed: accuracy {:.1}% on {} examples",
                    report.evaluation.accuracy * 100.0,
                    report.survivors,
                );
                self.finish(100, message);
                publish(&*self.notifier, EVENT_COMPLETED, json!({
                    "training_id": self.training_id,
                    "progress":    100,
                    "accuracy":    report.evaluation.accuracy,
                    "corpus_size": report.survivors,
                    "duration":    report.duration_secs,
                }));
                tracing::info!("Training {} completed", self.training_id);
            }
            Err(e) => {
                let progress = read_progress(&self.state);
                self.finish(progress, format!("Training failed: {e}"));
                publish(&*self.notifier, EVENT_FAILED, json!({
                    "training_id": self.training_id,
                    "progress":    progress,
                    "error":       e.to_string(),
                }));
                tracing::error!("Training {} failed: {}", self.training_id, e);
            }
        }
        result
    }

    fn progress(&self, update: ProgressUpdate) {
        let progress = {
            let mut state = write_state(&self.state);
            state.progress = state.progress.max(update.progress);
            state.phase    = update.phase;
            state.message  = update.message.clone();
            state.progress
        };
        publish(&*self.notifier, EVENT_PROGRESS, json!({
            "training_id": self.training_id,
            "progress":    progress,
            "phase":       update.phase,
            "message":     update.message,
        }));
    }

    fn finish(&self, progress: u8, message: String) {
        let mut state = write_state(&self.state);
        state.is_training = false;
        state.progress    = state.progress.max(progress);
        state.phase       = JobPhase::Idle;
        state.message     = message;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown cause")
}

fn write_state(state: &RwLock<TrainingJobState>) -> std::sync::RwLockWriteGuard<'_, TrainingJobState> {
    state.write().unwrap_or_else(|p| p.into_inner())
}

fn read_progress(state: &RwLock<TrainingJobState>) -> u8 {
    state.read().unwrap_or_else(|p| p.into_inner()).progress
}

fn publish(notifier: &dyn NotificationSink, event: &str, payload: Value) {
    if let Err(e) = notifier.publish(event, payload) {
        tracing::warn!("Dropping '{}' notification: {e}", event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::time::Duration;

    use crate::domain::bundle::ModelArtifactBundle;
    use crate::domain::example::{
        ExampleId, NewExample, TrainingExample, TrainingSession, ValidationStatus,
    };
    use crate::infra::artifact_store::FsArtifactStore;
    use crate::infra::corpus_store::InMemoryCorpusStore;
    use crate::infra::notifier::{ChannelNotifier, Notification};

    /// Holds every corpus load until the test releases it; panics on
    /// load while `crash` is set.
    struct GatedCorpus {
        inner: InMemoryCorpusStore,
        gate:  Mutex<Receiver<()>>,
        crash: AtomicBool,
    }

    impl CorpusStore for GatedCorpus {
        fn fetch_unconsumed_approved(&self) -> Result<Vec<TrainingExample>> {
            let _ = self.gate.lock().unwrap().recv();
            if self.crash.load(Ordering::Relaxed) {
                panic!("corpus backend crashed");
            }
            self.inner.fetch_unconsumed_approved()
        }
        fn mark_consumed(&self, ids: &[ExampleId]) -> Result<usize> {
            self.inner.mark_consumed(ids)
        }
        fn append_submission(&self, example: NewExample) -> Result<ExampleId> {
            self.inner.append_submission(example)
        }
        fn append_training_session(&self, session: &TrainingSession) -> Result<()> {
            self.inner.append_training_session(session)
        }
        fn set_validation_status(&self, id: ExampleId, status: ValidationStatus) -> Result<()> {
            self.inner.set_validation_status(id, status)
        }
        fn list_examples(&self, page: usize, per_page: usize) -> Result<Vec<TrainingExample>> {
            self.inner.list_examples(page, per_page)
        }
        fn training_history(&self) -> Result<Vec<TrainingSession>> {
            self.inner.training_history()
        }
    }

    struct NoArtifacts;

    impl ArtifactStore for NoArtifacts {
        fn load_bundle(&self) -> Result<Option<ModelArtifactBundle>> {
            Ok(None)
        }
        fn save_bundle(&self, _bundle: &ModelArtifactBundle) -> Result<()> {
            Ok(())
        }
    }

    fn gated(rows: usize) -> (Arc<GatedCorpus>, Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let inner = InMemoryCorpusStore::new();
        for i in 1..=rows {
            inner
                .append_submission(NewExample::new(format!("What is {i}+{i}?"), format!("{}", 2 * i)).approved())
                .unwrap();
        }
        (Arc::new(GatedCorpus { inner, gate: Mutex::new(rx), crash: AtomicBool::new(false) }), tx)
    }

    fn quick_config() -> TrainConfig {
        TrainConfig {
            max_sequence_length: 8,
            embedding_dim: 8,
            hidden_dim: 8,
            dense_dim: 8,
            batch_size: 4,
            max_epochs: 2,
            min_solution_chars: 1,
            ..TrainConfig::default()
        }
    }

    fn terminal_events(events: &[Notification]) -> Vec<&str> {
        events
            .iter()
            .map(|n| n.event.as_str())
            .filter(|e| *e == EVENT_COMPLETED || *e == EVENT_FAILED)
            .collect()
    }

    #[test]
    fn test_second_start_is_rejected_while_running() {
        let (corpus, release) = gated(0);
        let (notifier, rx) = ChannelNotifier::new();
        let coord = TrainingCoordinator::new(quick_config(), corpus, Arc::new(NoArtifacts), Arc::new(notifier));

        let first = coord.start().unwrap();
        let err = coord.start().unwrap_err();
        match err {
            PipelineError::TrainingInProgress { training_id } => assert_eq!(training_id, first),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(coord.snapshot().training_id.as_deref(), Some(first.as_str()));
        assert!(coord.snapshot().is_training);

        release.send(()).unwrap();
        let result = coord.wait().unwrap();
        assert!(matches!(result, Err(PipelineError::InsufficientData { found: 0, .. })));

        let state = coord.snapshot();
        assert!(!state.is_training);
        assert!(state.message.starts_with("Training failed"));

        let events: Vec<Notification> = rx.try_iter().collect();
        assert_eq!(events[0].event, EVENT_STARTED);
        assert_eq!(terminal_events(&events), vec![EVENT_FAILED]);
    }

    #[test]
    fn test_successful_run_publishes_monotone_progress() {
        let tmp = tempfile::tempdir().unwrap();
        let (corpus, release) = gated(12);
        let (notifier, rx) = ChannelNotifier::new();
        let store = Arc::new(FsArtifactStore::new(tmp.path()).unwrap());
        let inference = Arc::new(InferenceService::new(store.clone()));
        let coord = TrainingCoordinator::new(quick_config(), corpus, store, Arc::new(notifier))
            .with_inference(inference.clone());

        coord.start().unwrap();
        release.send(()).unwrap();
        let report = coord.wait().unwrap().unwrap();
        assert_eq!(report.survivors, 12);

        let state = coord.snapshot();
        assert!(!state.is_training);
        assert_eq!(state.progress, 100);
        assert!(inference.is_loaded());

        let events: Vec<Notification> = rx.try_iter().collect();
        let progress: Vec<u64> = events
            .iter()
            .filter_map(|n| n.payload.get("progress").and_then(Value::as_u64))
            .collect();
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(progress.last(), Some(&100));
        assert_eq!(terminal_events(&events), vec![EVENT_COMPLETED]);
    }

    #[test]
    fn test_cancel_stops_before_persisting() {
        let (corpus, release) = gated(10);
        let (notifier, _rx) = ChannelNotifier::new();
        let coord = TrainingCoordinator::new(quick_config(), corpus.clone(), Arc::new(NoArtifacts), Arc::new(notifier));

        coord.start().unwrap();
        coord.cancel();
        release.send(()).unwrap();
        let result = coord.wait().unwrap();
        assert!(matches!(result, Err(PipelineError::Cancelled(_))));
        assert_eq!(corpus.inner.fetch_unconsumed_approved().unwrap().len(), 10);

        // The slot is free again.
        release.send(()).unwrap();
        coord.start().unwrap();
        assert!(coord.wait().is_some());
    }

    #[test]
    fn test_notifier_failures_do_not_fail_the_job() {
        let (corpus, release) = gated(0);
        let (notifier, rx) = ChannelNotifier::new();
        drop(rx);
        let coord = TrainingCoordinator::new(quick_config(), corpus, Arc::new(NoArtifacts), Arc::new(notifier));

        coord.start().unwrap();
        release.send(()).unwrap();
        // Fails for lack of data, not because nobody is listening.
        let result = coord.wait().unwrap();
        assert!(matches!(result, Err(PipelineError::InsufficientData { .. })));
        assert!(!coord.is_training());
    }

    #[test]
    fn test_panicking_job_fails_and_frees_the_slot() {
        let (corpus, release) = gated(0);
        corpus.crash.store(true, Ordering::Relaxed);
        let (notifier, rx) = ChannelNotifier::new();
        let coord = TrainingCoordinator::new(quick_config(), corpus.clone(), Arc::new(NoArtifacts), Arc::new(notifier));

        let first = coord.start().unwrap();
        release.send(()).unwrap();

        // No wait(): the terminal event alone must reset the state.
        let mut events = Vec::new();
        while terminal_events(&events).is_empty() {
            events.push(rx.recv_timeout(Duration::from_secs(30)).unwrap());
        }
        let failed = events.last().unwrap();
        assert_eq!(failed.event, EVENT_FAILED);
        assert_eq!(failed.payload["training_id"], first.as_str());
        assert!(failed.payload["error"].as_str().unwrap().contains("corpus backend crashed"));

        let state = coord.snapshot();
        assert!(!state.is_training);
        assert_eq!(state.phase, JobPhase::Idle);
        assert!(state.message.contains("panicked"));

        corpus.crash.store(false, Ordering::Relaxed);
        let second = coord.start().unwrap();
        assert_ne!(second, first);
        release.send(()).unwrap();
        let result = coord.wait().unwrap();
        assert!(matches!(result, Err(PipelineError::InsufficientData { .. })));

        events.extend(rx.try_iter());
        assert_eq!(terminal_events(&events), vec![EVENT_FAILED, EVENT_FAILED]);
    }

    #[test]
    fn test_wait_without_job_is_none() {
        let (corpus, _release) = gated(0);
        let coord = TrainingCoordinator::new(
            quick_config(),
            corpus,
            Arc::new(NoArtifacts),
            Arc::new(crate::infra::notifier::TracingNotifier),
        );
        assert!(coord.wait().is_none());
        assert_eq!(coord.snapshot(), TrainingJobState::default());
    }
}
