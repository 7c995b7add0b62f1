// ============================================================
// Layer 2 — AskUseCase (Inference Service)
// ============================================================
// Serves predictions from the bundle the artifact store marks
// current.
//
// Lifecycle:
//   new()    → NotLoaded; every call answers with the untrained
//              fallback instead of failing
//   load()   → read the current bundle, rebuild the model, swap it
//              in; a failed load keeps whatever was served before
//   reload() → same, called after a training run completes
//
// The swap builds the new LoadedModel completely before taking
// the lock, so a request sees either the old model or the new
// one, never a mix. Requests clone the served model under the
// lock and run the forward pass outside it, so predictions run
// concurrently with each other and with a reload.
//
// Reference: Burn Book §6 (Inference)

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crate::application::explain::{explanation, extract_concepts, extract_variables, generate_steps};
use crate::data::gatekeeper::score_prediction;
use crate::data::normalizer::display_form;
use crate::domain::prediction::{BatchEntry, BatchOutcome, ModelInfo, PredictionResult};
use crate::domain::traits::ArtifactStore;
use crate::error::{PipelineError, Result};
use crate::ml::inferencer::LoadedModel;

pub const UNTRAINED_ANSWER: &str = "Model not trained yet. Please train the model first.";
pub const FALLBACK_SOLUTION: &str = "Model training required for accurate solutions";

pub struct InferenceService {
    artifacts: Arc<dyn ArtifactStore>,
    model:     Mutex<Option<LoadedModel>>,
}

impl InferenceService {
    pub fn new(artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self { artifacts, model: Mutex::new(None) }
    }

    /// Load the current bundle. `Ok(false)` when the store holds none.
    pub fn load(&self) -> Result<bool> {
        let Some(bundle) = self.artifacts.load_bundle()? else {
            tracing::info!("No trained bundle available; serving fallback answers");
            return Ok(false);
        };
        let loaded = LoadedModel::from_bundle(bundle)?;
        *self.lock() = Some(loaded);
        Ok(true)
    }

    /// Pick up a newly persisted bundle. On error the previous model,
    /// if any, stays in service.
    pub fn reload(&self) -> Result<bool> {
        tracing::info!("Reloading model bundle");
        self.load().inspect_err(|e| tracing::warn!("Reload failed, keeping previous model: {e}"))
    }

    pub fn is_loaded(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<LoadedModel>> {
        self.model.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Snapshot of the served model; a later reload does not affect it.
    pub fn current(&self) -> Option<LoadedModel> {
        self.lock().clone()
    }

    /// Most likely stored solution and its softmax probability.
    pub fn predict(&self, text: &str) -> Result<(String, f32)> {
        let problem = require_text(text)?;
        match self.current() {
            Some(model) => model.predict(problem),
            None => Ok((UNTRAINED_ANSWER.to_string(), 0.0)),
        }
    }

    /// Prediction decorated with concepts, steps, explanation and the
    /// gatekeeper's grade.
    pub fn predict_with_explanation(&self, text: &str) -> Result<PredictionResult> {
        let started = Instant::now();
        let problem = require_text(text)?;
        let predicted = self.current().map(|model| model.predict(problem)).transpose()?;

        let concepts = extract_concepts(problem);
        let result = match predicted {
            Some((solution, confidence)) => PredictionResult {
                steps:             generate_steps(problem, &solution),
                explanation:       explanation(problem, &solution),
                variables:         extract_variables(problem),
                processed_problem: display_form(problem),
                model_loaded:      true,
                validation:        score_prediction(problem, &solution, confidence),
                processing_time:   0.0,
                concepts,
                solution,
                confidence,
            },
            None => PredictionResult {
                solution:          FALLBACK_SOLUTION.to_string(),
                confidence:        0.0,
                steps:             vec![
                    "AI model not yet trained. Using rule-based processing.".to_string(),
                    format!("Identified concepts: {}", concepts.join(", ")),
                    "Please train the model for AI-powered solutions".to_string(),
                ],
                explanation:       explanation(problem, FALLBACK_SOLUTION),
                variables:         extract_variables(problem),
                processed_problem: display_form(problem),
                model_loaded:      false,
                validation:        score_prediction(problem, FALLBACK_SOLUTION, 0.0),
                processing_time:   0.0,
                concepts,
            },
        };
        Ok(PredictionResult { processing_time: started.elapsed().as_secs_f64(), ..result })
    }

    /// Each problem is answered on its own; a failure becomes an error
    /// entry for that problem only.
    pub fn batch_predict<S: AsRef<str>>(&self, problems: &[S]) -> Vec<BatchEntry> {
        problems
            .iter()
            .map(|p| {
                let problem = p.as_ref().to_string();
                let outcome = match self.predict_with_explanation(&problem) {
                    Ok(result) => BatchOutcome::Ok(result),
                    Err(e) => {
                        tracing::debug!("Batch item failed: {e}");
                        BatchOutcome::Error { error: e.to_string() }
                    }
                };
                BatchEntry { problem, outcome }
            })
            .collect()
    }

    pub fn model_info(&self) -> ModelInfo {
        match self.lock().as_ref() {
            None => ModelInfo::NotLoaded,
            Some(model) => {
                let cfg = model.config();
                ModelInfo::Loaded {
                    vocab_size:          cfg.vocab_size,
                    max_sequence_length: cfg.max_sequence_length,
                    embedding_dim:       cfg.embedding_dim,
                    architecture:        cfg.architecture_id.clone(),
                    classes:             cfg.num_classes,
                    trained_at:          cfg.trained_at.clone(),
                    training_id:         cfg.training_id.clone(),
                }
            }
        }
    }
}

fn require_text(text: &str) -> Result<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::ValidationFailure {
            issues: vec!["Problem text is required".to_string()],
        });
    }
    Ok(trimmed)
}
