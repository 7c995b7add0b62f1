// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Mini-batch train + validation loop with Adam, early stopping
// and learning-rate decay on plateau.
//
// Key points:
//   - Batches come from Burn DataLoaders; the training loader
//     reshuffles with the configured seed every epoch
//   - Training uses TrainBackend (Autodiff<NdArray>) for gradients
//   - model.valid() returns the model on InferBackend (NdArray)
//     with dropout disabled; validation batches use that backend
//   - The monitored loss is val_loss, or train_loss when the
//     stratified split left no validation rows
//   - Early stopping keeps a copy of the best epoch's weights and
//     returns that copy, not the last epoch's
//   - The cancel flag is checked before every epoch
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use burn::{
    data::{
        dataloader::{DataLoader, DataLoaderBuilder},
        dataset::Dataset,
    },
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
};

use crate::application::train_use_case::TrainConfig;
use crate::data::batcher::{ClassBatch, ClassBatcher};
use crate::data::dataset::ClassDataset;
use crate::error::{PipelineError, Result};
use crate::infra::metrics::{EpochMetrics, MetricsLogger};
use crate::ml::inferencer::argmax_lowest;
use crate::ml::model::{ClassifierConfig, ClassifierModel};
use crate::ml::{InferBackend, TrainBackend};

// ─── Plateau policies ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopDecision {
    Improved,
    Waiting,
    Stop,
}

/// Stops after `patience` epochs without a new best monitored loss.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience:   usize,
    best:       f64,
    best_epoch: usize,
    wait:       usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self { patience, best: f64::INFINITY, best_epoch: 0, wait: 0 }
    }

    pub fn update(&mut self, m: &EpochMetrics) -> StopDecision {
        if m.is_improvement(self.best) {
            self.best = m.monitored_loss();
            self.best_epoch = m.epoch;
            self.wait = 0;
            return StopDecision::Improved;
        }
        self.wait += 1;
        if self.wait >= self.patience {
            StopDecision::Stop
        } else {
            StopDecision::Waiting
        }
    }

    pub fn best_epoch(&self) -> usize {
        self.best_epoch
    }

    pub fn best_loss(&self) -> f64 {
        self.best
    }
}

/// Multiplies the learning rate by `factor` after `patience` epochs
/// without improvement, never going below `min_lr`.
#[derive(Debug, Clone)]
pub struct PlateauScheduler {
    lr:       f64,
    factor:   f64,
    patience: usize,
    min_lr:   f64,
    best:     f64,
    wait:     usize,
}

impl PlateauScheduler {
    pub fn new(lr: f64, factor: f64, patience: usize, min_lr: f64) -> Self {
        Self { lr, factor, patience, min_lr, best: f64::INFINITY, wait: 0 }
    }

    pub fn lr(&self) -> f64 {
        self.lr
    }

    /// Feed one epoch's metrics; returns the rate for the next epoch.
    pub fn step(&mut self, m: &EpochMetrics) -> f64 {
        if m.is_improvement(self.best) {
            self.best = m.monitored_loss();
            self.wait = 0;
            return self.lr;
        }
        self.wait += 1;
        if self.wait >= self.patience {
            let decayed = (self.lr * self.factor).max(self.min_lr);
            if decayed < self.lr {
                tracing::info!("Reducing learning rate {:.2e} → {:.2e}", self.lr, decayed);
                self.lr = decayed;
            }
            self.wait = 0;
        }
        self.lr
    }
}

// ─── Training entry point ─────────────────────────────────────────────────────

/// Callbacks the job hands to the loop.
pub struct FitHooks<'a> {
    /// Checked before every epoch; when set the loop aborts with `Cancelled`.
    pub cancel: Option<&'a AtomicBool>,
    /// Called after every epoch with its metrics.
    pub on_epoch: &'a mut dyn FnMut(&EpochMetrics),
    /// Appends every epoch to metrics.csv when present.
    pub metrics: Option<&'a MetricsLogger>,
}

#[derive(Debug)]
pub struct FitOutcome {
    /// Best-epoch weights, dropout disabled.
    pub model:         ClassifierModel<InferBackend>,
    pub history:       Vec<EpochMetrics>,
    pub best_epoch:    usize,
    pub stopped_early: bool,
}

pub fn fit(
    run_id:        &str,
    cfg:           &TrainConfig,
    model_cfg:     &ClassifierConfig,
    train_dataset: ClassDataset,
    val_dataset:   ClassDataset,
    hooks:         FitHooks<'_>,
) -> Result<FitOutcome> {
    if train_dataset.is_empty() {
        return Err(PipelineError::Model("training split is empty".to_string()));
    }
    let has_validation = !val_dataset.is_empty();
    let device = Default::default();

    // ── Build model ───────────────────────────────────────────────────────────
    let mut model: ClassifierModel<TrainBackend> = model_cfg.init(&device);
    tracing::info!(
        "Model ready: vocab={}, classes={}, embed={}, hidden={}",
        model_cfg.vocab_size, model_cfg.num_classes, model_cfg.embedding_dim, model_cfg.hidden_dim,
    );

    // ── Adam optimiser ────────────────────────────────────────────────────────
    let mut optim = AdamConfig::new().with_epsilon(1e-7).init();

    // ── Training data loader (TrainBackend, reshuffled every epoch) ───────────
    let train_loader: Arc<dyn DataLoader<TrainBackend, ClassBatch<TrainBackend>>> =
        DataLoaderBuilder::new(ClassBatcher::<TrainBackend>::new(device))
            .batch_size(cfg.batch_size.max(1))
            .shuffle(cfg.seed)
            .num_workers(1)
            .build(train_dataset);

    // ── Validation data loader (InferBackend — no autodiff overhead) ──────────
    let val_loader: Arc<dyn DataLoader<InferBackend, ClassBatch<InferBackend>>> =
        DataLoaderBuilder::new(ClassBatcher::<InferBackend>::new(Default::default()))
            .batch_size(cfg.batch_size.max(1))
            .num_workers(1)
            .build(val_dataset);

    let mut stopper   = EarlyStopping::new(cfg.early_stopping_patience.max(1));
    let mut scheduler = PlateauScheduler::new(
        cfg.learning_rate, cfg.lr_decay_factor, cfg.lr_patience.max(1), cfg.min_lr,
    );
    let mut best: Option<ClassifierModel<InferBackend>> = None;
    let mut history = Vec::new();
    let mut stopped_early = false;

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in 1..=cfg.max_epochs.max(1) {
        if hooks.cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            tracing::info!("Training {} cancelled before epoch {}", run_id, epoch);
            return Err(PipelineError::Cancelled(run_id.to_string()));
        }

        let lr = scheduler.lr();

        // ── Training phase ────────────────────────────────────────────────────
        let mut train_loss_sum = 0.0f64;
        let mut train_batches  = 0usize;

        for batch in train_loader.iter() {
            let (loss, _) = model.forward_loss(batch.inputs, batch.targets);

            train_loss_sum += loss.clone().into_scalar().elem::<f64>();
            train_batches  += 1;

            // Backward pass + Adam update
            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(lr, model, grads);
        }

        let train_loss = train_loss_sum / train_batches.max(1) as f64;
        if !train_loss.is_finite() {
            return Err(PipelineError::Model(format!(
                "training loss diverged at epoch {epoch}"
            )));
        }

        // ── Validation phase ──────────────────────────────────────────────────
        let model_valid = model.valid();
        let (val_loss, val_accuracy) = if has_validation {
            validate(&model_valid, val_loader.as_ref())?
        } else {
            (f64::NAN, 0.0)
        };

        let metrics = EpochMetrics { epoch, train_loss, val_loss, val_accuracy, learning_rate: lr };
        tracing::debug!(
            "Epoch {:>3}/{} | train_loss={:.4} | val_loss={:.4} | val_acc={:.1}% | lr={:.2e}",
            epoch, cfg.max_epochs, train_loss, val_loss, val_accuracy * 100.0, lr,
        );
        if let Some(logger) = hooks.metrics {
            if let Err(e) = logger.log(&metrics) {
                tracing::warn!("Could not append epoch metrics: {e}");
            }
        }
        (hooks.on_epoch)(&metrics);

        scheduler.step(&metrics);
        let decision = stopper.update(&metrics);
        history.push(metrics);

        match decision {
            StopDecision::Improved => best = Some(model_valid),
            StopDecision::Waiting  => {}
            StopDecision::Stop     => {
                tracing::info!(
                    "Early stopping at epoch {} (best epoch {}, loss {:.4})",
                    epoch, stopper.best_epoch(), stopper.best_loss(),
                );
                stopped_early = true;
                break;
            }
        }
    }

    let model = best.unwrap_or_else(|| model.valid());
    Ok(FitOutcome { model, history, best_epoch: stopper.best_epoch(), stopped_early })
}

/// Mean validation loss and accuracy.
fn validate(
    model:  &ClassifierModel<InferBackend>,
    loader: &dyn DataLoader<InferBackend, ClassBatch<InferBackend>>,
) -> Result<(f64, f64)> {
    let mut loss_sum = 0.0f64;
    let mut batches  = 0usize;
    let mut correct  = 0usize;
    let mut total    = 0usize;

    for batch in loader.iter() {
        let logits = model.forward(batch.inputs);
        let [_, num_classes] = logits.dims();

        let ce = CrossEntropyLossConfig::new().init(&logits.device());
        loss_sum += ce.forward(logits.clone(), batch.targets.clone()).into_scalar().elem::<f64>();
        batches  += 1;

        let flat: Vec<f32> = logits
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| PipelineError::Model(format!("reading validation logits: {e:?}")))?;
        let targets: Vec<i64> = batch
            .targets
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .map_err(|e| PipelineError::Model(format!("reading validation targets: {e:?}")))?;
        for (row, &target) in flat.chunks(num_classes).zip(&targets) {
            if argmax_lowest(row) as i64 == target {
                correct += 1;
            }
            total += 1;
        }
    }

    Ok((loss_sum / batches.max(1) as f64, correct as f64 / total.max(1) as f64))
}
