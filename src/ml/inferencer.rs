// ============================================================
// Layer 5 — Inferencer
// ============================================================
// A frozen scorer built from one ModelArtifactBundle.
//
//   text → normalize → vocabulary ids (left-padded) → model
//        → softmax → argmax (lowest index wins ties) → label
//
// Loading refuses a bundle whose config disagrees with its own
// vocabulary, label space or any weight shape.

use std::sync::Arc;

use burn::{
    prelude::*,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::activation::softmax,
};

use crate::data::batcher::ClassBatcher;
use crate::data::label_space::LabelSpace;
use crate::data::vocabulary::Vocabulary;
use crate::domain::bundle::{BundleConfig, ModelArtifactBundle};
use crate::error::{PipelineError, Result};
use crate::ml::model::{ClassifierConfig, ClassifierModel, ClassifierModelRecord};
use crate::ml::InferBackend;

const SCORE_CHUNK: usize = 64;

/// Index of the largest value; on exact ties the lowest index wins.
/// Returns 0 for an empty slice.
pub fn argmax_lowest(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Serialize model weights with the full-precision binary recorder.
pub fn weights_to_bytes<B: Backend>(model: &ClassifierModel<B>) -> Result<Vec<u8>> {
    BinBytesRecorder::<FullPrecisionSettings>::default()
        .record(model.clone().into_record(), ())
        .map_err(|e| PipelineError::Model(format!("encoding weights: {e:?}")))
}

/// Rebuild a model of shape `cfg` and load `bytes` into it.
///
/// Every weight matrix is checked against `cfg` before the record is
/// applied.
pub fn model_from_bytes<B: Backend>(
    cfg:    &ClassifierConfig,
    bytes:  &[u8],
    device: &B::Device,
) -> Result<ClassifierModel<B>> {
    let record: ClassifierModelRecord<B> = BinBytesRecorder::<FullPrecisionSettings>::default()
        .load(bytes.to_vec(), device)
        .map_err(|e| PipelineError::ArtifactMismatch(format!("decoding weights: {e:?}")))?;
    cfg.check_record(&record)?;
    Ok(cfg.init::<B>(device).load_record(record))
}

/// Cloning is cheap: tensor storage and the fitted vocabulary and
/// label space are reference counted.
#[derive(Clone)]
pub struct LoadedModel {
    model:       ClassifierModel<InferBackend>,
    batcher:     ClassBatcher<InferBackend>,
    vocabulary:  Arc<Vocabulary>,
    label_space: Arc<LabelSpace>,
    config:      BundleConfig,
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("config", &self.config)
            .field("classes", &self.label_space.len())
            .finish()
    }
}

impl LoadedModel {
    pub fn from_bundle(bundle: ModelArtifactBundle) -> Result<Self> {
        bundle.check_consistency()?;
        let ModelArtifactBundle { model_weights, vocabulary, label_space, config } = bundle;

        let device = Default::default();
        let model_cfg = ClassifierConfig::new(config.vocab_size, config.num_classes)
            .with_embedding_dim(config.embedding_dim)
            .with_hidden_dim(config.hidden_dim)
            .with_dense_dim(config.dense_dim)
            .with_dropout(0.0);
        let model: ClassifierModel<InferBackend> = model_from_bytes(&model_cfg, &model_weights, &device)?;

        tracing::info!(
            "Model loaded: {} classes, vocabulary {}, trained {}",
            config.num_classes, config.vocab_size, config.trained_at,
        );
        Ok(Self {
            model,
            batcher:     ClassBatcher::new(device),
            vocabulary:  Arc::new(vocabulary),
            label_space: Arc::new(label_space),
            config,
        })
    }

    pub fn config(&self) -> &BundleConfig {
        &self.config
    }

    /// Softmax distributions over the label space, one per text.
    pub fn distributions(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let seq_len = self.config.max_sequence_length;
        let num_classes = self.config.num_classes;
        let mut out = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(SCORE_CHUNK) {
            let rows = chunk
                .iter()
                .map(|t| self.vocabulary.transform(t, seq_len))
                .collect::<Result<Vec<_>>>()?;
            let inputs = self.batcher.inputs(rows.iter().map(Vec::as_slice), rows.len(), seq_len);
            let probs: Vec<f32> = softmax(self.model.forward(inputs), 1)
                .into_data()
                .to_vec()
                .map_err(|e| PipelineError::Model(format!("reading probabilities: {e:?}")))?;
            out.extend(probs.chunks(num_classes).map(<[f32]>::to_vec));
        }
        Ok(out)
    }

    /// Class index and its probability for each text.
    pub fn classify(&self, texts: &[&str]) -> Result<Vec<(usize, f32)>> {
        Ok(self
            .distributions(texts)?
            .into_iter()
            .map(|dist| {
                let idx = argmax_lowest(&dist);
                (idx, dist.get(idx).copied().unwrap_or(0.0))
            })
            .collect())
    }

    /// Most likely stored solution for `text` and its probability.
    pub fn predict(&self, text: &str) -> Result<(String, f32)> {
        let (idx, confidence) = self
            .classify(&[text])?
            .pop()
            .ok_or_else(|| PipelineError::Model("empty prediction".to_string()))?;
        let solution = self.label_space.decode(idx).ok_or_else(|| {
            PipelineError::ArtifactMismatch(format!("class index {idx} outside the label space"))
        })?;
        tracing::debug!("Predicted class {} ('{}') conf={:.4}", idx, solution, confidence);
        Ok((solution.to_string(), confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bundle::ARCHITECTURE_ID;

    #[test]
    fn test_argmax_tie_break_prefers_lowest_index() {
        let dist = [0.1, 0.05, 0.3, 0.05, 0.2, 0.3];
        assert_eq!(argmax_lowest(&dist), 2);
        assert_eq!(argmax_lowest(&[0.5, 0.5]), 0);
        assert_eq!(argmax_lowest(&[]), 0);
    }

    /// Config always claims embedding 8 and hidden 4; the weights use
    /// the given widths.
    fn bundle(embedding_dim: usize, hidden_dim: usize) -> ModelArtifactBundle {
        let vocabulary = Vocabulary::fit(["what is 2+2", "what is 3+3"], 100).unwrap();
        let label_space = LabelSpace::fit(["4", "6"]);
        let model_cfg = ClassifierConfig::new(vocabulary.len(), label_space.len())
            .with_embedding_dim(embedding_dim)
            .with_hidden_dim(hidden_dim)
            .with_dense_dim(6)
            .with_dropout(0.0);
        let model: ClassifierModel<InferBackend> = model_cfg.init(&Default::default());
        ModelArtifactBundle {
            model_weights: weights_to_bytes(&model).unwrap(),
            config: BundleConfig {
                max_sequence_length: 8,
                vocab_size: vocabulary.len(),
                embedding_dim: 8,
                hidden_dim: 4,
                dense_dim: 6,
                architecture_id: ARCHITECTURE_ID.to_string(),
                trained_at: "2026-01-01T00:00:00Z".to_string(),
                num_classes: label_space.len(),
                training_id: "train_test".to_string(),
            },
            vocabulary,
            label_space,
        }
    }

    #[test]
    fn test_loaded_model_predicts_a_known_label() {
        let loaded = LoadedModel::from_bundle(bundle(8, 4)).unwrap();
        let (solution, confidence) = loaded.predict("What is 2+2?").unwrap();
        assert!(solution == "4" || solution == "6");
        assert!((0.0..=1.0).contains(&confidence));

        let dist = &loaded.distributions(&["anything at all"]).unwrap()[0];
        assert_eq!(dist.len(), 2);
        assert!((dist.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_weight_shape_mismatch_is_refused() {
        // Weights trained with a 5-wide embedding, config claims 8.
        let err = LoadedModel::from_bundle(bundle(5, 4)).unwrap_err();
        assert!(matches!(err, PipelineError::ArtifactMismatch(_)));
    }

    #[test]
    fn test_lstm_width_mismatch_is_refused_before_predicting() {
        // Weights trained with hidden width 3, config claims 4.
        let err = LoadedModel::from_bundle(bundle(8, 3)).unwrap_err();
        match err {
            PipelineError::ArtifactMismatch(msg) => assert!(msg.contains("LSTM"), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
