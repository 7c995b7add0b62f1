use burn::{
    nn::{
        loss::CrossEntropyLossConfig,
        BiLstm, BiLstmConfig,
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation::relu,
};

use crate::data::vocabulary::PAD_ID;
use crate::error::PipelineError;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally — do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    pub vocab_size:    usize,
    pub num_classes:   usize,
    #[config(default = 128)]
    pub embedding_dim: usize,
    #[config(default = 64)]
    pub hidden_dim:    usize,
    #[config(default = 128)]
    pub dense_dim:     usize,
    #[config(default = 0.3)]
    pub dropout:       f64,
}

impl ClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ClassifierModel<B> {
        let embedding = EmbeddingConfig::new(self.vocab_size, self.embedding_dim).init(device);
        let encoder   = BiLstmConfig::new(self.embedding_dim, self.hidden_dim, true).init(device);
        let dense     = LinearConfig::new(2 * self.hidden_dim, self.dense_dim).init(device);
        let head      = LinearConfig::new(self.dense_dim, self.num_classes).init(device);
        let dropout   = DropoutConfig::new(self.dropout).init();
        ClassifierModel { embedding, encoder, dense, head, dropout }
    }

    /// Check every weight matrix in `record` against this config.
    ///
    /// Loading a record does not validate shapes, so a mismatch would
    /// otherwise surface as a panic in the first forward pass.
    pub fn check_record<B: Backend>(&self, record: &ClassifierModelRecord<B>) -> crate::error::Result<()> {
        let (embed, hidden) = (self.embedding_dim, self.hidden_dim);

        expect_dims("embedding table", record.embedding.weight.val().dims(), [self.vocab_size, embed])?;

        for (direction, lstm) in [("forward", &record.encoder.forward), ("reverse", &record.encoder.reverse)] {
            let gates = [
                ("input", &lstm.input_gate),
                ("forget", &lstm.forget_gate),
                ("output", &lstm.output_gate),
                ("cell", &lstm.cell_gate),
            ];
            for (gate, controller) in gates {
                expect_dims(
                    &format!("{direction} LSTM {gate} gate input transform"),
                    controller.input_transform.weight.val().dims(),
                    [embed, hidden],
                )?;
                expect_dims(
                    &format!("{direction} LSTM {gate} gate hidden transform"),
                    controller.hidden_transform.weight.val().dims(),
                    [hidden, hidden],
                )?;
            }
        }

        expect_dims("dense layer", record.dense.weight.val().dims(), [2 * hidden, self.dense_dim])?;
        expect_dims("output head", record.head.weight.val().dims(), [self.dense_dim, self.num_classes])
    }
}

fn expect_dims(what: &str, found: [usize; 2], expected: [usize; 2]) -> crate::error::Result<()> {
    if found == expected {
        Ok(())
    } else {
        Err(PipelineError::ArtifactMismatch(format!(
            "{what} is {found:?}, config expects {expected:?}"
        )))
    }
}

/// Embedding → bidirectional LSTM → masked mean pool → dense/ReLU → softmax head.
///
/// Padding positions (id 0) still run through the LSTM but are excluded
/// from the pooled representation, so left padding does not dilute short
/// problems.
#[derive(Module, Debug)]
pub struct ClassifierModel<B: Backend> {
    pub embedding: Embedding<B>,
    pub encoder:   BiLstm<B>,
    pub dense:     Linear<B>,
    pub head:      Linear<B>,
    pub dropout:   Dropout,
}

impl<B: Backend> ClassifierModel<B> {
    /// input_ids: [batch, seq_len] → logits: [batch, num_classes]
    pub fn forward(&self, input_ids: Tensor<B, 2, Int>) -> Tensor<B, 2> {
        let [batch_size, seq_len] = input_ids.dims();

        // 1 for real tokens, 0 for [PAD]
        let mask = input_ids.clone().greater_elem(PAD_ID as i64).float(); // [batch, seq_len]

        let x = self.embedding.forward(input_ids);              // [batch, seq_len, embed]
        let (encoded, _) = self.encoder.forward(x, None);       // [batch, seq_len, 2*hidden]
        let width = encoded.dims()[2];

        let mask3 = mask.clone()
            .unsqueeze_dim::<3>(2)
            .expand([batch_size, seq_len, width]);
        let summed = (encoded * mask3).sum_dim(1).reshape([batch_size, width]);
        let counts = mask.sum_dim(1).clamp_min(1.0).expand([batch_size, width]);
        let pooled = summed / counts;

        let x = self.dropout.forward(pooled);
        let x = relu(self.dense.forward(x));
        let x = self.dropout.forward(x);
        self.head.forward(x)
    }

    /// Mean cross-entropy over the batch, plus the logits it was computed from.
    pub fn forward_loss(
        &self,
        input_ids: Tensor<B, 2, Int>,
        targets:   Tensor<B, 1, Int>,
    ) -> (Tensor<B, 1>, Tensor<B, 2>) {
        let logits = self.forward(input_ids);
        let ce = CrossEntropyLossConfig::new().init(&logits.device());
        let loss = ce.forward(logits.clone(), targets);
        (loss, logits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::activation::softmax;
    use burn::tensor::TensorData;

    fn tiny() -> ClassifierConfig {
        ClassifierConfig::new(12, 3)
            .with_embedding_dim(8)
            .with_hidden_dim(4)
            .with_dense_dim(8)
            .with_dropout(0.0)
    }

    #[test]
    fn test_forward_shape_and_softmax_sums_to_one() {
        let device = Default::default();
        let model: ClassifierModel<NdArray> = tiny().init(&device);
        let ids = Tensor::<NdArray, 2, Int>::from_ints(
            TensorData::new(vec![0i64, 0, 2, 3, 0, 4, 5, 6], [2, 4]),
            &device,
        );
        let logits = model.forward(ids);
        assert_eq!(logits.dims(), [2, 3]);

        let probs: Vec<f32> = softmax(logits, 1).into_data().to_vec().unwrap();
        for row in probs.chunks(3) {
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_all_padding_row_is_finite() {
        let device = Default::default();
        let model: ClassifierModel<NdArray> = tiny().init(&device);
        let ids = Tensor::<NdArray, 2, Int>::from_ints(TensorData::new(vec![0i64; 4], [1, 4]), &device);
        let logits: Vec<f32> = model.forward(ids).into_data().to_vec().unwrap();
        assert!(logits.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_record_matches_its_own_config() {
        let model: ClassifierModel<NdArray> = tiny().init(&Default::default());
        tiny().check_record(&model.into_record()).unwrap();
    }

    #[test]
    fn test_record_with_other_hidden_width_is_refused() {
        let model: ClassifierModel<NdArray> = tiny().with_hidden_dim(5).init(&Default::default());
        let err = tiny().check_record(&model.into_record()).unwrap_err();
        match err {
            PipelineError::ArtifactMismatch(msg) => {
                assert!(msg.starts_with("forward LSTM input gate input transform"), "{msg}")
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
