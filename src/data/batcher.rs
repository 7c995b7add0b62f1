// ============================================================
// Layer 4 — Class Batcher
// ============================================================
// Implements Burn's Batcher trait so the DataLoader can stack
// ClassSamples into tensors for one forward pass.
//
//   Input:  N samples, each with input_ids of length S
//   Output: ClassBatch { inputs: [N, S], targets: [N] }
//
// All sequences are already padded to max_sequence_length by the
// vocabulary, so stacking is a flatten-then-reshape.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::TensorData,
};

use crate::data::dataset::ClassSample;

// ─── ClassBatch ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct ClassBatch<B: Backend> {
    /// Token ids — shape: [batch_size, seq_len]
    pub inputs: Tensor<B, 2, Int>,

    /// Class indices — shape: [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

// ─── ClassBatcher ─────────────────────────────────────────────────────────────
/// Holds the device unlabeled inference inputs are stacked on.
#[derive(Clone, Debug)]
pub struct ClassBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> ClassBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    /// Stack unlabeled id sequences, used at inference time.
    pub fn inputs<'a, I>(&self, rows: I, batch_size: usize, seq_len: usize) -> Tensor<B, 2, Int>
    where
        I: IntoIterator<Item = &'a [u32]>,
    {
        stack_ids(rows, batch_size, seq_len, &self.device)
    }
}

fn stack_ids<'a, B, I>(rows: I, batch_size: usize, seq_len: usize, device: &B::Device) -> Tensor<B, 2, Int>
where
    B: Backend,
    I: IntoIterator<Item = &'a [u32]>,
{
    let flat: Vec<i64> = rows
        .into_iter()
        .flat_map(|row| row.iter().map(|&id| id as i64))
        .collect();
    Tensor::<B, 2, Int>::from_ints(TensorData::new(flat, [batch_size, seq_len]), device)
}

// ─── Burn Batcher Trait Implementation ────────────────────────────────────────
// The DataLoader calls .batch(items, device) with each mini-batch.
impl<B: Backend> Batcher<B, ClassSample, ClassBatch<B>> for ClassBatcher<B> {
    fn batch(&self, items: Vec<ClassSample>, device: &B::Device) -> ClassBatch<B> {
        let batch_size = items.len();
        let seq_len    = items.first().map(|s| s.input_ids.len()).unwrap_or(0);

        let inputs = stack_ids(items.iter().map(|s| s.input_ids.as_slice()), batch_size, seq_len, device);

        let labels: Vec<i64> = items.iter().map(|s| s.label as i64).collect();
        let targets = Tensor::<B, 1, Int>::from_ints(TensorData::new(labels, [batch_size]), device);

        ClassBatch { inputs, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::data::dataloader::DataLoaderBuilder;

    use crate::data::dataset::ClassDataset;

    #[test]
    fn test_batch_shapes() {
        let a = ClassSample { input_ids: vec![0, 0, 4, 5], label: 1 };
        let b = ClassSample { input_ids: vec![0, 3, 4, 5], label: 0 };
        let batcher = ClassBatcher::<NdArray>::new(Default::default());
        let batch: ClassBatch<NdArray> = batcher.batch(vec![a, b], &Default::default());
        assert_eq!(batch.inputs.dims(), [2, 4]);
        assert_eq!(batch.targets.dims(), [2]);
    }

    #[test]
    fn test_loader_covers_every_sample_once() {
        let samples = (0..5)
            .map(|i| ClassSample { input_ids: vec![0, i as u32 + 2], label: i })
            .collect();
        let loader = DataLoaderBuilder::new(ClassBatcher::<NdArray>::new(Default::default()))
            .batch_size(2)
            .shuffle(7)
            .num_workers(1)
            .build(ClassDataset::new(samples));

        let mut sizes = Vec::new();
        let mut labels = Vec::new();
        for batch in loader.iter() {
            let batch: ClassBatch<NdArray> = batch;
            sizes.push(batch.targets.dims()[0]);
            labels.extend(batch.targets.into_data().convert::<i64>().to_vec::<i64>().unwrap());
        }
        sizes.sort_unstable();
        labels.sort_unstable();
        assert_eq!(sizes, vec![1, 2, 2]);
        assert_eq!(labels, vec![0, 1, 2, 3, 4]);
    }
}
