use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

/// One vectorised training sample: a fixed-length id sequence and
/// the class index of its solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSample {
    pub input_ids: Vec<u32>,
    pub label:     usize,
}

#[derive(Debug, Clone, Default)]
pub struct ClassDataset {
    samples: Vec<ClassSample>,
}

impl ClassDataset {
    pub fn new(samples: Vec<ClassSample>) -> Self { Self { samples } }

    pub fn sample_count(&self) -> usize { self.samples.len() }
}

impl Dataset<ClassSample> for ClassDataset {
    fn get(&self, index: usize) -> Option<ClassSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
