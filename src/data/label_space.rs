// ============================================================
// Layer 4 — Label Space
// ============================================================
// Bijection between solution strings and class indices.
// Every distinct (already normalized) solution string is its
// own class; indices follow first-seen order. No clustering of
// equivalent answers happens here.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "Vec<String>", try_from = "Vec<String>")]
pub struct LabelSpace {
    labels: Vec<String>,
    index: HashMap<String, usize>,
}

impl LabelSpace {
    /// Assign indices in first-seen order; repeats are ignored.
    pub fn fit<I, S>(solutions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut labels = Vec::new();
        let mut index = HashMap::new();
        for s in solutions {
            let s = s.as_ref();
            if !index.contains_key(s) {
                index.insert(s.to_string(), labels.len());
                labels.push(s.to_string());
            }
        }
        Self { labels, index }
    }

    pub fn encode(&self, solution: &str) -> Result<usize> {
        self.index
            .get(solution)
            .copied()
            .ok_or_else(|| PipelineError::UnknownLabel(solution.to_string()))
    }

    /// Total over `[0, len())`; `None` only outside the fitted range.
    pub fn decode(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

impl From<LabelSpace> for Vec<String> {
    fn from(space: LabelSpace) -> Self {
        space.labels
    }
}

impl TryFrom<Vec<String>> for LabelSpace {
    type Error = String;

    /// Persisted label lists must already be a bijection.
    fn try_from(labels: Vec<String>) -> std::result::Result<Self, Self::Error> {
        let mut index = HashMap::with_capacity(labels.len());
        for (i, label) in labels.iter().enumerate() {
            if index.insert(label.clone(), i).is_some() {
                return Err(format!("duplicate label {label:?} at index {i}"));
            }
        }
        Ok(Self { labels, index })
    }
}
