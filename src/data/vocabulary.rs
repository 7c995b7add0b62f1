// ============================================================
// Layer 4 — Vocabulary
// ============================================================
// Frequency-ranked word vocabulary built once per training run
// and frozen with the bundle.
//
// The vocabulary is a HuggingFace WordLevel tokenizer written
// as JSON directly (no trainer round-trip):
//
//   [PAD] → 0    left padding
//   [UNK] → 1    every token not seen while fitting
//   words → 2..  descending frequency, ties in first-seen order
//
// The Whitespace pre-tokenizer splits on `\w+|[^\w\s]+`, the
// same rule `normalizer::tokenize_candidates` uses for counting.

use std::collections::HashMap;
use std::str::FromStr;

use tokenizers::Tokenizer;

use crate::data::normalizer::{normalize, tokenize_candidates};
use crate::error::{PipelineError, Result};

pub const PAD_TOKEN: &str = "[PAD]";
pub const UNK_TOKEN: &str = "[UNK]";
pub const PAD_ID: u32 = 0;
pub const UNK_ID: u32 = 1;
const RESERVED: usize = 2;

#[derive(Clone)]
pub struct Vocabulary {
    tokenizer: Tokenizer,
    size: usize,
}

impl std::fmt::Debug for Vocabulary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vocabulary").field("size", &self.size).finish()
    }
}

impl Vocabulary {
    /// Build a vocabulary from problem texts, capped at `max_size`
    /// entries including the two reserved ids.
    pub fn fit<I, S>(texts: I, max_size: usize) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        // ── Count words, remembering first-seen order for ties ────────────────
        let mut freq: HashMap<String, (usize, usize)> = HashMap::new();
        let mut seen = 0usize;
        for text in texts {
            for token in tokenize_candidates(&normalize(text.as_ref())) {
                let entry = freq.entry(token).or_insert_with(|| {
                    seen += 1;
                    (0, seen)
                });
                entry.0 += 1;
            }
        }

        let mut words: Vec<(String, (usize, usize))> = freq.into_iter().collect();
        words.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
        words.truncate(max_size.max(RESERVED) - RESERVED);

        let mut vocab = serde_json::Map::new();
        vocab.insert(PAD_TOKEN.to_string(), PAD_ID.into());
        vocab.insert(UNK_TOKEN.to_string(), UNK_ID.into());
        for (i, (word, _)) in words.iter().enumerate() {
            vocab.insert(word.clone(), ((i + RESERVED) as u64).into());
        }

        let json = tokenizer_json(serde_json::Value::Object(vocab));
        let vocabulary = Self::from_json(&json.to_string())?;
        tracing::debug!("Vocabulary fitted with {} entries", vocabulary.len());
        Ok(vocabulary)
    }

    /// Restore a vocabulary from its persisted tokenizer JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let tokenizer =
            Tokenizer::from_str(json).map_err(|e| PipelineError::Tokenizer(e.to_string()))?;
        let size = tokenizer.get_vocab_size(false);
        if tokenizer.token_to_id(PAD_TOKEN) != Some(PAD_ID)
            || tokenizer.token_to_id(UNK_TOKEN) != Some(UNK_ID)
        {
            return Err(PipelineError::ArtifactMismatch(
                "vocabulary does not reserve [PAD]=0 and [UNK]=1".to_string(),
            ));
        }
        Ok(Self { tokenizer, size })
    }

    /// Tokenizer JSON for persistence.
    pub fn to_json(&self) -> Result<String> {
        self.tokenizer
            .to_string(true)
            .map_err(|e| PipelineError::Tokenizer(e.to_string()))
    }

    /// Number of ids, reserved ones included. Sizes the embedding table.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size <= RESERVED
    }

    pub fn token_id(&self, token: &str) -> Option<u32> {
        self.tokenizer.token_to_id(token)
    }

    /// Normalize, tokenize and map `text` to exactly `max_length` ids.
    /// Unseen tokens map to `[UNK]`; short sequences are left-padded
    /// with `[PAD]`, long ones keep their last `max_length` tokens.
    pub fn transform(&self, text: &str, max_length: usize) -> Result<Vec<u32>> {
        let normalized = normalize(text);
        let encoding = self
            .tokenizer
            .encode(normalized.as_str(), false)
            .map_err(|e| PipelineError::Tokenizer(e.to_string()))?;
        Ok(pad_left(encoding.get_ids(), max_length))
    }
}

/// Left-pad with `[PAD]` or keep the tail, to exactly `max_length`.
pub fn pad_left(ids: &[u32], max_length: usize) -> Vec<u32> {
    if ids.len() >= max_length {
        return ids[ids.len() - max_length..].to_vec();
    }
    let mut out = vec![PAD_ID; max_length - ids.len()];
    out.extend_from_slice(ids);
    out
}

fn tokenizer_json(vocab: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [
            {"id": PAD_ID, "content": PAD_TOKEN, "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
            {"id": UNK_ID, "content": UNK_TOKEN, "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
        ],
        "normalizer": null,
        "pre_tokenizer": {
            "type": "Whitespace"
        },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": vocab,
            "unk_token": UNK_TOKEN
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<&'static str> {
        vec!["What is 2+2?", "What is 3+3?", "Solve for x: x + 2 = 4"]
    }

    #[test]
    fn test_reserved_ids() {
        let v = Vocabulary::fit(corpus(), 100).unwrap();
        assert_eq!(v.token_id(PAD_TOKEN), Some(PAD_ID));
        assert_eq!(v.token_id(UNK_TOKEN), Some(UNK_ID));
    }

    #[test]
    fn test_frequency_ranking() {
        let v = Vocabulary::fit(corpus(), 100).unwrap();
        // "+" occurs 3 times, "2" 3 times; "+" was seen after "2".
        assert_eq!(v.token_id("2"), Some(2));
        assert_eq!(v.token_id("+"), Some(3));
    }

    #[test]
    fn test_cap_respected() {
        let v = Vocabulary::fit(corpus(), 5).unwrap();
        assert_eq!(v.len(), 5);
        let tiny = Vocabulary::fit(corpus(), 0).unwrap();
        assert_eq!(tiny.len(), 2);
        assert!(tiny.is_empty());
    }

    #[test]
    fn test_transform_left_pads_and_maps_unknowns() {
        let v = Vocabulary::fit(corpus(), 100).unwrap();
        let ids = v.transform("What is 9+2?", 8).unwrap();
        assert_eq!(ids.len(), 8);
        assert_eq!(&ids[..3], &[PAD_ID, PAD_ID, PAD_ID]);
        // "9" was never seen.
        assert_eq!(ids[5], UNK_ID);
        assert_eq!(ids[7], v.token_id("2").unwrap());
    }

    #[test]
    fn test_transform_never_fails_on_odd_input() {
        let v = Vocabulary::fit(corpus(), 100).unwrap();
        assert_eq!(v.transform("", 4).unwrap(), vec![PAD_ID; 4]);
        assert_eq!(v.transform("ζζζ 🎉", 2).unwrap(), vec![PAD_ID, UNK_ID]);
    }

    #[test]
    fn test_truncation_keeps_tail() {
        assert_eq!(pad_left(&[5, 6, 7, 8], 2), vec![7, 8]);
        assert_eq!(pad_left(&[5], 3), vec![0, 0, 5]);
    }

    #[test]
    fn test_json_round_trip_preserves_ids() {
        let v = Vocabulary::fit(corpus(), 100).unwrap();
        let restored = Vocabulary::from_json(&v.to_json().unwrap()).unwrap();
        assert_eq!(restored.len(), v.len());
        assert_eq!(restored.token_id("solve"), v.token_id("solve"));
    }
}
