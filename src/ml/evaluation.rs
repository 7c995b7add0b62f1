// ============================================================
// Layer 5 — Evaluation Metrics
// ============================================================
// Accuracy over predicted vs. true class indices, plus precision,
// recall and F1 weighted by class support when more than one
// class is present. With a single class the report carries only
// accuracy.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedScores {
    pub precision: f64,
    pub recall:    f64,
    pub f1:        f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub samples:  usize,
    pub accuracy: f64,
    pub weighted: Option<WeightedScores>,
}

#[derive(Default, Clone, Copy)]
struct Counts {
    support: usize,
    tp:      usize,
    fp:      usize,
    fn_:     usize,
}

/// Score `predicted` against `actual`. Slices must be the same length;
/// extra entries in the longer one are ignored.
pub fn evaluate(actual: &[usize], predicted: &[usize]) -> EvaluationReport {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return EvaluationReport { samples: 0, accuracy: 0.0, weighted: None };
    }

    let mut per_class: BTreeMap<usize, Counts> = BTreeMap::new();
    let mut correct = 0usize;
    for (&a, &p) in actual.iter().zip(predicted).take(n) {
        per_class.entry(a).or_default().support += 1;
        if a == p {
            correct += 1;
            per_class.entry(a).or_default().tp += 1;
        } else {
            per_class.entry(a).or_default().fn_ += 1;
            per_class.entry(p).or_default().fp += 1;
        }
    }
    let accuracy = correct as f64 / n as f64;

    let classes_present = per_class.values().filter(|c| c.support > 0).count();
    if classes_present < 2 {
        return EvaluationReport { samples: n, accuracy, weighted: None };
    }

    // Classes that only ever appear as predictions have zero support and
    // contribute nothing to the weighted average.
    let mut scores = WeightedScores { precision: 0.0, recall: 0.0, f1: 0.0 };
    for c in per_class.values().filter(|c| c.support > 0) {
        let precision = ratio(c.tp, c.tp + c.fp);
        let recall    = ratio(c.tp, c.tp + c.fn_);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        let weight = c.support as f64 / n as f64;
        scores.precision += weight * precision;
        scores.recall    += weight * recall;
        scores.f1        += weight * f1;
    }

    EvaluationReport { samples: n, accuracy, weighted: Some(scores) }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_predictions() {
        let r = evaluate(&[0, 1, 2, 1], &[0, 1, 2, 1]);
        assert_eq!(r.accuracy, 1.0);
        let w = r.weighted.unwrap();
        assert!((w.precision - 1.0).abs() < 1e-12);
        assert!((w.f1 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_single_class_is_accuracy_only() {
        let r = evaluate(&[0, 0, 0], &[0, 1, 0]);
        assert!((r.accuracy - 2.0 / 3.0).abs() < 1e-12);
        assert!(r.weighted.is_none());
    }

    #[test]
    fn test_weighted_scores() {
        // class 0: support 2, tp 1, fn 1, fp 0 → p=1, r=0.5
        // class 1: support 2, tp 2, fp 1        → p=2/3, r=1
        let r = evaluate(&[0, 0, 1, 1], &[0, 1, 1, 1]);
        assert!((r.accuracy - 0.75).abs() < 1e-12);
        let w = r.weighted.unwrap();
        assert!((w.precision - (0.5 * 1.0 + 0.5 * 2.0 / 3.0)).abs() < 1e-12);
        assert!((w.recall - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_empty_input() {
        let r = evaluate(&[], &[]);
        assert_eq!(r.samples, 0);
        assert_eq!(r.accuracy, 0.0);
    }
}
