// ============================================================
// Layer 4 — Stratified Train/Validation Splitter
// ============================================================
// Splits samples into training and validation sets class by
// class, so each class keeps its share in both where the count
// allows it:
//
//   n == 1  → the sample stays in training
//   n >= 2  → round(n * fraction) go to validation, clamped to
//             [1, n - 1] so training never loses a class
//
// Shuffling uses a seeded StdRng, so a given corpus and seed
// always produce the same split.

use std::collections::HashMap;
use std::hash::Hash;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Split `samples` by the class returned from `class_of`.
///
/// Returns `(train, validation)`. Classes are visited in first-seen
/// order, so output order is deterministic for a fixed seed.
pub fn stratified_split<T, K, F>(
    samples: Vec<T>,
    class_of: F,
    val_fraction: f64,
    seed: u64,
) -> (Vec<T>, Vec<T>)
where
    K: Eq + Hash + Clone,
    F: Fn(&T) -> K,
{
    let total = samples.len();
    let fraction = val_fraction.clamp(0.0, 1.0);
    let mut rng = StdRng::seed_from_u64(seed);

    // Group while remembering first-seen class order
    let mut order: Vec<K> = Vec::new();
    let mut groups: HashMap<K, Vec<T>> = HashMap::new();
    for sample in samples {
        let key = class_of(&sample);
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(sample);
    }

    let mut train = Vec::with_capacity(total);
    let mut val = Vec::new();
    for key in order {
        let Some(mut group) = groups.remove(&key) else {
            continue;
        };
        group.shuffle(&mut rng);
        let n = group.len();
        let n_val = if n < 2 || fraction == 0.0 {
            0
        } else {
            ((n as f64 * fraction).round() as usize).clamp(1, n - 1)
        };
        let held_out = group.split_off(n - n_val);
        train.extend(group);
        val.extend(held_out);
    }

    tracing::debug!(
        "Stratified split: {} training, {} validation (requested {:.0}%)",
        train.len(),
        val.len(),
        fraction * 100.0,
    );

    (train, val)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_all_items_preserved() {
        let items: Vec<(usize, u8)> = (0..50).map(|i| (i, (i % 5) as u8)).collect();
        let (train, val) = stratified_split(items, |s| s.1, 0.2, 42);
        assert_eq!(train.len() + val.len(), 50);
        let ids: HashSet<usize> = train.iter().chain(val.iter()).map(|s| s.0).collect();
        assert_eq!(ids.len(), 50);
    }

    #[test]
    fn test_each_class_proportional() {
        let items: Vec<(usize, u8)> = (0..50).map(|i| (i, (i % 5) as u8)).collect();
        let (train, val) = stratified_split(items, |s| s.1, 0.2, 42);
        for class in 0..5u8 {
            assert_eq!(val.iter().filter(|s| s.1 == class).count(), 2);
            assert_eq!(train.iter().filter(|s| s.1 == class).count(), 8);
        }
    }

    #[test]
    fn test_singletons_stay_in_training() {
        let items = vec![("a", 1), ("b", 2), ("c", 3)];
        let (train, val) = stratified_split(items, |s| s.1, 0.2, 7);
        assert_eq!(train.len(), 3);
        assert!(val.is_empty());
    }

    #[test]
    fn test_training_keeps_every_class() {
        // Two of a kind with a large fraction still leaves one in training.
        let items = vec![("a", 1), ("b", 1), ("c", 2), ("d", 2)];
        let (train, val) = stratified_split(items, |s| s.1, 0.9, 7);
        let train_classes: HashSet<i32> = train.iter().map(|s| s.1).collect();
        assert_eq!(train_classes.len(), 2);
        assert_eq!(val.len(), 2);
    }

    #[test]
    fn test_seed_is_deterministic() {
        let make = || (0..30).map(|i| (i, i % 3)).collect::<Vec<_>>();
        let a = stratified_split(make(), |s| s.1, 0.3, 9);
        let b = stratified_split(make(), |s| s.1, 0.3, 9);
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_dataset() {
        let (train, val) = stratified_split(Vec::<(u8, u8)>::new(), |s| s.1, 0.2, 1);
        assert!(train.is_empty());
        assert!(val.is_empty());
    }
}
