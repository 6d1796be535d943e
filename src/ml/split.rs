//! Seeded stratified train / held-out split.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Row indices of the two subsets, each sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Split row indices so each class keeps its share in both subsets.
///
/// Per class, `round(n_class * test_size)` rows go to the held-out subset,
/// clamped so a class with at least two rows lands in both subsets. The same
/// `(labels, test_size, seed)` always yields the same split.
#[must_use]
pub fn stratified_split(labels: &[u8], test_size: f64, seed: u64) -> Split {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut classes: Vec<u8> = labels.to_vec();
    classes.sort_unstable();
    classes.dedup();

    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();

    for class in classes {
        let mut members: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, &l)| l == class)
            .map(|(i, _)| i)
            .collect();
        members.shuffle(&mut rng);

        let n = members.len();
        let n_test = if n < 2 {
            0
        } else {
            ((n as f64 * test_size).round() as usize).clamp(1, n - 1)
        };
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    Split { train, test }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pos: usize, neg: usize) -> Vec<u8> {
        let mut v = vec![1u8; pos];
        v.extend(std::iter::repeat(0u8).take(neg));
        v
    }

    #[test]
    fn test_split_preserves_class_balance() {
        let y = labels(60, 40);
        let split = stratified_split(&y, 0.2, 42);

        assert_eq!(split.train.len() + split.test.len(), 100);
        assert_eq!(split.test.len(), 20);
        let test_pos = split.test.iter().filter(|&&i| y[i] == 1).count();
        assert_eq!(test_pos, 12);
    }

    #[test]
    fn test_split_is_reproducible_and_disjoint() {
        let y = labels(33, 21);
        let a = stratified_split(&y, 0.2, 7);
        let b = stratified_split(&y, 0.2, 7);
        assert_eq!(a, b);
        assert!(a.train.iter().all(|i| !a.test.contains(i)));

        let c = stratified_split(&y, 0.2, 8);
        assert_ne!(a.test, c.test);
    }

    #[test]
    fn test_small_classes_land_in_both_subsets() {
        let y = labels(2, 3);
        let split = stratified_split(&y, 0.2, 1);
        assert!(split.test.iter().any(|&i| y[i] == 1));
        assert!(split.train.iter().any(|&i| y[i] == 1));
    }
}
