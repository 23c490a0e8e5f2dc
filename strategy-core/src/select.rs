//! Frequency-based strategy selection.

use crate::encoding::LabelAssignment;
use crate::error::CoreResult;

/// Select the most frequent strategies covering more than `coverage_fraction`
/// of the samples.
///
/// Strategies are taken by decreasing sample count; equal counts keep
/// ascending index order. Accumulation stops as soon as the covered sample
/// count strictly exceeds `coverage_fraction * n_samples`, so with a fraction
/// of 1 or more every strategy is returned.
///
/// Returns indices into the encoding in selection order. Fails if the labels
/// do not use exactly the `n_strategies` entries of the encoding.
pub fn select_strategies(
    labels: &LabelAssignment,
    n_strategies: usize,
    coverage_fraction: f64,
) -> CoreResult<Vec<usize>> {
    let counts = labels.counts(n_strategies)?;
    let threshold = coverage_fraction * labels.len() as f64;

    let mut order: Vec<usize> = (0..n_strategies).collect();
    // Stable: ties stay in index order
    order.sort_by(|&a, &b| counts[b].cmp(&counts[a]));

    let mut selected = Vec::new();
    let mut covered = 0usize;
    for idx in order {
        covered += counts[idx];
        selected.push(idx);
        if covered as f64 > threshold {
            break;
        }
    }

    Ok(selected)
}

/// Samples covered by `selected`.
pub fn covered_samples(labels: &LabelAssignment, selected: &[usize]) -> usize {
    labels
        .as_slice()
        .iter()
        .filter(|l| l.map_or(false, |l| selected.contains(&l)))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    /// Labels with `freqs[k]` samples of strategy `k`.
    fn labels_from_freqs(freqs: &[usize]) -> LabelAssignment {
        let mut labels = Vec::new();
        for (k, &f) in freqs.iter().enumerate() {
            labels.extend(std::iter::repeat(k).take(f));
        }
        LabelAssignment::from_indices(labels)
    }

    #[test]
    fn test_reference_frequencies() {
        let labels = labels_from_freqs(&[40, 10, 10, 10, 6, 6, 6, 6, 3, 3]);
        let selected = select_strategies(&labels, 10, 0.5).unwrap();

        // 40 -> 50 (not > 50) -> 60
        assert_eq!(selected, vec![0, 1, 2]);
        assert_eq!(covered_samples(&labels, &selected), 60);
    }

    #[test]
    fn test_ties_follow_index_order() {
        let labels = labels_from_freqs(&[2, 5, 5, 1, 5]);
        let selected = select_strategies(&labels, 5, 0.99).unwrap();
        assert_eq!(selected, vec![1, 2, 4, 0, 3]);

        let selected = select_strategies(&labels, 5, 0.5).unwrap();
        assert_eq!(selected, vec![1, 2]);
    }

    #[test]
    fn test_full_fraction_selects_everything() {
        let labels = labels_from_freqs(&[3, 1, 4, 1, 5]);
        let selected = select_strategies(&labels, 5, 1.0).unwrap();
        assert_eq!(selected.len(), 5);
        assert_eq!(covered_samples(&labels, &selected), labels.len());
    }

    #[test]
    fn test_single_strategy() {
        let labels = labels_from_freqs(&[7]);
        assert_eq!(select_strategies(&labels, 1, 0.1).unwrap(), vec![0]);
    }

    #[test]
    fn test_missing_strategy_is_fatal() {
        let labels = labels_from_freqs(&[4, 0, 2]);
        assert!(matches!(
            select_strategies(&labels, 3, 0.5),
            Err(CoreError::Precondition(_))
        ));
    }

    #[test]
    fn test_coverage_property_random() {
        use rand::{Rng, SeedableRng};
        use rand_chacha::ChaCha8Rng;

        let mut rng = ChaCha8Rng::seed_from_u64(2024);

        for _ in 0..50 {
            let k = rng.gen_range(1..12);
            let freqs: Vec<usize> = (0..k).map(|_| rng.gen_range(1..30)).collect();
            let labels = labels_from_freqs(&freqs);
            let n = labels.len() as f64;
            let fraction = rng.gen_range(0.05..0.99);

            let selected = select_strategies(&labels, k, fraction).unwrap();
            let covered = covered_samples(&labels, &selected);
            assert!(covered as f64 > fraction * n);

            if selected.len() > 1 {
                let without_last = covered_samples(&labels, &selected[..selected.len() - 1]);
                assert!(without_last as f64 <= fraction * n);
            }
        }
    }
}
