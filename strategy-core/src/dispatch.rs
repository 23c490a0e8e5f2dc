//! Per-sample worker dispatch.
//!
//! Runs one oracle task per sample index, either serially or on a rayon
//! pool. Every worker gets its own oracle clone. Results are tagged with the
//! sample index they belong to so callers can write them back by position.

use rayon::prelude::*;

use crate::error::CoreResult;
use crate::oracle::ProblemOracle;
use crate::settings::FilterSettings;

/// Run `task` for each index in `indices`.
///
/// The returned vector follows the order of `indices` and each entry carries
/// its sample index. The first task error aborts the whole batch.
pub fn dispatch<O, T, F>(
    settings: &FilterSettings,
    oracle: &O,
    indices: &[usize],
    task: F,
) -> CoreResult<Vec<(usize, T)>>
where
    O: ProblemOracle,
    T: Send,
    F: Fn(&mut O, usize) -> CoreResult<T> + Send + Sync,
{
    if !settings.parallel || indices.len() <= 1 {
        let mut worker = oracle.clone();
        return indices
            .iter()
            .map(|&i| task(&mut worker, i).map(|r| (i, r)))
            .collect();
    }

    let min_len = settings.batch_size.unwrap_or(1);
    let run = || {
        indices
            .par_iter()
            .with_min_len(min_len)
            .map_init(
                || oracle.clone(),
                |worker, &i| task(worker, i).map(|r| (i, r)),
            )
            .collect::<CoreResult<Vec<_>>>()
    };

    match settings.num_threads {
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new().num_threads(n).build()?;
            pool.install(run)
        }
        None => run(),
    }
}

/// Number of worker threads `dispatch` will use.
pub fn num_workers(settings: &FilterSettings) -> usize {
    if !settings.parallel {
        1
    } else {
        settings
            .num_threads
            .unwrap_or_else(rayon::current_num_threads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::testing::{ok, TableOracle};

    fn oracle(n: usize) -> TableOracle {
        let costs = (0..n).map(|i| vec![ok(i as f64)]).collect();
        let exact = (0..n).map(|i| (i as f64, 0)).collect();
        TableOracle::new(costs, exact)
    }

    #[test]
    fn test_results_keep_index_order() {
        let o = oracle(64);
        let indices: Vec<usize> = (0..64).rev().collect();
        let settings = FilterSettings::builtin().with_batch_size(3);

        let out = dispatch(&settings, &o, &indices, |w, i| {
            w.populate(&[i as f64])?;
            Ok(w.solve(&0)?.cost)
        })
        .unwrap();

        assert_eq!(out.len(), 64);
        for (k, (idx, cost)) in out.iter().enumerate() {
            assert_eq!(*idx, indices[k]);
            assert_eq!(*cost, *idx as f64);
        }
    }

    #[test]
    fn test_serial_matches_parallel() {
        let o = oracle(20);
        let indices: Vec<usize> = (0..20).step_by(2).collect();
        let task = |w: &mut TableOracle, i: usize| {
            w.populate(&[i as f64])?;
            w.solve_exact().map(|e| e.cost)
        };

        let par = dispatch(&FilterSettings::builtin(), &o, &indices, task).unwrap();
        let ser = dispatch(&FilterSettings::builtin().serial(), &o, &indices, task).unwrap();
        assert_eq!(par, ser);
    }

    #[test]
    fn test_error_propagates() {
        let o = oracle(4);
        let result = dispatch(&FilterSettings::builtin(), &o, &[0, 1, 2, 3], |w, i| {
            w.populate(&[i as f64])?;
            // strategy 7 does not exist
            w.solve(&7)
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_dedicated_pool() {
        let o = oracle(8);
        let settings = FilterSettings {
            num_threads: Some(2),
            ..Default::default()
        };
        assert_eq!(num_workers(&settings), 2);
        let out = dispatch(&settings, &o, &[5, 6, 7], |w, i| {
            w.populate(&[i as f64])?;
            Ok(i * 2)
        })
        .unwrap();
        assert_eq!(out, vec![(5, 10), (6, 12), (7, 14)]);
    }
}
