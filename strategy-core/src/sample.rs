//! Parameter samples with their exact optimal objective.

use crate::dispatch::dispatch;
use crate::error::{CoreError, CoreResult};
use crate::oracle::ProblemOracle;
use crate::settings::FilterSettings;

/// One parameter instance and its exact optimal objective value.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSample {
    theta: Vec<f64>,
    obj: f64,
}

impl ParameterSample {
    /// Create a sample.
    pub fn new(theta: Vec<f64>, obj: f64) -> Self {
        Self { theta, obj }
    }

    /// Parameter vector.
    pub fn theta(&self) -> &[f64] {
        &self.theta
    }

    /// Exact optimal objective value.
    pub fn obj(&self) -> f64 {
        self.obj
    }
}

/// Training samples, addressed by position.
#[derive(Debug, Clone, Default)]
pub struct SampleSet {
    samples: Vec<ParameterSample>,
}

impl SampleSet {
    /// Create a sample set. All parameter vectors must have the same length.
    pub fn new(samples: Vec<ParameterSample>) -> CoreResult<Self> {
        if let Some(first) = samples.first() {
            let dim = first.theta.len();
            if let Some((i, s)) = samples
                .iter()
                .enumerate()
                .find(|(_, s)| s.theta.len() != dim)
            {
                return Err(CoreError::InvalidSamples(format!(
                    "sample {} has {} parameters, expected {}",
                    i,
                    s.theta.len(),
                    dim
                )));
            }
        }
        Ok(Self { samples })
    }

    /// Solve every parameter instance exactly.
    ///
    /// Returns the samples (with their optimal objective) and the raw
    /// strategy found for each one, in input order.
    pub fn solve<O: ProblemOracle>(
        oracle: &O,
        parameters: &[Vec<f64>],
        settings: &FilterSettings,
    ) -> CoreResult<(Self, Vec<O::Strategy>)> {
        settings.validate()?;
        let n_param = oracle.num_parameters();
        if let Some((i, p)) = parameters
            .iter()
            .enumerate()
            .find(|(_, p)| p.len() != n_param)
        {
            return Err(CoreError::InvalidSamples(format!(
                "parameter {} has length {}, oracle expects {}",
                i,
                p.len(),
                n_param
            )));
        }

        if settings.verbose {
            log::info!("Solving {} samples exactly", parameters.len());
        }

        let indices: Vec<usize> = (0..parameters.len()).collect();
        let solved = dispatch(settings, oracle, &indices, |worker, i| {
            worker.populate(&parameters[i])?;
            worker.solve_exact()
        })?;

        let mut samples = Vec::with_capacity(solved.len());
        let mut strategies = Vec::with_capacity(solved.len());
        for (i, exact) in solved {
            samples.push(ParameterSample::new(parameters[i].clone(), exact.cost));
            strategies.push(exact.strategy);
        }

        Ok((Self { samples }, strategies))
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True if there are no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample at position `i`.
    pub fn get(&self, i: usize) -> &ParameterSample {
        &self.samples[i]
    }

    /// Iterate over samples.
    pub fn iter(&self) -> std::slice::Iter<'_, ParameterSample> {
        self.samples.iter()
    }

    /// Parameter vectors as rows (learner features).
    pub fn features(&self) -> Vec<Vec<f64>> {
        self.samples.iter().map(|s| s.theta.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::testing::{ok, TableOracle};

    #[test]
    fn test_ragged_rejected() {
        let samples = vec![
            ParameterSample::new(vec![1.0, 2.0], 0.0),
            ParameterSample::new(vec![1.0], 0.0),
        ];
        assert!(matches!(
            SampleSet::new(samples),
            Err(CoreError::InvalidSamples(_))
        ));
        assert!(SampleSet::new(Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn test_solve_exact_in_order() {
        let costs = vec![vec![ok(0.0)]; 5];
        let exact = vec![(1.0, 3), (2.0, 1), (3.0, 3), (4.0, 0), (5.0, 1)];
        let oracle = TableOracle::new(costs, exact);
        let params: Vec<Vec<f64>> = (0..5).map(|i| vec![i as f64]).collect();

        let (samples, strategies) =
            SampleSet::solve(&oracle, &params, &FilterSettings::builtin()).unwrap();

        assert_eq!(samples.len(), 5);
        assert_eq!(strategies, vec![3, 1, 3, 0, 1]);
        for (i, s) in samples.iter().enumerate() {
            assert_eq!(s.obj(), (i + 1) as f64);
            assert_eq!(s.theta(), &[i as f64]);
        }
    }

    #[test]
    fn test_solve_wrong_dimension() {
        let oracle = TableOracle::new(vec![vec![ok(0.0)]], vec![(0.0, 0)]);
        let params = vec![vec![0.0, 1.0]];
        assert!(SampleSet::solve(&oracle, &params, &FilterSettings::builtin()).is_err());
    }
}
