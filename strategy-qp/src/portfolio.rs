//! Long-only portfolio problem family.
//!
//! ```text
//! minimize    -μ^T x + γ x^T Σ x
//! subject to  1^T x = 1
//!             x >= 0
//! ```
//!
//! with θ = μ. The covariance is a factor model `Σ = F F^T + D` where `F` is
//! `n × k` with half its entries drawn standard normal and `D` is diagonal
//! with entries uniform in `[0, √k)`. There are `n = 10 k` assets.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use crate::problem::ParametricQp;
use crate::sparse::{from_triplets, from_triplets_symmetric, zeros};

/// Assets per factor.
pub const ASSETS_PER_FACTOR: usize = 10;

/// Sampling radius around the nominal returns.
pub const DEFAULT_RADIUS: f64 = 0.3;

/// A portfolio problem together with its nominal parameter.
#[derive(Debug, Clone)]
pub struct Portfolio {
    /// The parametric QP (θ = expected returns).
    pub problem: ParametricQp,

    /// Nominal expected returns.
    pub theta_bar: Vec<f64>,

    /// Suggested sampling radius around `theta_bar`.
    pub radius: f64,
}

impl Portfolio {
    /// Number of assets.
    pub fn num_assets(&self) -> usize {
        self.theta_bar.len()
    }
}

/// Build a random portfolio problem with `n_factors` factors and risk
/// aversion `gamma`.
pub fn portfolio(n_factors: usize, gamma: f64, seed: u64) -> Portfolio {
    let k = n_factors.max(1);
    let n = ASSETS_PER_FACTOR * k;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    // Factor loadings, density 0.5
    let mut loadings = vec![vec![0.0; k]; n];
    for row in loadings.iter_mut() {
        for v in row.iter_mut() {
            if rng.gen::<f64>() < 0.5 {
                *v = rng.sample(StandardNormal);
            }
        }
    }
    let d: Vec<f64> = (0..n).map(|_| rng.gen::<f64>() * (k as f64).sqrt()).collect();

    // P = 2γΣ, upper triangle
    let mut triplets = Vec::with_capacity(n * (n + 1) / 2);
    for i in 0..n {
        for j in i..n {
            let mut sigma: f64 = loadings[i]
                .iter()
                .zip(&loadings[j])
                .map(|(a, b)| a * b)
                .sum();
            if i == j {
                sigma += d[i];
            }
            if sigma != 0.0 {
                triplets.push((i, j, 2.0 * gamma * sigma));
            }
        }
    }
    let p = from_triplets_symmetric(n, triplets);

    let theta_bar: Vec<f64> = (0..n).map(|_| rng.sample(StandardNormal)).collect();

    let problem = ParametricQp {
        P: p,
        q: vec![0.0; n],
        Q: from_triplets(n, n, (0..n).map(|i| (i, i, -1.0))),
        A: from_triplets(n, n, (0..n).map(|i| (i, i, -1.0))),
        b: vec![0.0; n],
        B: zeros(n, n),
        E: from_triplets(1, n, (0..n).map(|j| (0, j, 1.0))),
        f: vec![1.0],
        F: zeros(1, n),
    };

    Portfolio {
        problem,
        theta_bar,
        radius: DEFAULT_RADIUS,
    }
}
