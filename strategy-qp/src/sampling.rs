//! Parameter sampling.

use rand::Rng;
use rand_distr::StandardNormal;

/// Draw `n` points uniformly from the Euclidean ball of `radius` around
/// `center`.
///
/// Directions are normalized Gaussian vectors; the distance from the center
/// is `radius * u^(1/d)` with `u` uniform in `[0, 1)`.
pub fn uniform_ball<R: Rng + ?Sized>(
    center: &[f64],
    radius: f64,
    n: usize,
    rng: &mut R,
) -> Vec<Vec<f64>> {
    let d = center.len();
    let mut out = Vec::with_capacity(n);

    for _ in 0..n {
        if d == 0 {
            out.push(Vec::new());
            continue;
        }

        let mut dir: Vec<f64>;
        let mut norm;
        loop {
            dir = (0..d).map(|_| rng.sample::<f64, _>(StandardNormal)).collect();
            norm = dir.iter().map(|v| v * v).sum::<f64>().sqrt();
            if norm > 1e-12 {
                break;
            }
        }

        let u: f64 = rng.gen();
        let r = radius * u.powf(1.0 / d as f64);
        out.push(
            center
                .iter()
                .zip(&dir)
                .map(|(c, v)| c + r * v / norm)
                .collect(),
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_points_inside_ball() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let center = vec![1.0, -2.0, 0.5];
        let pts = uniform_ball(&center, 0.3, 500, &mut rng);
        assert_eq!(pts.len(), 500);
        for p in &pts {
            let dist: f64 = p
                .iter()
                .zip(&center)
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f64>()
                .sqrt();
            assert!(dist <= 0.3 + 1e-12);
        }
    }

    #[test]
    fn test_mean_near_center() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let center = vec![3.0, 3.0];
        let pts = uniform_ball(&center, 1.0, 4000, &mut rng);
        for k in 0..2 {
            let mean = pts.iter().map(|p| p[k]).sum::<f64>() / pts.len() as f64;
            assert!((mean - 3.0).abs() < 0.05);
        }
    }

    #[test]
    fn test_deterministic_with_seed() {
        let a = uniform_ball(&[0.0; 4], 1.0, 10, &mut ChaCha8Rng::seed_from_u64(1));
        let b = uniform_ball(&[0.0; 4], 1.0, 10, &mut ChaCha8Rng::seed_from_u64(1));
        assert_eq!(a, b);
    }
}
