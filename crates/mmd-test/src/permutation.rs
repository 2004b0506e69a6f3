//! Permutation-based null distribution helpers

use mmd_core::{Error, Result};
use ordered_float::OrderedFloat;
use rand::seq::SliceRandom;
use rand::Rng;

/// A uniformly random permutation of `0..n`
pub fn random_permutation<R: Rng + ?Sized>(rng: &mut R, n: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    indices
}

fn sorted(null_samples: &[f64]) -> Result<Vec<f64>> {
    if null_samples.is_empty() {
        return Err(Error::Precondition("no null samples drawn".to_string()));
    }
    if null_samples.iter().any(|v| !v.is_finite()) {
        return Err(Error::non_finite("null samples"));
    }
    let mut sorted = null_samples.to_vec();
    sorted.sort_unstable_by_key(|&v| OrderedFloat(v));
    Ok(sorted)
}

/// Fraction of null samples at least as large as `statistic`
pub fn permutation_p_value(statistic: f64, null_samples: &[f64]) -> Result<f64> {
    let sorted = sorted(null_samples)?;
    let below = sorted.partition_point(|&v| v < statistic);
    Ok(1.0 - below as f64 / sorted.len() as f64)
}

/// The `1 - alpha` empirical quantile of the null samples
pub fn permutation_threshold(null_samples: &[f64], alpha: f64) -> Result<f64> {
    check_alpha(alpha)?;
    let sorted = sorted(null_samples)?;
    let index = ((sorted.len() as f64 * (1.0 - alpha)).floor() as usize).min(sorted.len() - 1);
    Ok(sorted[index])
}

/// Significance levels must lie strictly between 0 and 1
pub fn check_alpha(alpha: f64) -> Result<()> {
    if alpha > 0.0 && alpha < 1.0 {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "significance level must be in (0, 1), got {alpha}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_random_permutation_is_permutation() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut p = random_permutation(&mut rng, 50);
        p.sort_unstable();
        assert_eq!(p, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_p_value() {
        let null = [0.4, 0.1, 0.3, 0.2, 0.5];
        assert_relative_eq!(permutation_p_value(0.35, &null).unwrap(), 0.4);
        assert_relative_eq!(permutation_p_value(0.3, &null).unwrap(), 0.6);
        assert_relative_eq!(permutation_p_value(1.0, &null).unwrap(), 0.0);
        assert_relative_eq!(permutation_p_value(-1.0, &null).unwrap(), 1.0);
        assert!(permutation_p_value(0.0, &[]).is_err());
        assert!(permutation_p_value(0.0, &[f64::NAN]).is_err());
    }

    #[test]
    fn test_threshold() {
        let null: Vec<f64> = (0..100).map(|i| i as f64).collect();
        assert_relative_eq!(permutation_threshold(&null, 0.05).unwrap(), 95.0);
        assert_relative_eq!(permutation_threshold(&null, 0.5).unwrap(), 50.0);
        assert_relative_eq!(permutation_threshold(&[2.0], 0.01).unwrap(), 2.0);
        assert!(permutation_threshold(&null, 0.0).is_err());
        assert!(permutation_threshold(&null, 1.0).is_err());
    }
}
