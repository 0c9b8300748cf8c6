//! Empirical Bayes moderation of per-gene residual variances.
//!
//! Gene-wise variances are treated as draws from a scaled inverse chi-square
//! prior whose degrees of freedom `d0` and scale `s0²` are estimated by
//! matching moments of `log(s²)`. Posterior variances shrink every gene
//! towards the prior scale, which stabilises t-statistics for the small
//! group sizes typical of per-cluster comparisons.

use statrs::function::gamma::digamma;

/// Prior estimated from the observed variances.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariancePrior {
    pub df: f64,
    pub scale: f64,
}

/// Moderated variances together with the prior they were shrunk towards.
#[derive(Debug, Clone)]
pub struct SqueezedVariances {
    pub prior: VariancePrior,
    pub posterior: Vec<f64>,
}

impl SqueezedVariances {
    /// Total degrees of freedom of a moderated t-statistic.
    pub fn total_df(&self, residual_df: f64) -> f64 {
        self.prior.df + residual_df
    }
}

/// Estimate the prior and compute posterior variances.
///
/// `variances` with residual degrees of freedom `df` (identical for every
/// gene). Zero variances are floored before taking logs so a gene that is
/// constant within groups does not drag the prior scale to zero.
pub fn squeeze_variances(variances: &[f64], df: f64) -> anyhow::Result<SqueezedVariances> {
    if df <= 0.0 {
        return Err(anyhow::anyhow!(
            "No residual degrees of freedom to estimate a variance prior"
        ));
    }
    let usable: Vec<f64> = variances.iter().copied().filter(|v| v.is_finite()).collect();
    if usable.is_empty() {
        return Err(anyhow::anyhow!("No finite variances to moderate"));
    }

    let floor = variance_floor(&usable);
    let half_df = df / 2.0;
    let offset = digamma(half_df) - half_df.ln();
    let logs: Vec<f64> = usable.iter().map(|&v| v.max(floor).ln() - offset).collect();

    let n = logs.len() as f64;
    let mean = logs.iter().sum::<f64>() / n;
    let excess_variance = if logs.len() > 1 {
        let sample_var = logs.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / (n - 1.0);
        sample_var - trigamma(half_df)
    } else {
        0.0
    };

    let prior = if excess_variance > 0.0 {
        let prior_df = 2.0 * trigamma_inverse(excess_variance);
        let half = prior_df / 2.0;
        VariancePrior {
            df: prior_df,
            scale: (mean + digamma(half) - half.ln()).exp(),
        }
    } else {
        VariancePrior {
            df: f64::INFINITY,
            scale: mean.exp(),
        }
    };

    let posterior = variances
        .iter()
        .map(|&v| {
            if !v.is_finite() {
                prior.scale
            } else if prior.df.is_infinite() {
                prior.scale
            } else {
                (prior.df * prior.scale + df * v) / (prior.df + df)
            }
        })
        .collect();

    Ok(SqueezedVariances { prior, posterior })
}

fn variance_floor(variances: &[f64]) -> f64 {
    let positive_min = variances
        .iter()
        .copied()
        .filter(|&v| v > 0.0)
        .fold(f64::INFINITY, f64::min);
    if positive_min.is_finite() {
        positive_min * 1e-4
    } else {
        1e-12
    }
}

/// Trigamma function via upward recurrence and the asymptotic series.
pub fn trigamma(x: f64) -> f64 {
    let mut x = x;
    let mut acc = 0.0;
    while x < 10.0 {
        acc += 1.0 / (x * x);
        x += 1.0;
    }
    let x2 = 1.0 / (x * x);
    acc + 1.0 / x
        + x2 / 2.0
        + x2 / x * (1.0 / 6.0 - x2 * (1.0 / 30.0 - x2 * (1.0 / 42.0 - x2 / 30.0)))
}

/// Tetragamma (second derivative of digamma).
fn tetragamma(x: f64) -> f64 {
    let mut x = x;
    let mut acc = 0.0;
    while x < 10.0 {
        acc -= 2.0 / (x * x * x);
        x += 1.0;
    }
    let x2 = 1.0 / (x * x);
    acc - x2
        - x2 / x
        - x2 * x2 * (0.5 - x2 * (1.0 / 6.0 - x2 * (1.0 / 6.0 - x2 * 3.0 / 10.0)))
}

/// Solve `trigamma(y) = x` for y by Newton iteration.
pub fn trigamma_inverse(x: f64) -> f64 {
    if x > 1e7 {
        return 1.0 / x.sqrt();
    }
    if x < 1e-6 {
        return 1.0 / x;
    }

    let mut y = 0.5 + 1.0 / x;
    for _ in 0..50 {
        let tri = trigamma(y);
        let dif = tri * (1.0 - tri / x) / tetragamma(y);
        y += dif;
        if -dif / y < 1e-8 {
            break;
        }
    }
    y
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_trigamma_known_values() {
        // trigamma(1) = pi^2 / 6
        assert_abs_diff_eq!(
            trigamma(1.0),
            std::f64::consts::PI.powi(2) / 6.0,
            epsilon = 1e-10
        );
        // trigamma(0.5) = pi^2 / 2
        assert_abs_diff_eq!(
            trigamma(0.5),
            std::f64::consts::PI.powi(2) / 2.0,
            epsilon = 1e-10
        );
    }

    #[test]
    fn test_polygamma_accuracy_across_recurrence_range() {
        // trigamma(n) = pi^2 / 6 - sum_{k < n} 1 / k^2
        let mut expected = std::f64::consts::PI.powi(2) / 6.0;
        for n in 1..12 {
            assert_abs_diff_eq!(trigamma(n as f64), expected, epsilon = 1e-10);
            expected -= 1.0 / (n * n) as f64;
        }
        // tetragamma(1) = -2 zeta(3)
        assert_abs_diff_eq!(tetragamma(1.0), -2.404_113_806_319_188_5, epsilon = 1e-10);
        assert_abs_diff_eq!(tetragamma(2.0), -2.404_113_806_319_188_5 + 2.0, epsilon = 1e-10);
    }

    #[test]
    fn test_trigamma_inverse_round_trip() {
        for &y in &[0.3, 1.0, 2.5, 10.0, 75.0] {
            let x = trigamma(y);
            assert_abs_diff_eq!(trigamma_inverse(x), y, epsilon = 1e-6 * y.max(1.0));
        }
    }

    #[test]
    fn test_squeeze_shrinks_towards_prior() {
        let variances = vec![0.5, 1.0, 1.5, 2.0, 8.0, 0.1, 0.9, 1.1];
        let squeezed = squeeze_variances(&variances, 4.0).unwrap();
        assert!(squeezed.prior.scale > 0.0);
        let max_raw = variances.iter().cloned().fold(f64::MIN, f64::max);
        let min_raw = variances.iter().cloned().fold(f64::MAX, f64::min);
        for &p in &squeezed.posterior {
            assert!(p <= max_raw + 1e-12);
            assert!(p >= min_raw.min(squeezed.prior.scale) - 1e-12);
        }
    }

    #[test]
    fn test_squeeze_requires_degrees_of_freedom() {
        assert!(squeeze_variances(&[1.0, 2.0], 0.0).is_err());
    }
}
