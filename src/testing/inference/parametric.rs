//! Parametric p-values for per-gene test statistics.
//!
//! The count-based backends produce t, Wald and likelihood-ratio statistics
//! gene by gene; these helpers turn them into p-values with the fast paths
//! that matter when thousands of genes are tested.

use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

/// Two-sided p-value of a t-statistic with `df` degrees of freedom.
///
/// Infinite `df` (a fully moderated variance) falls back to the normal
/// distribution, as do large degrees of freedom.
pub fn t_test_p_value(t_stat: f64, df: f64) -> f64 {
    if t_stat.is_nan() || df.is_nan() || df <= 0.0 {
        return 1.0;
    }
    if t_stat.is_infinite() {
        return 0.0;
    }

    let abs_t = t_stat.abs();
    if abs_t < 1e-12 {
        return 1.0;
    }

    if df > 1e6 || df.is_infinite() {
        return normal_two_sided_p_value(abs_t);
    }

    match StudentsT::new(0.0, 1.0, df) {
        Ok(t_dist) => (2.0 * t_dist.sf(abs_t)).min(1.0),
        Err(_) => 1.0,
    }
}

/// Two-sided p-value of a standard normal (Wald) statistic.
pub fn normal_two_sided_p_value(z: f64) -> f64 {
    if z.is_nan() {
        return 1.0;
    }
    (2.0 * Normal::standard().sf(z.abs())).min(1.0)
}
