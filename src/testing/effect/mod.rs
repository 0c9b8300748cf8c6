use single_utilities::traits::FloatOps;

/// Log2 fold change between group means of log1p-normalized data.
///
/// Means are mapped back with `expm1` before the ratio is taken, so the fold
/// change refers to the normalized (not log) scale. `case` is the group of
/// interest, `control` the reference.
pub fn log2_fold_change_expm1<T>(mean_control: T, mean_case: T) -> f64
where
    T: FloatOps,
{
    const EPS: f64 = 1e-9;
    let control = mean_control.to_f64().unwrap_or(0.0).exp_m1();
    let case = mean_case.to_f64().unwrap_or(0.0).exp_m1();
    ((case + EPS) / (control + EPS)).log2()
}

/// Log2 ratio of two rates with a pseudo count added to both.
pub fn log2_ratio(numerator: f64, denominator: f64, pseudo_count: f64) -> f64 {
    ((numerator + pseudo_count) / (denominator + pseudo_count)).log2()
}

/// Unit-length rescaling of a direction vector; the zero vector stays zero.
pub fn normalize_direction(values: &mut [f64]) {
    let norm = values.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 && norm.is_finite() {
        for v in values.iter_mut() {
            *v /= norm;
        }
    }
}
