use crate::signature::{BackendInput, BackendKind, SignatureBackend, SignatureColumns};
use crate::testing::Alternative;
use crate::testing::correction::benjamini_hochberg_correction;
use crate::testing::inference::discrete::{chi_square_p_value, negative_binomial_ln_pmf};
use ndarray::{ArrayView1, Axis, s};
use rayon::prelude::*;

const MIN_DISPERSION: f64 = 1e-4;
const MAX_DISPERSION: f64 = 10.0;
/// Weight of the common dispersion, in prior degrees of freedom.
const PRIOR_DF: f64 = 10.0;
const PRIOR_COUNT: f64 = 0.125;

/// Negative-binomial likelihood-ratio test on raw counts, edgeR style.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeR;

impl SignatureBackend for EdgeR {
    fn kind(&self) -> BackendKind {
        BackendKind::EdgeR
    }

    fn compute(&self, input: &BackendInput<'_>) -> anyhow::Result<SignatureColumns> {
        let counts = input.counts;
        let n_control = input.n_control;
        let n_samples = counts.nrows();
        if n_control == 0 || n_control >= n_samples {
            return Err(anyhow::anyhow!("Group indices cannot be empty"));
        }
        let residual_df = n_samples as f64 - 2.0;
        if residual_df < 1.0 {
            return Err(anyhow::anyhow!(
                "No replicates to estimate a dispersion from ({} samples)",
                n_samples
            ));
        }

        let library_sizes = counts.sum_axis(Axis(1)).to_vec();
        if let Some(sample) = library_sizes.iter().position(|&size| size <= 0.0) {
            return Err(anyhow::anyhow!(
                "Sample at row {} has a library size of zero",
                sample
            ));
        }
        let mean_library = library_sizes.iter().sum::<f64>() / n_samples as f64;

        let moments: Vec<(f64, f64)> = (0..counts.ncols())
            .into_par_iter()
            .map(|gene| dispersion_moments(counts.column(gene), &library_sizes, mean_library, n_control))
            .collect();
        let (numerator, denominator) = moments
            .iter()
            .fold((0.0, 0.0), |(n, d), &(gn, gd)| (n + gn, d + gd));
        let common = if denominator > 0.0 {
            (numerator / denominator).clamp(MIN_DISPERSION, MAX_DISPERSION)
        } else {
            MIN_DISPERSION
        };

        let rows: Vec<GeneTest> = (0..counts.ncols())
            .into_par_iter()
            .map(|gene| {
                let (gn, gd) = moments[gene];
                let raw = if gd > 0.0 {
                    (gn / gd).clamp(0.0, MAX_DISPERSION)
                } else {
                    common
                };
                let tagwise = ((residual_df * raw + PRIOR_DF * common) / (residual_df + PRIOR_DF))
                    .clamp(MIN_DISPERSION, MAX_DISPERSION);
                test_gene(counts.column(gene), &library_sizes, n_control, tagwise)
            })
            .collect();

        let p_values: Vec<f64> = rows.iter().map(|r| r.p_value).collect();
        let fdr = if p_values.is_empty() {
            Vec::new()
        } else {
            benjamini_hochberg_correction(&p_values)?
        };

        Ok(vec![
            ("logFC", rows.iter().map(|r| r.log_fc).collect()),
            ("logCPM", rows.iter().map(|r| r.log_cpm).collect()),
            ("PValue", p_values),
            ("FDR", fdr),
        ])
    }
}

#[derive(Debug, Clone, Copy)]
struct GeneTest {
    log_fc: f64,
    log_cpm: f64,
    p_value: f64,
}

/// Numerator and denominator of the pooled moment dispersion of one gene,
/// computed on counts scaled to the mean library size.
fn dispersion_moments(
    counts: ArrayView1<'_, f64>,
    library_sizes: &[f64],
    mean_library: f64,
    n_control: usize,
) -> (f64, f64) {
    let scaled: Vec<f64> = counts
        .iter()
        .zip(library_sizes)
        .map(|(&c, &size)| c * mean_library / size)
        .collect();

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for group in [&scaled[..n_control], &scaled[n_control..]] {
        if group.len() < 2 {
            continue;
        }
        let n = group.len() as f64;
        let mean = group.iter().sum::<f64>() / n;
        let variance = group.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        numerator += (n - 1.0) * (variance - mean);
        denominator += (n - 1.0) * mean * mean;
    }
    (numerator, denominator)
}

fn test_gene(
    counts: ArrayView1<'_, f64>,
    library_sizes: &[f64],
    n_control: usize,
    dispersion: f64,
) -> GeneTest {
    let total: f64 = counts.sum();
    let total_library: f64 = library_sizes.iter().sum();
    let log_cpm = ((total + 0.5) / (total_library + 1.0) * 1e6).log2();
    if total <= 0.0 {
        return GeneTest {
            log_fc: 0.0,
            log_cpm,
            p_value: 1.0,
        };
    }

    let control = counts.slice(s![..n_control]);
    let case = counts.slice(s![n_control..]);
    let (lib_control, lib_case) = library_sizes.split_at(n_control);

    let null_rate = fit_rate(counts, library_sizes, dispersion);
    let control_rate = fit_rate(control, lib_control, dispersion);
    let case_rate = fit_rate(case, lib_case, dispersion);

    let null = log_likelihood(counts, library_sizes, null_rate, dispersion);
    let alternative = log_likelihood(control, lib_control, control_rate, dispersion)
        + log_likelihood(case, lib_case, case_rate, dispersion);
    let statistic = (2.0 * (alternative - null)).max(0.0);
    let p_value = if statistic.is_finite() {
        chi_square_p_value(statistic, 1.0, Alternative::Greater)
    } else {
        1.0
    };

    let prior_rate = |group: ArrayView1<'_, f64>, libs: &[f64]| {
        (group.sum() + PRIOR_COUNT * group.len() as f64) / libs.iter().sum::<f64>()
    };
    let log_fc = (prior_rate(case, lib_case) / prior_rate(control, lib_control)).log2();

    GeneTest {
        log_fc: if log_fc.is_finite() { log_fc } else { 0.0 },
        log_cpm,
        p_value,
    }
}

/// Maximum-likelihood rate (mean per unit library size) of a group with a
/// fixed dispersion, by Newton iteration on the log rate.
fn fit_rate(counts: ArrayView1<'_, f64>, library_sizes: &[f64], dispersion: f64) -> f64 {
    let total: f64 = counts.sum();
    if total <= 0.0 {
        return 0.0;
    }

    let mut log_rate = (total / library_sizes.iter().sum::<f64>()).ln();
    for _ in 0..50 {
        let rate = log_rate.exp();
        let mut score = 0.0;
        let mut information = 0.0;
        for (&y, &size) in counts.iter().zip(library_sizes) {
            let mu = size * rate;
            let denom = 1.0 + dispersion * mu;
            score += (y - mu) / denom;
            information += mu * (1.0 + dispersion * y) / (denom * denom);
        }
        if information <= 0.0 {
            break;
        }
        let step = score / information;
        log_rate += step;
        if step.abs() < 1e-10 {
            break;
        }
    }
    log_rate.exp()
}

fn log_likelihood(counts: ArrayView1<'_, f64>, library_sizes: &[f64], rate: f64, dispersion: f64) -> f64 {
    counts
        .iter()
        .zip(library_sizes)
        .map(|(&y, &size)| negative_binomial_ln_pmf(y, size * rate, dispersion))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, array};

    fn counts() -> Array2<f64> {
        array![
            [10.0, 100.0, 50.0, 0.0],
            [12.0, 95.0, 55.0, 0.0],
            [9.0, 105.0, 48.0, 0.0],
            [80.0, 20.0, 52.0, 0.0],
            [85.0, 18.0, 47.0, 0.0],
            [78.0, 25.0, 51.0, 0.0],
        ]
    }

    #[test]
    fn test_fit_rate_poisson_limit_is_pooled_mean() {
        let counts = array![4.0, 6.0];
        let rate = fit_rate(counts.view(), &[100.0, 100.0], 1e-8);
        assert_abs_diff_eq!(rate, 0.05, epsilon = 1e-8);
    }

    #[test]
    fn test_edger_columns_and_direction() {
        let counts = counts();
        let input = BackendInput {
            normalized: counts.view(),
            counts: counts.view(),
            n_control: 3,
        };
        let columns = EdgeR.compute(&input).unwrap();
        let names: Vec<&str> = columns.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["logFC", "logCPM", "PValue", "FDR"]);

        let log_fc = &columns[0].1;
        let p = &columns[2].1;
        assert!(log_fc[0] > 2.0);
        assert!(log_fc[1] < -2.0);
        assert!(p[0] < 1e-3 && p[1] < 1e-3);
        assert!(p[2] > p[0]);
        // all-zero gene is neutral
        assert_eq!(log_fc[3], 0.0);
        assert_eq!(p[3], 1.0);
        for (p, q) in p.iter().zip(&columns[3].1) {
            assert!(q >= p);
        }
    }

    #[test]
    fn test_edger_requires_replicates() {
        let counts = array![[1.0, 2.0], [3.0, 4.0]];
        let input = BackendInput {
            normalized: counts.view(),
            counts: counts.view(),
            n_control: 1,
        };
        assert!(EdgeR.compute(&input).is_err());
    }
}
