use crate::signature::{BackendInput, BackendKind, SignatureBackend, SignatureColumns};
use crate::testing::correction::benjamini_hochberg_defined;
use crate::testing::inference::parametric::normal_two_sided_p_value;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use std::f64::consts::LN_2;

const MIN_DISPERSION: f64 = 1e-8;

/// DESeq2 style Wald test on raw counts.
///
/// Size factors come from the median-of-ratios method. Per-gene moment
/// dispersions are shrunk halfway (in log space) towards their median and a
/// Wald test is run on the log2 ratio of the normalized group means.
#[derive(Debug, Clone, Copy, Default)]
pub struct DESeq2;

impl SignatureBackend for DESeq2 {
    fn kind(&self) -> BackendKind {
        BackendKind::DESeq2
    }

    fn compute(&self, input: &BackendInput<'_>) -> anyhow::Result<SignatureColumns> {
        let counts = input.counts;
        let n_control = input.n_control;
        let n_samples = counts.nrows();
        if n_control == 0 || n_control >= n_samples {
            return Err(anyhow::anyhow!("Group indices cannot be empty"));
        }
        if n_samples < 3 {
            return Err(anyhow::anyhow!(
                "No residual degrees of freedom for dispersion estimation ({} samples)",
                n_samples
            ));
        }

        let size_factors = median_of_ratios(counts)?;
        let mut normalized: Array2<f64> = counts.to_owned();
        for (mut row, &factor) in normalized.axis_iter_mut(Axis(0)).zip(size_factors.iter()) {
            row.mapv_inplace(|c| c / factor);
        }
        let mean_inverse_factor =
            size_factors.iter().map(|s| 1.0 / s).sum::<f64>() / n_samples as f64;

        let moments: Vec<(f64, f64)> = (0..normalized.ncols())
            .into_par_iter()
            .map(|gene| {
                let column = normalized.column(gene);
                let base_mean = column.mean().unwrap_or(0.0);
                let dispersion = moment_dispersion(column, n_control, base_mean, mean_inverse_factor);
                (base_mean, dispersion)
            })
            .collect();

        let mut log_dispersions: Vec<f64> = moments
            .iter()
            .filter(|(base_mean, _)| *base_mean > 0.0)
            .map(|(_, d)| d.ln())
            .collect();
        let median_log_dispersion = median(&mut log_dispersions).unwrap_or(MIN_DISPERSION.ln());

        let (control_factors, case_factors) = size_factors.split_at(n_control);
        let rows: Vec<WaldRow> = (0..normalized.ncols())
            .into_par_iter()
            .map(|gene| {
                let (base_mean, raw_dispersion) = moments[gene];
                if base_mean <= 0.0 {
                    return WaldRow::undefined(base_mean);
                }
                let dispersion = ((raw_dispersion.ln() + median_log_dispersion) / 2.0).exp();
                let column = normalized.column(gene);
                let control: Vec<f64> = column.iter().take(n_control).copied().collect();
                let case: Vec<f64> = column.iter().skip(n_control).copied().collect();
                wald_test(base_mean, &control, control_factors, &case, case_factors, dispersion)
            })
            .collect();

        let p_values: Vec<Option<f64>> = rows.iter().map(|r| r.p_value).collect();
        let adjusted = benjamini_hochberg_defined(&p_values)?;

        Ok(vec![
            ("baseMean", rows.iter().map(|r| r.base_mean).collect()),
            ("log2FoldChange", rows.iter().map(|r| r.log2_fold_change).collect()),
            ("lfcSE", rows.iter().map(|r| r.lfc_se).collect()),
            ("stat", rows.iter().map(|r| r.stat).collect()),
            ("pvalue", p_values.iter().map(|p| p.unwrap_or(1.0)).collect()),
            ("padj", adjusted.iter().map(|q| q.unwrap_or(1.0)).collect()),
        ])
    }
}

#[derive(Debug, Clone, Copy)]
struct WaldRow {
    base_mean: f64,
    log2_fold_change: f64,
    lfc_se: f64,
    stat: f64,
    p_value: Option<f64>,
}

impl WaldRow {
    fn undefined(base_mean: f64) -> Self {
        WaldRow {
            base_mean,
            log2_fold_change: 0.0,
            lfc_se: 0.0,
            stat: 0.0,
            p_value: None,
        }
    }
}

/// Median-of-ratios size factors over genes observed in every sample.
pub(crate) fn median_of_ratios(counts: ArrayView2<'_, f64>) -> anyhow::Result<Vec<f64>> {
    let log_geo_means: Vec<Option<f64>> = counts
        .axis_iter(Axis(1))
        .map(|gene| {
            if gene.iter().all(|&c| c > 0.0) {
                Some(gene.iter().map(|c| c.ln()).sum::<f64>() / gene.len() as f64)
            } else {
                None
            }
        })
        .collect();
    if log_geo_means.iter().all(Option::is_none) {
        return Err(anyhow::anyhow!(
            "Every gene contains a zero count; size factors cannot be estimated"
        ));
    }

    counts
        .axis_iter(Axis(0))
        .enumerate()
        .map(|(sample, row)| {
            let mut ratios: Vec<f64> = row
                .iter()
                .zip(&log_geo_means)
                .filter_map(|(&c, geo)| geo.map(|g| c.ln() - g))
                .collect();
            median(&mut ratios)
                .map(f64::exp)
                .ok_or_else(|| anyhow::anyhow!("No usable genes for the size factor of sample {}", sample))
        })
        .collect()
}

/// Within-group moment estimate `(v - m * mean(1/s)) / m^2`, floored.
fn moment_dispersion(
    normalized: ArrayView1<'_, f64>,
    n_control: usize,
    base_mean: f64,
    mean_inverse_factor: f64,
) -> f64 {
    if base_mean <= 0.0 {
        return MIN_DISPERSION;
    }

    let n = normalized.len();
    let mut sum_squares = 0.0;
    for (start, end) in [(0, n_control), (n_control, n)] {
        let group: Vec<f64> = normalized.iter().skip(start).take(end - start).copied().collect();
        let mean = group.iter().sum::<f64>() / group.len() as f64;
        sum_squares += group.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
    }
    let variance = sum_squares / (n as f64 - 2.0);

    let dispersion = (variance - base_mean * mean_inverse_factor) / (base_mean * base_mean);
    if dispersion.is_finite() {
        dispersion.max(MIN_DISPERSION)
    } else {
        MIN_DISPERSION
    }
}

fn wald_test(
    base_mean: f64,
    control: &[f64],
    control_factors: &[f64],
    case: &[f64],
    case_factors: &[f64],
    dispersion: f64,
) -> WaldRow {
    let (mean_control, var_control) = log_mean_and_variance(control, control_factors, dispersion);
    let (mean_case, var_case) = log_mean_and_variance(case, case_factors, dispersion);

    let log2_fold_change = (mean_case / mean_control).log2();
    let lfc_se = (var_control + var_case).sqrt() / LN_2;
    let stat = log2_fold_change / lfc_se;

    if !(log2_fold_change.is_finite() && stat.is_finite()) {
        return WaldRow::undefined(base_mean);
    }

    WaldRow {
        base_mean,
        log2_fold_change,
        lfc_se,
        stat,
        p_value: Some(normal_two_sided_p_value(stat)),
    }
}

/// Group mean of normalized counts, floored at half a count, and the
/// delta-method variance of its natural log under the negative binomial.
fn log_mean_and_variance(normalized: &[f64], size_factors: &[f64], dispersion: f64) -> (f64, f64) {
    let factor_sum: f64 = size_factors.iter().sum();
    let factor_sq_sum: f64 = size_factors.iter().map(|s| s * s).sum();
    let raw_mean = normalized.iter().sum::<f64>() / normalized.len() as f64;
    let mean = raw_mean.max(0.5 / factor_sum);

    let variance = (factor_sum * mean + dispersion * mean * mean * factor_sq_sum)
        / (factor_sum * factor_sum * mean * mean);
    (mean, variance)
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}
