use crate::signature::{BackendInput, BackendKind, SignatureBackend, SignatureColumns};
use crate::testing::correction::benjamini_hochberg_correction;
use crate::testing::inference::MatrixStatTests;
use crate::testing::utils::mean_rows;
use ndarray::{Array2, ArrayView2, Axis};

/// Two-group limma-voom style analysis of raw counts.
///
/// Counts are transformed to log2-CPM, a per-gene linear model on the group
/// indicator is fitted and its residual variances are moderated with an
/// empirical Bayes prior before computing t-statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct LimmaVoom;

impl SignatureBackend for LimmaVoom {
    fn kind(&self) -> BackendKind {
        BackendKind::LimmaVoom
    }

    fn compute(&self, input: &BackendInput<'_>) -> anyhow::Result<SignatureColumns> {
        let log_cpm = log_cpm(input.counts)?;
        let tests = log_cpm.moderated_t_test(input.n_control)?;
        let ave_expr = mean_rows(log_cpm.view()).to_vec();

        let mut log_fc = Vec::with_capacity(tests.len());
        let mut t = Vec::with_capacity(tests.len());
        let mut p_values = Vec::with_capacity(tests.len());
        for result in tests {
            let difference = result.effect_size.unwrap_or(0.0);
            let result = result.finite_or_neutral();
            log_fc.push(if difference.is_finite() { difference } else { 0.0 });
            t.push(result.statistic);
            p_values.push(result.p_value);
        }

        let adjusted = if p_values.is_empty() {
            Vec::new()
        } else {
            benjamini_hochberg_correction(&p_values)?
        };

        Ok(vec![
            ("logFC", log_fc),
            ("AveExpr", ave_expr),
            ("t", t),
            ("P.Value", p_values),
            ("adj.P.Val", adjusted),
        ])
    }
}

/// log2 counts per million with a 0.5 prior count and library size + 1.
pub(crate) fn log_cpm(counts: ArrayView2<'_, f64>) -> anyhow::Result<Array2<f64>> {
    let library_sizes = counts.sum_axis(Axis(1));
    if let Some(sample) = library_sizes.iter().position(|&size| size <= 0.0) {
        return Err(anyhow::anyhow!(
            "Sample at row {} has a library size of zero",
            sample
        ));
    }

    let mut transformed = counts.to_owned();
    for (mut row, &size) in transformed.axis_iter_mut(Axis(0)).zip(library_sizes.iter()) {
        row.mapv_inplace(|c| ((c + 0.5) / (size + 1.0) * 1e6).log2());
    }
    Ok(transformed)
}
