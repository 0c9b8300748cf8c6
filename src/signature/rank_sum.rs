use crate::signature::{BackendInput, BackendKind, SignatureBackend, SignatureColumns};
use crate::testing::Alternative;
use crate::testing::correction::benjamini_hochberg_correction;
use crate::testing::effect::log2_fold_change_expm1;
use crate::testing::inference::MatrixStatTests;

/// Wilcoxon rank-sum scores on log-normalized expression.
///
/// Scores are z-statistics of the case group against the control group; fold
/// changes compare `expm1` of the group means.
#[derive(Debug, Clone, Copy, Default)]
pub struct RankSum;

impl SignatureBackend for RankSum {
    fn kind(&self) -> BackendKind {
        BackendKind::RankSum
    }

    fn compute(&self, input: &BackendInput<'_>) -> anyhow::Result<SignatureColumns> {
        let data = input.normalized;
        let tests = data.rank_sum_test(input.n_control, Alternative::TwoSided)?;
        let summary = data.group_summary(input.n_control)?;

        let (scores, pvals): (Vec<f64>, Vec<f64>) = tests
            .into_iter()
            .map(|t| {
                let t = t.finite_or_neutral();
                (t.statistic, t.p_value)
            })
            .unzip();

        let logfoldchanges = summary
            .mean_control
            .iter()
            .zip(summary.mean_case.iter())
            .map(|(&control, &case)| log2_fold_change_expm1(control, case))
            .collect();

        let pvals_adj = if pvals.is_empty() {
            Vec::new()
        } else {
            benjamini_hochberg_correction(&pvals)?
        };

        Ok(vec![
            ("scores", scores),
            ("logfoldchanges", logfoldchanges),
            ("pvals", pvals),
            ("pvals_adj", pvals_adj),
        ])
    }
}
