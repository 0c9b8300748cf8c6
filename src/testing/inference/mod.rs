use crate::testing::utils::GroupSummary;
use crate::testing::{Alternative, TestResult};
use ndarray::{Array2, ArrayView2};

pub mod discrete;

pub mod ebayes;

pub mod parametric;

pub mod nonparametric;

/// Per-gene two-group tests over a stacked samples × genes block whose first
/// `n_control` rows form the control group.
pub trait MatrixStatTests {
    fn rank_sum_test(
        &self,
        n_control: usize,
        alternative: Alternative,
    ) -> anyhow::Result<Vec<TestResult<f64>>>;

    /// Empirical-Bayes moderated t-test of case minus control means.
    /// The effect size of every result is the mean difference.
    fn moderated_t_test(&self, n_control: usize) -> anyhow::Result<Vec<TestResult<f64>>>;

    fn group_summary(&self, n_control: usize) -> anyhow::Result<GroupSummary>;
}

impl MatrixStatTests for ArrayView2<'_, f64> {
    fn rank_sum_test(
        &self,
        n_control: usize,
        alternative: Alternative,
    ) -> anyhow::Result<Vec<TestResult<f64>>> {
        nonparametric::rank_sum_matrix_groups(self.view(), n_control, alternative)
    }

    fn moderated_t_test(&self, n_control: usize) -> anyhow::Result<Vec<TestResult<f64>>> {
        let summary = self.group_summary(n_control)?;
        let residual_df = summary.degrees_of_freedom();
        let raw_variances = summary.pooled_variance.to_vec();
        let squeezed = ebayes::squeeze_variances(&raw_variances, residual_df)?;
        let total_df = squeezed.total_df(residual_df);
        let design_factor = 1.0 / summary.n_control as f64 + 1.0 / summary.n_case as f64;

        let results = summary
            .mean_case
            .iter()
            .zip(summary.mean_control.iter())
            .zip(squeezed.posterior.iter())
            .map(|((&case, &control), &variance)| {
                let difference = case - control;
                let standard_error = (variance * design_factor).sqrt();
                let t = difference / standard_error;
                let p_value = parametric::t_test_p_value(t, total_df);
                TestResult::new(t, p_value)
                    .with_effect_size(difference)
                    .with_standard_error(standard_error)
            })
            .collect();

        Ok(results)
    }

    fn group_summary(&self, n_control: usize) -> anyhow::Result<GroupSummary> {
        GroupSummary::from_stacked(self.view(), n_control)
    }
}

impl MatrixStatTests for Array2<f64> {
    fn rank_sum_test(
        &self,
        n_control: usize,
        alternative: Alternative,
    ) -> anyhow::Result<Vec<TestResult<f64>>> {
        self.view().rank_sum_test(n_control, alternative)
    }

    fn moderated_t_test(&self, n_control: usize) -> anyhow::Result<Vec<TestResult<f64>>> {
        self.view().moderated_t_test(n_control)
    }

    fn group_summary(&self, n_control: usize) -> anyhow::Result<GroupSummary> {
        self.view().group_summary(n_control)
    }
}
