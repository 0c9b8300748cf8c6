use crate::testing::{Alternative, TestResult};
use ndarray::{ArrayView2, s};
use num_traits::NumCast;
use rayon::iter::IntoParallelIterator;
use rayon::iter::ParallelIterator;
use single_utilities::traits::FloatOps;
use statrs::distribution::{ContinuousCDF, Normal};
use std::cmp::Ordering;

/// Rank-sum test for every gene (column) of a stacked block whose first
/// `n_control` rows are the control group and remaining rows the case group.
///
/// Results are in gene order regardless of how the work is scheduled.
pub fn rank_sum_matrix_groups(
    data: ArrayView2<f64>,
    n_control: usize,
    alternative: Alternative,
) -> anyhow::Result<Vec<TestResult<f64>>> {
    if n_control == 0 || n_control >= data.nrows() {
        return Err(anyhow::anyhow!("Group indices cannot be empty"));
    }

    let n_genes = data.ncols();
    let results: Vec<_> = (0..n_genes)
        .into_par_iter()
        .map(|gene| {
            let column = data.column(gene);
            let control = column.slice(s![..n_control]).to_vec();
            let case = column.slice(s![n_control..]).to_vec();
            rank_sum(&control, &case, alternative)
        })
        .collect();

    Ok(results)
}

/// Wilcoxon rank-sum z-score of `case` against `control`.
///
/// Positive scores mean the case group ranks higher. Ties receive average
/// ranks; no tie correction is applied to the variance.
pub fn rank_sum<T>(control: &[T], case: &[T], alternative: Alternative) -> TestResult<f64>
where
    T: FloatOps,
{
    let n_control = control.len();
    let n_case = case.len();

    if n_control == 0 || n_case == 0 {
        return TestResult::new(f64::NAN, 1.0);
    }

    // Combine samples and assign group labels (0 for control, 1 for case)
    let mut combined: Vec<(f64, usize)> = Vec::with_capacity(n_control + n_case);
    let as_f64 = |v: &T| -> f64 { NumCast::from(*v).unwrap_or(f64::NAN) };
    combined.extend(control.iter().map(|v| (as_f64(v), 0)));
    combined.extend(case.iter().map(|v| (as_f64(v), 1)));
    combined.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

    let mut rank_sum_case = 0.0;
    let mut i = 0;
    while i < combined.len() {
        let val = combined[i].0;
        let mut j = i + 1;
        while j < combined.len() && combined[j].0 == val {
            j += 1;
        }

        // average of ranks i+1 ..= j
        let rank = (i + j + 1) as f64 / 2.0;
        rank_sum_case += rank * combined[i..j].iter().filter(|(_, g)| *g == 1).count() as f64;
        i = j;
    }

    let n = (n_control + n_case) as f64;
    let expected = n_case as f64 * (n + 1.0) / 2.0;
    let variance = (n_control * n_case) as f64 * (n + 1.0) / 12.0;
    let std_dev = variance.sqrt();
    let z = (rank_sum_case - expected) / std_dev;

    let normal = Normal::standard();
    let p_value = match alternative {
        Alternative::TwoSided => (2.0 * normal.sf(z.abs())).min(1.0),
        Alternative::Greater => normal.sf(z),
        Alternative::Less => normal.cdf(z),
    };

    let u_case = rank_sum_case - (n_case * (n_case + 1)) as f64 / 2.0;
    TestResult::new(z, p_value)
        .with_effect_size(u_case / (n_control * n_case) as f64)
        .with_standard_error(std_dev)
}
