use ndarray::{Array1, ArrayView2, Axis, s};

/// Per-gene summaries of a control/case split of a stacked samples × genes
/// block, where the first `n_control` rows are the control group.
#[derive(Debug, Clone)]
pub struct GroupSummary {
    pub n_control: usize,
    pub n_case: usize,
    pub mean_control: Array1<f64>,
    pub mean_case: Array1<f64>,
    /// Pooled within-group variance with `n_control + n_case - 2` degrees of freedom.
    pub pooled_variance: Array1<f64>,
}

impl GroupSummary {
    pub fn from_stacked(data: ArrayView2<f64>, n_control: usize) -> anyhow::Result<Self> {
        let n_total = data.nrows();
        if n_control == 0 || n_control >= n_total {
            return Err(anyhow::anyhow!("Group indices cannot be empty"));
        }
        let n_case = n_total - n_control;

        let control = data.slice(s![..n_control, ..]);
        let case = data.slice(s![n_control.., ..]);
        let mean_control = mean_rows(control);
        let mean_case = mean_rows(case);

        let df = n_total as f64 - 2.0;
        let ss_control = sum_squared_deviations(control, &mean_control);
        let ss_case = sum_squared_deviations(case, &mean_case);
        let pooled_variance = if df > 0.0 {
            (ss_control + ss_case) / df
        } else {
            Array1::from_elem(data.ncols(), f64::NAN)
        };

        Ok(GroupSummary {
            n_control,
            n_case,
            mean_control,
            mean_case,
            pooled_variance,
        })
    }

    pub fn degrees_of_freedom(&self) -> f64 {
        (self.n_control + self.n_case) as f64 - 2.0
    }
}

pub fn mean_rows(block: ArrayView2<f64>) -> Array1<f64> {
    block
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(block.ncols()))
}

fn sum_squared_deviations(block: ArrayView2<f64>, means: &Array1<f64>) -> Array1<f64> {
    let mut ss = Array1::<f64>::zeros(block.ncols());
    for row in block.rows() {
        for ((acc, &value), &mean) in ss.iter_mut().zip(row.iter()).zip(means.iter()) {
            *acc += (value - mean) * (value - mean);
        }
    }
    ss
}
