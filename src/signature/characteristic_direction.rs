use crate::signature::{BackendInput, BackendKind, SignatureBackend, SignatureColumns};
use crate::testing::effect::normalize_direction;
use crate::testing::inference::MatrixStatTests;
use rayon::prelude::*;

const SHRINKAGE: f64 = 0.5;

/// Characteristic direction on log-normalized expression.
///
/// The mean-difference vector is scaled gene by gene with a diagonal pooled
/// covariance shrunk towards its average, then rescaled to unit length.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharacteristicDirection;

impl SignatureBackend for CharacteristicDirection {
    fn kind(&self) -> BackendKind {
        BackendKind::CharacteristicDirection
    }

    fn compute(&self, input: &BackendInput<'_>) -> anyhow::Result<SignatureColumns> {
        let summary = input.normalized.group_summary(input.n_control)?;
        if summary.degrees_of_freedom() < 1.0 {
            return Err(anyhow::anyhow!(
                "Characteristic direction needs at least three samples, got {}",
                summary.n_control + summary.n_case
            ));
        }

        let variances = summary.pooled_variance.to_vec();
        let mean_variance = if variances.is_empty() {
            0.0
        } else {
            variances.iter().sum::<f64>() / variances.len() as f64
        };

        let mut coefficients: Vec<f64> = (0..variances.len())
            .into_par_iter()
            .map(|gene| {
                let shrunk = (1.0 - SHRINKAGE) * variances[gene] + SHRINKAGE * mean_variance;
                let coefficient = (summary.mean_case[gene] - summary.mean_control[gene]) / shrunk;
                if shrunk > 0.0 && coefficient.is_finite() {
                    coefficient
                } else {
                    0.0
                }
            })
            .collect();

        normalize_direction(&mut coefficients);

        Ok(vec![("CD-coefficient", coefficients)])
    }
}
