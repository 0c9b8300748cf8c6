use crate::error::{PipelineError, Result};
use nalgebra_sparse::CsrMatrix;
use ndarray::{Array2, Axis};
use std::collections::HashSet;

/// Samples × genes expression data with its companion raw-count matrix.
///
/// Both matrices share the same sample and gene axes. Normalized values feed
/// the rank-sum and characteristic-direction backends, raw counts feed the
/// count-based ones.
#[derive(Debug, Clone)]
pub struct SampleMatrix {
    sample_ids: Vec<String>,
    genes: Vec<String>,
    normalized: Array2<f64>,
    counts: Array2<f64>,
}

impl SampleMatrix {
    pub fn new(
        sample_ids: Vec<String>,
        genes: Vec<String>,
        normalized: Array2<f64>,
        counts: Array2<f64>,
    ) -> Result<Self> {
        let expected = (sample_ids.len(), genes.len());
        if normalized.dim() != expected {
            return Err(PipelineError::Input(format!(
                "Normalized matrix has shape {:?}, expected {:?} (samples × genes)",
                normalized.dim(),
                expected
            )));
        }
        if counts.dim() != expected {
            return Err(PipelineError::Input(format!(
                "Raw count matrix has shape {:?}, expected {:?} (samples × genes)",
                counts.dim(),
                expected
            )));
        }
        ensure_unique(&sample_ids, "sample id")?;
        ensure_unique(&genes, "gene symbol")?;

        Ok(SampleMatrix {
            sample_ids,
            genes,
            normalized,
            counts,
        })
    }

    /// Build from sparse (market-matrix style) inputs, densifying both.
    pub fn from_sparse(
        sample_ids: Vec<String>,
        genes: Vec<String>,
        normalized: &CsrMatrix<f64>,
        counts: &CsrMatrix<f64>,
    ) -> Result<Self> {
        Self::new(sample_ids, genes, densify(normalized), densify(counts))
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn n_genes(&self) -> usize {
        self.genes.len()
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn genes(&self) -> &[String] {
        &self.genes
    }

    pub fn normalized(&self) -> &Array2<f64> {
        &self.normalized
    }

    pub fn counts(&self) -> &Array2<f64> {
        &self.counts
    }

    /// Rows of both matrices for `control` followed by `case`.
    pub(crate) fn stacked_rows(
        &self,
        control: &[usize],
        case: &[usize],
    ) -> (Array2<f64>, Array2<f64>) {
        let rows: Vec<usize> = control.iter().chain(case.iter()).copied().collect();
        (
            self.normalized.select(Axis(0), &rows),
            self.counts.select(Axis(0), &rows),
        )
    }
}

fn densify(matrix: &CsrMatrix<f64>) -> Array2<f64> {
    let mut dense = Array2::zeros((matrix.nrows(), matrix.ncols()));
    for (row, col, value) in matrix.triplet_iter() {
        dense[[row, col]] = *value;
    }
    dense
}

fn ensure_unique(values: &[String], what: &str) -> Result<()> {
    let mut seen = HashSet::with_capacity(values.len());
    for value in values {
        if !seen.insert(value.as_str()) {
            return Err(PipelineError::Input(format!("Duplicate {}: '{}'", what, value)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra_sparse::CooMatrix;
    use ndarray::array;

    fn ids(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{}{}", prefix, i)).collect()
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let normalized = Array2::zeros((2, 3));
        let counts = Array2::zeros((2, 2));
        let result = SampleMatrix::new(ids("S", 2), ids("G", 3), normalized, counts);
        assert!(matches!(result, Err(PipelineError::Input(_))));
    }

    #[test]
    fn test_duplicate_sample_ids_are_rejected() {
        let samples = vec!["S0".to_string(), "S0".to_string()];
        let result = SampleMatrix::new(samples, ids("G", 1), Array2::zeros((2, 1)), Array2::zeros((2, 1)));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Duplicate sample id"));
    }

    #[test]
    fn test_from_sparse_densifies() {
        let coo = CooMatrix::try_from_triplets(2, 3, vec![0, 1], vec![2, 0], vec![4.0, 7.0]).unwrap();
        let csr = CsrMatrix::from(&coo);
        let matrix = SampleMatrix::from_sparse(ids("S", 2), ids("G", 3), &csr, &csr).unwrap();
        assert_eq!(matrix.counts(), &array![[0.0, 0.0, 4.0], [7.0, 0.0, 0.0]]);
    }

    #[test]
    fn test_stacked_rows_put_control_first() {
        let normalized = array![[1.0], [2.0], [3.0]];
        let matrix = SampleMatrix::new(ids("S", 3), ids("G", 1), normalized.clone(), normalized).unwrap();
        let (expr, _) = matrix.stacked_rows(&[2], &[0, 1]);
        assert_eq!(expr, array![[3.0], [1.0], [2.0]]);
    }
}
