use crate::data::SampleMatrix;
use crate::error::{PipelineError, Result};
use crate::partition::{ComparisonGroup, ComparisonId};
use crate::signature::{BackendInput, BackendKind, Signature};
use tracing::info;

/// Signatures of every comparison in partitioner order.
#[derive(Debug, Clone, Default)]
pub struct SignatureStore {
    signatures: Vec<Signature>,
}

impl SignatureStore {
    /// Run `backend` over each group in turn.
    ///
    /// The first failing comparison aborts the build.
    pub fn build(matrix: &SampleMatrix, groups: &[ComparisonGroup], backend: BackendKind) -> Result<Self> {
        let implementation = backend.backend();
        let mut signatures = Vec::with_capacity(groups.len());

        for group in groups {
            let label = group.label();
            info!("Analyzing.. {} using {}", label, backend);

            let computation_error = |source: anyhow::Error| PipelineError::Computation {
                backend: backend.name(),
                comparison: label.clone(),
                source,
            };

            let (normalized, counts) = matrix.stacked_rows(&group.control, &group.case);
            let input = BackendInput {
                normalized: normalized.view(),
                counts: counts.view(),
                n_control: group.control.len(),
            };
            let columns = implementation.compute(&input).map_err(computation_error)?;
            let signature = Signature::from_columns(group.id.clone(), backend, matrix.genes(), columns)
                .map_err(computation_error)?;
            signatures.push(signature);
        }

        Ok(SignatureStore { signatures })
    }

    pub fn get(&self, id: &ComparisonId) -> Option<&Signature> {
        self.signatures.iter().find(|s| s.comparison() == id)
    }

    pub fn get_by_label(&self, label: &str) -> Option<&Signature> {
        self.signatures.iter().find(|s| s.label() == label)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Signature> {
        self.signatures.iter()
    }

    pub fn labels(&self) -> Vec<String> {
        self.signatures.iter().map(Signature::label).collect()
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

impl<'a> IntoIterator for &'a SignatureStore {
    type Item = &'a Signature;
    type IntoIter = std::slice::Iter<'a, Signature>;

    fn into_iter(self) -> Self::IntoIter {
        self.signatures.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::{GroupingMode, LabelPartitioner};
    use ndarray::Array2;

    fn matrix() -> SampleMatrix {
        let samples: Vec<String> = (0..6).map(|i| format!("S{}", i)).collect();
        let genes: Vec<String> = (0..3).map(|i| format!("G{}", i)).collect();
        let normalized = Array2::from_shape_fn((6, 3), |(s, g)| {
            if s < 3 { (g as f64 + 1.0) * 0.1 + s as f64 * 0.01 } else { (3 - g) as f64 + s as f64 * 0.01 }
        });
        let counts = normalized.mapv(|v| (v * 10.0).round() + 1.0);
        SampleMatrix::new(samples, genes, normalized, counts).unwrap()
    }

    #[test]
    fn test_build_keeps_partitioner_order() {
        let labels: Vec<Option<String>> = ["A", "A", "A", "B", "B", "B"]
            .iter()
            .map(|s| Some(s.to_string()))
            .collect();
        let classes = vec!["A".to_string(), "B".to_string()];
        let samples: Vec<usize> = (0..6).collect();
        let groups = LabelPartitioner::new(GroupingMode::Pairwise).partition(&labels, &classes, &samples);

        let store = SignatureStore::build(&matrix(), &groups, BackendKind::RankSum).unwrap();
        assert_eq!(store.labels(), vec!["A vs. B", "B vs. A"]);
        assert!(store.get_by_label("B vs. A").is_some());
        assert!(store.get(&ComparisonId::pairwise("A", "B")).is_some());
        for signature in &store {
            assert_eq!(signature.len(), 3);
        }
    }

    #[test]
    fn test_failure_names_backend_and_comparison() {
        let groups = vec![ComparisonGroup {
            id: ComparisonId::pairwise("A", "B"),
            control: vec![0],
            case: vec![1],
        }];
        let err = SignatureStore::build(&matrix(), &groups, BackendKind::EdgeR).unwrap_err();
        match err {
            PipelineError::Computation { backend, comparison, .. } => {
                assert_eq!(backend, "edgeR");
                assert_eq!(comparison, "A vs. B");
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
