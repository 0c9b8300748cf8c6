use crate::data::SampleMatrix;
use crate::error::{PipelineError, Result};
use std::cmp::Ordering;
use std::collections::HashSet;

/// How distinct class labels of a column are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassOrder {
    /// Order of first appearance in the sample axis.
    Appearance,
    /// Lexical order.
    Sorted,
    /// By the integer suffix of labels such as `"Cluster 3"`; labels
    /// without a numeric suffix sort lexically after the numbered ones.
    ClusterNumber,
}

/// Per-sample categorical attributes, keyed by the same sample ids as the
/// expression matrix. Annotation columns are written in place.
#[derive(Debug, Clone)]
pub struct SampleMetadata {
    sample_ids: Vec<String>,
    columns: Vec<(String, Vec<Option<String>>)>,
}

impl SampleMetadata {
    pub fn new(sample_ids: Vec<String>) -> Self {
        SampleMetadata {
            sample_ids,
            columns: Vec::new(),
        }
    }

    /// Add (or replace) a fully populated column.
    pub fn with_column<I, S>(mut self, name: &str, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<Option<String>> = values.into_iter().map(|v| Some(v.into())).collect();
        if values.len() != self.sample_ids.len() {
            return Err(PipelineError::Input(format!(
                "Column '{}' has {} values for {} samples",
                name,
                values.len(),
                self.sample_ids.len()
            )));
        }
        match self.columns.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = values,
            None => self.columns.push((name.to_string(), values)),
        }
        Ok(self)
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn column(&self, name: &str) -> Result<&[Option<String>]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, values)| values.as_slice())
            .ok_or_else(|| PipelineError::Input(format!("Missing column '{}' in metadata", name)))
    }

    pub fn value(&self, column: &str, sample: usize) -> Result<Option<&str>> {
        Ok(self.column(column)?.get(sample).and_then(|v| v.as_deref()))
    }

    /// Distinct non-missing labels of `column`.
    pub fn classes(&self, column: &str, order: ClassOrder) -> Result<Vec<String>> {
        let values = self.column(column)?;
        let mut seen = HashSet::new();
        let mut classes: Vec<String> = values
            .iter()
            .flatten()
            .filter(|v| seen.insert(v.as_str()))
            .cloned()
            .collect();

        match order {
            ClassOrder::Appearance => {}
            ClassOrder::Sorted => classes.sort(),
            ClassOrder::ClusterNumber => classes.sort_by(|a, b| compare_cluster_labels(a, b)),
        }
        Ok(classes)
    }

    /// Sample indices whose `column` equals `value`.
    pub fn indices_where(&self, column: &str, value: &str) -> Result<Vec<usize>> {
        Ok(self
            .column(column)?
            .iter()
            .enumerate()
            .filter_map(|(i, v)| (v.as_deref() == Some(value)).then_some(i))
            .collect())
    }

    /// Write `value` into `column` for every sample whose `where_column`
    /// equals `equals`. The column is created (as the first column, empty
    /// elsewhere) when absent. Returns the number of cells written.
    pub fn annotate(
        &mut self,
        column: &str,
        where_column: &str,
        equals: &str,
        value: &str,
    ) -> Result<usize> {
        let targets = self.indices_where(where_column, equals)?;
        let position = match self.columns.iter().position(|(n, _)| n == column) {
            Some(position) => position,
            None => {
                self.columns
                    .insert(0, (column.to_string(), vec![None; self.sample_ids.len()]));
                0
            }
        };

        let cells = &mut self.columns[position].1;
        for &i in &targets {
            cells[i] = Some(value.to_string());
        }
        Ok(targets.len())
    }

    /// Fails unless the sample axis matches the matrix exactly.
    pub fn ensure_aligned(&self, matrix: &SampleMatrix) -> Result<()> {
        if self.sample_ids.as_slice() != matrix.sample_ids() {
            return Err(PipelineError::Input(
                "Metadata sample ids do not match the expression matrix sample axis".to_string(),
            ));
        }
        Ok(())
    }
}

fn cluster_number(label: &str) -> Option<i64> {
    label
        .rsplit(' ')
        .next()
        .and_then(|suffix| suffix.parse::<i64>().ok())
}

fn compare_cluster_labels(a: &str, b: &str) -> Ordering {
    match (cluster_number(a), cluster_number(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> SampleMetadata {
        let ids: Vec<String> = (0..5).map(|i| format!("cell{}", i)).collect();
        SampleMetadata::new(ids)
            .with_column(
                "leiden",
                ["Cluster 10", "Cluster 2", "Cluster 1", "Cluster 2", "Cluster 10"],
            )
            .unwrap()
            .with_column("celltype", ["T", "B", "T", "NK", "B"])
            .unwrap()
    }

    #[test]
    fn test_class_orders() {
        let meta = metadata();
        assert_eq!(
            meta.classes("celltype", ClassOrder::Appearance).unwrap(),
            vec!["T", "B", "NK"]
        );
        assert_eq!(
            meta.classes("celltype", ClassOrder::Sorted).unwrap(),
            vec!["B", "NK", "T"]
        );
        assert_eq!(
            meta.classes("leiden", ClassOrder::ClusterNumber).unwrap(),
            vec!["Cluster 1", "Cluster 2", "Cluster 10"]
        );
    }

    #[test]
    fn test_missing_column_is_input_error() {
        let meta = metadata();
        assert!(matches!(meta.column("batch"), Err(PipelineError::Input(_))));
    }

    #[test]
    fn test_annotate_creates_column_first_and_overwrites() {
        let mut meta = metadata();
        let written = meta.annotate("KEGG Pathways", "celltype", "B", "Ribosome").unwrap();
        assert_eq!(written, 2);
        assert_eq!(meta.column_names().next(), Some("KEGG Pathways"));
        assert_eq!(meta.value("KEGG Pathways", 1).unwrap(), Some("Ribosome"));
        assert_eq!(meta.value("KEGG Pathways", 0).unwrap(), None);

        meta.annotate("KEGG Pathways", "celltype", "B", "Spliceosome").unwrap();
        assert_eq!(meta.value("KEGG Pathways", 4).unwrap(), Some("Spliceosome"));
        assert_eq!(meta.column_names().count(), 3);
    }
}
