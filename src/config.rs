//! Run configuration, loadable from YAML.

use crate::data::ClassOrder;
use crate::enrichment::LibraryCategory;
use crate::error::Result;
use crate::partition::{GroupingMode, LabelPartitioner};
use crate::signature::BackendKind;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Which metadata column defines the classes, and how they are compared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GroupBy {
    /// User-supplied classes, every ordered pair compared.
    UserDefinedClass { column: String },
    /// Clustering output, each cluster against the rest.
    Cluster {
        #[serde(default = "default_cluster_column")]
        column: String,
    },
    /// Any other categorical column, each class against the rest.
    Column { column: String },
}

fn default_cluster_column() -> String {
    "leiden".to_string()
}

impl Default for GroupBy {
    fn default() -> Self {
        GroupBy::Cluster {
            column: default_cluster_column(),
        }
    }
}

impl GroupBy {
    pub fn column(&self) -> &str {
        match self {
            GroupBy::UserDefinedClass { column }
            | GroupBy::Cluster { column }
            | GroupBy::Column { column } => column,
        }
    }

    pub fn mode(&self) -> GroupingMode {
        match self {
            GroupBy::UserDefinedClass { .. } => GroupingMode::Pairwise,
            GroupBy::Cluster { .. } | GroupBy::Column { .. } => GroupingMode::OneVsRest,
        }
    }

    pub fn class_order(&self) -> ClassOrder {
        match self {
            GroupBy::UserDefinedClass { .. } => ClassOrder::Appearance,
            GroupBy::Cluster { .. } => ClassOrder::ClusterNumber,
            GroupBy::Column { .. } => ClassOrder::Sorted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentMode {
    /// Submit gene sets to the remote service.
    Remote,
    /// Evaluate the up-regulated sets against a local term library.
    Local,
    Both,
}

impl EnrichmentMode {
    pub fn remote(self) -> bool {
        matches!(self, EnrichmentMode::Remote | EnrichmentMode::Both)
    }

    pub fn local(self) -> bool {
        matches!(self, EnrichmentMode::Local | EnrichmentMode::Both)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub method: BackendKind,
    pub group_by: GroupBy,
    /// Genes kept per direction for enrichment.
    pub gene_topk: usize,
    pub libraries: Vec<LibraryCategory>,
    pub enrichment_mode: EnrichmentMode,
    pub enrichr_url: String,
    pub submit_delay_ms: u64,
    pub background_size: u64,
    pub max_classes: usize,
    pub max_samples: usize,
    /// Fail instead of switching backends when the size limits are exceeded.
    pub strict_backend: bool,
    /// Seed of the downsampling RNG; drawn from entropy when unset.
    pub seed: Option<u64>,
    pub top_terms: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            method: BackendKind::RankSum,
            group_by: GroupBy::default(),
            gene_topk: 500,
            libraries: vec![
                LibraryCategory::GeneOntology,
                LibraryCategory::Pathway,
                LibraryCategory::TranscriptionFactor,
            ],
            enrichment_mode: EnrichmentMode::Remote,
            enrichr_url: "https://maayanlab.cloud/Enrichr".to_string(),
            submit_delay_ms: 500,
            background_size: 20_000,
            max_classes: 5,
            max_samples: 5000,
            strict_backend: false,
            seed: None,
            top_terms: 3,
        }
    }
}

impl PipelineConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    pub fn submit_delay(&self) -> Duration {
        Duration::from_millis(self.submit_delay_ms)
    }

    pub fn partitioner(&self) -> LabelPartitioner {
        LabelPartitioner::new(self.group_by.mode())
            .with_limits(self.max_classes, self.max_samples)
            .with_strict_backend(self.strict_backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.method, BackendKind::RankSum);
        assert_eq!(config.group_by.column(), "leiden");
        assert_eq!(config.group_by.mode(), GroupingMode::OneVsRest);
        assert_eq!(config.gene_topk, 500);
        assert_eq!(config.submit_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = PipelineConfig {
            method: BackendKind::DESeq2,
            group_by: GroupBy::UserDefinedClass {
                column: "condition".to_string(),
            },
            seed: Some(11),
            ..Default::default()
        };
        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("DESeq2"));
        let parsed = PipelineConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "method: edgeR\ngroup_by:\n  kind: cluster\nlibraries: [Kinase, miRNA]\nenrichment_mode: both\n";
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.method, BackendKind::EdgeR);
        assert_eq!(config.group_by.column(), "leiden");
        assert_eq!(config.group_by.class_order(), ClassOrder::ClusterNumber);
        assert_eq!(config.libraries, vec![LibraryCategory::Kinase, LibraryCategory::MiRna]);
        assert!(config.enrichment_mode.remote() && config.enrichment_mode.local());
        assert_eq!(config.top_terms, 3);
    }

    #[test]
    fn test_unknown_method_is_config_error() {
        let result = PipelineConfig::from_yaml("method: t-test\n");
        assert!(matches!(result, Err(crate::error::PipelineError::Config(_))));
    }
}
