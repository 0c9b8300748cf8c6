//! Ranked differential-expression signatures and the backends producing them.
//!
//! Each backend is a unit type implementing [`SignatureBackend`]; the
//! [`BackendKind`] enum selects one and carries the column metadata (fold
//! change column, rank column, sort direction) as compile-time constants.
//!
//! | Backend | fold-change column | rank column | direction |
//! |---|---|---|---|
//! | rank-sum (Wilcoxon) | `logfoldchanges` | `scores` | descending |
//! | characteristic direction | `CD-coefficient` | `CD-coefficient` | descending |
//! | limma-voom | `logFC` | `t` | descending |
//! | edgeR | `logFC` | `PValue` | ascending |
//! | DESeq2 | `log2FoldChange` | `padj` | ascending |

use crate::partition::ComparisonId;
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

mod characteristic_direction;
mod deseq2;
mod edger;
mod limma;
mod rank_sum;
mod store;

pub use characteristic_direction::CharacteristicDirection;
pub use deseq2::DESeq2;
pub use edger::EdgeR;
pub use limma::LimmaVoom;
pub use rank_sum::RankSum;
pub use store::SignatureStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    #[serde(rename = "wilcoxon")]
    RankSum,
    #[serde(rename = "characteristic_direction")]
    CharacteristicDirection,
    #[serde(rename = "limma")]
    LimmaVoom,
    #[serde(rename = "edgeR")]
    EdgeR,
    #[serde(rename = "DESeq2")]
    DESeq2,
}

impl BackendKind {
    pub const ALL: [BackendKind; 5] = [
        BackendKind::RankSum,
        BackendKind::CharacteristicDirection,
        BackendKind::LimmaVoom,
        BackendKind::EdgeR,
        BackendKind::DESeq2,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            BackendKind::RankSum => "wilcoxon",
            BackendKind::CharacteristicDirection => "characteristic_direction",
            BackendKind::LimmaVoom => "limma",
            BackendKind::EdgeR => "edgeR",
            BackendKind::DESeq2 => "DESeq2",
        }
    }

    pub const fn fold_change_column(self) -> &'static str {
        match self {
            BackendKind::RankSum => "logfoldchanges",
            BackendKind::CharacteristicDirection => "CD-coefficient",
            BackendKind::LimmaVoom | BackendKind::EdgeR => "logFC",
            BackendKind::DESeq2 => "log2FoldChange",
        }
    }

    pub const fn rank_column(self) -> &'static str {
        match self {
            BackendKind::RankSum => "scores",
            BackendKind::CharacteristicDirection => "CD-coefficient",
            BackendKind::LimmaVoom => "t",
            BackendKind::EdgeR => "PValue",
            BackendKind::DESeq2 => "padj",
        }
    }

    pub const fn sort_direction(self) -> SortDirection {
        match self {
            BackendKind::RankSum | BackendKind::CharacteristicDirection | BackendKind::LimmaVoom => {
                SortDirection::Descending
            }
            BackendKind::EdgeR | BackendKind::DESeq2 => SortDirection::Ascending,
        }
    }

    pub fn backend(self) -> &'static dyn SignatureBackend {
        match self {
            BackendKind::RankSum => &RankSum,
            BackendKind::CharacteristicDirection => &CharacteristicDirection,
            BackendKind::LimmaVoom => &LimmaVoom,
            BackendKind::EdgeR => &EdgeR,
            BackendKind::DESeq2 => &DESeq2,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BackendKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                format!(
                    "Unknown differential expression method '{}'; expected one of wilcoxon, characteristic_direction, limma, edgeR, DESeq2",
                    s
                )
            })
    }
}

/// Rows of one comparison: control samples first, then case samples.
#[derive(Debug, Clone, Copy)]
pub struct BackendInput<'a> {
    pub normalized: ArrayView2<'a, f64>,
    pub counts: ArrayView2<'a, f64>,
    pub n_control: usize,
}

impl BackendInput<'_> {
    pub fn n_case(&self) -> usize {
        self.normalized.nrows() - self.n_control
    }
}

/// Named per-gene output columns, in gene order of the input matrix.
pub type SignatureColumns = Vec<(&'static str, Vec<f64>)>;

pub trait SignatureBackend: Sync {
    fn kind(&self) -> BackendKind;

    fn compute(&self, input: &BackendInput<'_>) -> anyhow::Result<SignatureColumns>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignatureColumn {
    pub name: &'static str,
    pub values: Vec<f64>,
}

/// Per-gene differential-expression table of one comparison, sorted by the
/// backend's rank column. Immutable once built.
#[derive(Debug, Clone)]
pub struct Signature {
    comparison: ComparisonId,
    backend: BackendKind,
    genes: Vec<String>,
    columns: Vec<SignatureColumn>,
}

impl Signature {
    /// Sort backend output by the rank column. Ties keep input gene order.
    pub fn from_columns(
        comparison: ComparisonId,
        backend: BackendKind,
        genes: &[String],
        columns: SignatureColumns,
    ) -> anyhow::Result<Self> {
        for (name, values) in &columns {
            if values.len() != genes.len() {
                return Err(anyhow::anyhow!(
                    "Column '{}' has {} values for {} genes",
                    name,
                    values.len(),
                    genes.len()
                ));
            }
        }

        let rank_name = backend.rank_column();
        let fc_name = backend.fold_change_column();
        let rank = columns
            .iter()
            .find(|(name, _)| *name == rank_name)
            .map(|(_, values)| values)
            .ok_or_else(|| anyhow::anyhow!("Backend output lacks rank column '{}'", rank_name))?;
        if !columns.iter().any(|(name, _)| *name == fc_name) {
            return Err(anyhow::anyhow!(
                "Backend output lacks fold change column '{}'",
                fc_name
            ));
        }

        let mut order: Vec<usize> = (0..genes.len()).collect();
        match backend.sort_direction() {
            SortDirection::Ascending => order.sort_by(|&a, &b| rank[a].total_cmp(&rank[b])),
            SortDirection::Descending => order.sort_by(|&a, &b| rank[b].total_cmp(&rank[a])),
        }

        let sorted_genes = order.iter().map(|&i| genes[i].clone()).collect();
        let sorted_columns = columns
            .into_iter()
            .map(|(name, values)| SignatureColumn {
                name,
                values: order.iter().map(|&i| values[i]).collect(),
            })
            .collect();

        Ok(Signature {
            comparison,
            backend,
            genes: sorted_genes,
            columns: sorted_columns,
        })
    }

    pub fn comparison(&self) -> &ComparisonId {
        &self.comparison
    }

    pub fn label(&self) -> String {
        self.comparison.label()
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn genes(&self) -> &[String] {
        &self.genes
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    pub fn columns(&self) -> &[SignatureColumn] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    pub fn fold_changes(&self) -> &[f64] {
        self.column(self.backend.fold_change_column())
            .unwrap_or_default()
    }

    pub fn rank_values(&self) -> &[f64] {
        self.column(self.backend.rank_column()).unwrap_or_default()
    }

    /// Up to `k` genes with positive fold change, in signature order.
    pub fn upregulated(&self, k: usize) -> Vec<&str> {
        self.one_sided(k, |fc| fc > 0.0)
    }

    /// Up to `k` genes with negative fold change, in signature order.
    pub fn downregulated(&self, k: usize) -> Vec<&str> {
        self.one_sided(k, |fc| fc < 0.0)
    }

    fn one_sided(&self, k: usize, keep: impl Fn(f64) -> bool) -> Vec<&str> {
        self.genes
            .iter()
            .zip(self.fold_changes())
            .filter(|&(_, &fc)| keep(fc))
            .take(k)
            .map(|(gene, _)| gene.as_str())
            .collect()
    }
}
