//! Gene set enrichment of differential-expression signatures.
//!
//! Signatures are cut into up- and down-regulated gene sets
//! ([`GeneSets`]) which are either submitted to a remote Enrichr-compatible
//! service ([`EnrichmentService`], [`EnrichrClient`]) or tested locally
//! against a term library ([`TermLibrary`], [`LocalEnricher`]) with a
//! one-sided Fisher exact test. The [`EnrichmentAggregator`] gathers the
//! per-library tables and writes the top term of each class back onto the
//! sample metadata.
//!
//! ## Result tables
//!
//! Every table is a list of [`EnrichmentRow`]s sorted by ascending p-value.
//! Remote rows carry Enrichr's z-score and combined score, local rows carry
//! the odds ratio instead.

use serde::{Deserialize, Serialize};
use std::fmt;

mod aggregate;
mod library;
mod local;
mod remote;
mod submit;

pub use aggregate::{
    AnnotationSummary, ComparisonEnrichment, EnrichmentAggregator, LibraryResults, TopTermRow,
};
pub use library::{LibraryCategory, LibrarySpec, TermLibrary};
pub use local::LocalEnricher;
pub use remote::{EnrichmentService, EnrichrClient, UserList};
pub use submit::{EnrichmentSubmitter, GeneSets, SubmittedQuery};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upregulated,
    Downregulated,
}

impl Direction {
    pub const BOTH: [Direction; 2] = [Direction::Upregulated, Direction::Downregulated];

    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::Upregulated => "upregulated",
            Direction::Downregulated => "downregulated",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One enriched term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentRow {
    pub rank: usize,
    pub term: String,
    pub p_value: f64,
    pub z_score: Option<f64>,
    pub combined_score: Option<f64>,
    pub odds_ratio: Option<f64>,
    pub fdr: f64,
    pub overlapping_genes: Vec<String>,
}

impl EnrichmentRow {
    pub fn n_overlap(&self) -> usize {
        self.overlapping_genes.len()
    }

    /// `-log10(p)`; infinite for a p-value of zero.
    pub fn log10_p(&self) -> f64 {
        -self.p_value.log10()
    }
}

/// Ranked term table of one gene set against one library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    /// Display label of the library, also the annotation column name.
    pub library: String,
    pub direction: Direction,
    pub rows: Vec<EnrichmentRow>,
}

impl EnrichmentResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn top(&self, n: usize) -> &[EnrichmentRow] {
        &self.rows[..n.min(self.rows.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(rank: usize, term: &str, p_value: f64) -> EnrichmentRow {
        EnrichmentRow {
            rank,
            term: term.to_string(),
            p_value,
            z_score: None,
            combined_score: None,
            odds_ratio: None,
            fdr: p_value,
            overlapping_genes: vec!["A".into(), "B".into()],
        }
    }

    #[test]
    fn test_row_helpers() {
        let r = row(1, "T", 0.001);
        assert_eq!(r.n_overlap(), 2);
        assert!((r.log10_p() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_top_is_clamped() {
        let result = EnrichmentResult {
            library: "L".into(),
            direction: Direction::Upregulated,
            rows: vec![row(1, "A", 0.01), row(2, "B", 0.02)],
        };
        assert_eq!(result.top(3).len(), 2);
        assert_eq!(result.top(1)[0].term, "A");
        assert_eq!(Direction::Downregulated.to_string(), "downregulated");
    }
}
