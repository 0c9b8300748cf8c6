use crate::enrichment::{Direction, EnrichmentResult, EnrichmentRow, TermLibrary};
use crate::error::{PipelineError, Result};
use crate::testing::correction::benjamini_hochberg_correction;
use crate::testing::inference::discrete::fisher_overlap;
use rayon::prelude::*;
use std::collections::HashSet;
use tracing::debug;

/// Over-representation analysis of a gene set against a [`TermLibrary`].
#[derive(Debug, Clone, Copy)]
pub struct LocalEnricher {
    background_size: u64,
}

impl Default for LocalEnricher {
    fn default() -> Self {
        LocalEnricher {
            background_size: 20_000,
        }
    }
}

impl LocalEnricher {
    pub fn new(background_size: u64) -> Self {
        LocalEnricher { background_size }
    }

    pub fn background_size(&self) -> u64 {
        self.background_size
    }

    /// Test every term sharing at least one gene with `genes`.
    ///
    /// Rows are sorted by ascending p-value with ties broken by term name.
    /// An empty table is returned when no term overlaps the query.
    pub fn enrich<S: AsRef<str>>(
        &self,
        library: &TermLibrary,
        genes: &[S],
        direction: Direction,
    ) -> Result<EnrichmentResult> {
        let mut seen = HashSet::new();
        let query: Vec<String> = genes
            .iter()
            .map(|g| g.as_ref().trim().to_uppercase())
            .filter(|g| !g.is_empty() && seen.insert(g.clone()))
            .collect();
        let query_set: HashSet<&str> = query.iter().map(String::as_str).collect();

        let terms: Vec<(&str, &[String])> = library.terms().collect();
        let evaluated: Vec<(String, f64, f64, Vec<String>)> = terms
            .par_iter()
            .filter_map(|&(term, members)| {
                let mut overlap: Vec<String> = members
                    .iter()
                    .filter(|g| query_set.contains(g.as_str()))
                    .cloned()
                    .collect();
                if overlap.is_empty() {
                    return None;
                }
                overlap.sort();
                Some(
                    fisher_overlap(
                        overlap.len() as u64,
                        query.len() as u64,
                        members.len() as u64,
                        self.background_size,
                    )
                    .map(|test| {
                        let odds_ratio = test.effect_size.unwrap_or(f64::NAN);
                        (term.to_string(), test.p_value, odds_ratio, overlap)
                    }),
                )
            })
            .collect::<anyhow::Result<_>>()
            .map_err(|e| PipelineError::Input(format!("Library '{}': {}", library.name(), e)))?;

        let mut evaluated = evaluated;
        evaluated.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        let fdr = if evaluated.is_empty() {
            Vec::new()
        } else {
            let p_values: Vec<f64> = evaluated.iter().map(|e| e.1).collect();
            benjamini_hochberg_correction(&p_values)
                .map_err(|e| PipelineError::Input(format!("Library '{}': {}", library.name(), e)))?
        };

        let rows: Vec<EnrichmentRow> = evaluated
            .into_iter()
            .zip(fdr)
            .enumerate()
            .map(|(i, ((term, p_value, odds_ratio, overlapping_genes), fdr))| EnrichmentRow {
                rank: i + 1,
                term,
                p_value,
                z_score: None,
                combined_score: None,
                odds_ratio: Some(odds_ratio),
                fdr,
                overlapping_genes,
            })
            .collect();

        debug!(
            "{} of {} terms in '{}' overlap the {} query",
            rows.len(),
            library.len(),
            library.name(),
            direction
        );

        Ok(EnrichmentResult {
            library: library.name().to_string(),
            direction,
            rows,
        })
    }
}
