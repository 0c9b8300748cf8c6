use crate::data::SampleMetadata;
use crate::enrichment::{
    Direction, EnrichmentResult, EnrichmentService, LibraryCategory, SubmittedQuery,
};
use crate::error::{PipelineError, Result};
use crate::partition::ComparisonId;
use serde::Serialize;
use tracing::{debug, info};

/// Every enrichment table gathered for one comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonEnrichment {
    pub comparison: ComparisonId,
    pub results: Vec<EnrichmentResult>,
}

impl ComparisonEnrichment {
    pub fn new(comparison: ComparisonId) -> Self {
        ComparisonEnrichment {
            comparison,
            results: Vec::new(),
        }
    }

    pub fn label(&self) -> String {
        self.comparison.label()
    }

    pub fn direction(&self, direction: Direction) -> impl Iterator<Item = &EnrichmentResult> {
        self.results.iter().filter(move |r| r.direction == direction)
    }

    pub fn library(&self, library: &str, direction: Direction) -> Option<&EnrichmentResult> {
        self.results
            .iter()
            .find(|r| r.library == library && r.direction == direction)
    }
}

/// One line of a top-terms summary table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopTermRow {
    #[serde(rename = "Class")]
    pub class: String,
    #[serde(rename = "Rank")]
    pub rank: usize,
    #[serde(rename = "Enriched Term")]
    pub term: String,
    #[serde(rename = "pvalue")]
    pub p_value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LibraryResults {
    pub library: String,
    pub rows: Vec<TopTermRow>,
}

/// Top terms per library, libraries in first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationSummary {
    libraries: Vec<LibraryResults>,
}

impl AnnotationSummary {
    fn push(&mut self, library: &str, rows: Vec<TopTermRow>) {
        match self.libraries.iter_mut().find(|l| l.library == library) {
            Some(existing) => existing.rows.extend(rows),
            None => self.libraries.push(LibraryResults {
                library: library.to_string(),
                rows,
            }),
        }
    }

    pub fn libraries(&self) -> &[LibraryResults] {
        &self.libraries
    }

    pub fn rows(&self, library: &str) -> Option<&[TopTermRow]> {
        self.libraries
            .iter()
            .find(|l| l.library == library)
            .map(|l| l.rows.as_slice())
    }

    /// Names of the metadata columns written by the annotation.
    pub fn annotated_columns(&self) -> Vec<&str> {
        self.libraries.iter().map(|l| l.library.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }
}

/// Collects enrichment tables and writes the top term per class into the
/// sample metadata.
#[derive(Debug, Clone)]
pub struct EnrichmentAggregator {
    top_n: usize,
}

impl Default for EnrichmentAggregator {
    fn default() -> Self {
        EnrichmentAggregator { top_n: 3 }
    }
}

impl EnrichmentAggregator {
    pub fn new(top_n: usize) -> Self {
        EnrichmentAggregator { top_n: top_n.max(1) }
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    /// Fetch both directions of every query against every library of the
    /// selected categories. Results are labelled with the library's
    /// display label.
    pub fn fetch(
        &self,
        service: &dyn EnrichmentService,
        queries: &[SubmittedQuery],
        categories: &[LibraryCategory],
    ) -> Result<Vec<ComparisonEnrichment>> {
        let mut gathered = Vec::with_capacity(queries.len());
        for query in queries {
            let mut enrichment = ComparisonEnrichment::new(query.comparison.clone());
            for direction in Direction::BOTH {
                let list = query.list(direction);
                info!("Fetching enrichment of {} ({}) from list {}", query.label(), direction, list.user_list_id);
                for category in categories {
                    for spec in category.libraries() {
                        let rows = service.enrich(list.user_list_id, spec.id)?;
                        debug!(
                            "{} rows for {} ({}) in {}",
                            rows.len(),
                            query.label(),
                            direction,
                            spec.id
                        );
                        enrichment.results.push(EnrichmentResult {
                            library: spec.label.to_string(),
                            direction,
                            rows,
                        });
                    }
                }
            }
            gathered.push(enrichment);
        }
        Ok(gathered)
    }

    /// Annotate `metadata` with the top up-regulated term of each
    /// comparison's case class, one column per library.
    ///
    /// Every up-regulated table is checked before anything is written; an
    /// empty one aborts the annotation. Later comparisons overwrite cells
    /// written by earlier ones for the same class.
    pub fn annotate(
        &self,
        enrichments: &[ComparisonEnrichment],
        metadata: &mut SampleMetadata,
        class_column: &str,
    ) -> Result<AnnotationSummary> {
        metadata.column(class_column)?;
        for enrichment in enrichments {
            if let Some(empty) = enrichment.direction(Direction::Upregulated).find(|r| r.is_empty()) {
                return Err(PipelineError::EmptyResult {
                    comparison: enrichment.label(),
                    library: empty.library.clone(),
                });
            }
        }

        let mut summary = AnnotationSummary::default();
        for enrichment in enrichments {
            let class = enrichment.comparison.case();
            for result in enrichment.direction(Direction::Upregulated) {
                let top = result.top(self.top_n);
                let rows = top
                    .iter()
                    .enumerate()
                    .map(|(i, row)| TopTermRow {
                        class: class.to_string(),
                        rank: i + 1,
                        term: row.term.clone(),
                        p_value: row.p_value,
                    })
                    .collect();
                summary.push(&result.library, rows);

                let top_term = &top[0].term;
                let written = metadata.annotate(&result.library, class_column, class, top_term)?;
                debug!(
                    "'{}' = '{}' for {} samples of class {}",
                    result.library, top_term, written, class
                );
            }
        }

        info!(
            "Annotated {} libraries over {} comparisons",
            summary.libraries().len(),
            enrichments.len()
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::{EnrichmentRow, UserList};
    use std::collections::HashMap;

    fn row(term: &str, p_value: f64) -> EnrichmentRow {
        EnrichmentRow {
            rank: 0,
            term: term.to_string(),
            p_value,
            z_score: None,
            combined_score: None,
            odds_ratio: None,
            fdr: p_value,
            overlapping_genes: Vec::new(),
        }
    }

    fn result(library: &str, direction: Direction, terms: &[&str]) -> EnrichmentResult {
        EnrichmentResult {
            library: library.to_string(),
            direction,
            rows: terms
                .iter()
                .enumerate()
                .map(|(i, t)| row(t, 0.001 * (i + 1) as f64))
                .collect(),
        }
    }

    fn metadata() -> SampleMetadata {
        SampleMetadata::new((0..4).map(|i| format!("S{}", i)).collect())
            .with_column("cluster", ["A", "A", "B", "B"])
            .unwrap()
    }

    #[test]
    fn test_annotate_writes_top_term_per_class() {
        let enrichments = vec![
            ComparisonEnrichment {
                comparison: ComparisonId::one_vs_rest("A"),
                results: vec![
                    result("Lib", Direction::Upregulated, &["T1", "T2", "T3", "T4"]),
                    result("Lib", Direction::Downregulated, &["D1"]),
                ],
            },
            ComparisonEnrichment {
                comparison: ComparisonId::one_vs_rest("B"),
                results: vec![result("Lib", Direction::Upregulated, &["T9"])],
            },
        ];
        let mut meta = metadata();
        let summary = EnrichmentAggregator::default()
            .annotate(&enrichments, &mut meta, "cluster")
            .unwrap();

        assert_eq!(meta.column_names().next(), Some("Lib"));
        assert_eq!(meta.value("Lib", 0).unwrap(), Some("T1"));
        assert_eq!(meta.value("Lib", 3).unwrap(), Some("T9"));

        let rows = summary.rows("Lib").unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[2].rank, 3);
        assert_eq!(rows[3].class, "B");
        assert_eq!(summary.annotated_columns(), vec!["Lib"]);
    }

    #[test]
    fn test_last_write_wins() {
        let enrichments = vec![
            ComparisonEnrichment {
                comparison: ComparisonId::pairwise("B", "A"),
                results: vec![result("Lib", Direction::Upregulated, &["First"])],
            },
            ComparisonEnrichment {
                comparison: ComparisonId::pairwise("C", "A"),
                results: vec![result("Lib", Direction::Upregulated, &["Second"])],
            },
        ];
        let mut meta = metadata();
        EnrichmentAggregator::default()
            .annotate(&enrichments, &mut meta, "cluster")
            .unwrap();
        assert_eq!(meta.value("Lib", 1).unwrap(), Some("Second"));
        assert_eq!(meta.value("Lib", 2).unwrap(), None);
    }

    #[test]
    fn test_empty_result_aborts_before_writing() {
        let enrichments = vec![
            ComparisonEnrichment {
                comparison: ComparisonId::one_vs_rest("A"),
                results: vec![result("Lib", Direction::Upregulated, &["T1"])],
            },
            ComparisonEnrichment {
                comparison: ComparisonId::one_vs_rest("B"),
                results: vec![result("Lib", Direction::Upregulated, &[])],
            },
        ];
        let mut meta = metadata();
        let err = EnrichmentAggregator::default()
            .annotate(&enrichments, &mut meta, "cluster")
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyResult { .. }));
        assert!(meta.column("Lib").is_err());
    }

    struct FixedService {
        rows: HashMap<(u64, String), Vec<EnrichmentRow>>,
    }

    impl EnrichmentService for FixedService {
        fn add_list(&self, _genes: &[String], _description: &str) -> Result<UserList> {
            unreachable!("fetch never submits")
        }

        fn enrich(&self, user_list_id: u64, library: &str) -> Result<Vec<EnrichmentRow>> {
            Ok(self
                .rows
                .get(&(user_list_id, library.to_string()))
                .cloned()
                .unwrap_or_default())
        }

        fn share_url(&self, short_id: &str) -> String {
            short_id.to_string()
        }
    }

    #[test]
    fn test_fetch_uses_display_labels() {
        let mut rows = HashMap::new();
        rows.insert((1, "KEGG_2019_Human".to_string()), vec![row("Cell cycle", 1e-4)]);
        rows.insert((2, "KEGG_2019_Human".to_string()), vec![row("Apoptosis", 1e-2)]);
        let service = FixedService { rows };
        let queries = vec![SubmittedQuery {
            comparison: ComparisonId::one_vs_rest("A"),
            upregulated: UserList {
                user_list_id: 1,
                short_id: "u".into(),
            },
            downregulated: UserList {
                user_list_id: 2,
                short_id: "d".into(),
            },
        }];

        let fetched = EnrichmentAggregator::default()
            .fetch(&service, &queries, &[LibraryCategory::Pathway])
            .unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].results.len(), 2);
        let up = fetched[0].library("KEGG Pathways", Direction::Upregulated).unwrap();
        assert_eq!(up.rows[0].term, "Cell cycle");
        let down = fetched[0].library("KEGG Pathways", Direction::Downregulated).unwrap();
        assert_eq!(down.rows[0].term, "Apoptosis");
    }
}
