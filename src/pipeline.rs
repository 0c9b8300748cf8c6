//! End-to-end run: classes → comparisons → signatures → enrichment →
//! metadata annotation.

use crate::config::PipelineConfig;
use crate::data::{SampleMatrix, SampleMetadata};
use crate::enrichment::{
    AnnotationSummary, ComparisonEnrichment, EnrichmentAggregator, EnrichmentService,
    EnrichmentSubmitter, EnrichrClient, LocalEnricher, SubmittedQuery, TermLibrary,
};
use crate::error::{PipelineError, Result};
use crate::signature::{BackendKind, SignatureStore};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;

/// Everything a run produced besides the annotated metadata.
#[derive(Debug)]
pub struct PipelineOutput {
    /// Backend actually used, after the size safeguard.
    pub backend_used: BackendKind,
    pub downsampled: bool,
    pub signatures: SignatureStore,
    /// Remote list handles, empty in local-only mode.
    pub submissions: Vec<SubmittedQuery>,
    pub enrichment: Vec<ComparisonEnrichment>,
    pub summary: AnnotationSummary,
}

pub struct Pipeline<'a> {
    config: PipelineConfig,
    service: Option<&'a dyn EnrichmentService>,
    local_library: Option<&'a TermLibrary>,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: PipelineConfig) -> Self {
        Pipeline {
            config,
            service: None,
            local_library: None,
        }
    }

    /// Use `service` instead of an Enrichr client built from the config.
    pub fn with_service(mut self, service: &'a dyn EnrichmentService) -> Self {
        self.service = Some(service);
        self
    }

    pub fn with_local_library(mut self, library: &'a TermLibrary) -> Self {
        self.local_library = Some(library);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage and annotate `metadata` in place.
    pub fn run(&self, matrix: &SampleMatrix, metadata: &mut SampleMetadata) -> Result<PipelineOutput> {
        let config = &self.config;
        metadata.ensure_aligned(matrix)?;
        let local_library = if config.enrichment_mode.local() {
            let library = self.local_library.ok_or_else(|| {
                PipelineError::Input("Local enrichment requires a term library".to_string())
            })?;
            Some(library)
        } else {
            None
        };

        let column = config.group_by.column();
        let labels = metadata.column(column)?.to_vec();
        let classes = metadata.classes(column, config.group_by.class_order())?;
        if classes.len() < 2 {
            return Err(PipelineError::Input(format!(
                "Please provide at least 2 classes in column '{}' (found {})",
                column,
                classes.len()
            )));
        }
        info!(
            "{} classes in '{}' over {} samples and {} genes",
            classes.len(),
            column,
            matrix.n_samples(),
            matrix.n_genes()
        );

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let plan = config
            .partitioner()
            .plan(&labels, &classes, config.method, &mut rng)?;
        if plan.groups.is_empty() {
            return Err(PipelineError::Input(format!(
                "No comparison could be formed from column '{}'",
                column
            )));
        }

        let signatures = SignatureStore::build(matrix, &plan.groups, plan.backend)?;

        let submitter = EnrichmentSubmitter::new(config.gene_topk).with_delay(config.submit_delay());
        let aggregator = EnrichmentAggregator::new(config.top_terms);

        let mut submissions = Vec::new();
        let mut enrichment: Vec<ComparisonEnrichment> = signatures
            .iter()
            .map(|s| ComparisonEnrichment::new(s.comparison().clone()))
            .collect();

        if config.enrichment_mode.remote() {
            let client;
            let service: &dyn EnrichmentService = match self.service {
                Some(service) => service,
                None => {
                    client = EnrichrClient::new(&config.enrichr_url)?;
                    &client
                }
            };
            submissions = submitter.submit_all(service, &signatures)?;
            let fetched = aggregator.fetch(service, &submissions, &config.libraries)?;
            for (slot, remote) in enrichment.iter_mut().zip(fetched) {
                slot.results.extend(remote.results);
            }
        }

        if let Some(library) = local_library {
            let enricher = LocalEnricher::new(config.background_size);
            let local = submitter.evaluate_all_local(&enricher, library, &signatures)?;
            for (slot, (_, result)) in enrichment.iter_mut().zip(local) {
                slot.results.push(result);
            }
        }

        let summary = aggregator.annotate(&enrichment, metadata, column)?;

        Ok(PipelineOutput {
            backend_used: plan.backend,
            downsampled: plan.downsampled,
            signatures,
            submissions,
            enrichment,
            summary,
        })
    }
}
