use crate::enrichment::{
    Direction, EnrichmentResult, EnrichmentService, LocalEnricher, TermLibrary, UserList,
};
use crate::error::{PipelineError, Result};
use crate::partition::ComparisonId;
use crate::signature::{Signature, SignatureStore};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Top up- and down-regulated genes of a signature, in signature order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneSets {
    pub upregulated: Vec<String>,
    pub downregulated: Vec<String>,
}

impl GeneSets {
    /// Genes with positive (negative) fold change, truncated to `k` each.
    pub fn from_signature(signature: &Signature, k: usize) -> Self {
        let owned = |genes: Vec<&str>| -> Vec<String> { genes.into_iter().map(str::to_string).collect() };
        GeneSets {
            upregulated: owned(signature.upregulated(k)),
            downregulated: owned(signature.downregulated(k)),
        }
    }

    pub fn get(&self, direction: Direction) -> &[String] {
        match direction {
            Direction::Upregulated => &self.upregulated,
            Direction::Downregulated => &self.downregulated,
        }
    }
}

/// Remote handles of both gene sets of one comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedQuery {
    pub comparison: ComparisonId,
    pub upregulated: UserList,
    pub downregulated: UserList,
}

impl SubmittedQuery {
    pub fn label(&self) -> String {
        self.comparison.label()
    }

    pub fn list(&self, direction: Direction) -> &UserList {
        match direction {
            Direction::Upregulated => &self.upregulated,
            Direction::Downregulated => &self.downregulated,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnrichmentSubmitter {
    gene_topk: usize,
    delay: Duration,
}

impl Default for EnrichmentSubmitter {
    fn default() -> Self {
        EnrichmentSubmitter::new(500)
    }
}

impl EnrichmentSubmitter {
    pub fn new(gene_topk: usize) -> Self {
        EnrichmentSubmitter {
            gene_topk,
            delay: Duration::from_millis(500),
        }
    }

    /// Pause after every successful remote submission.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn gene_topk(&self) -> usize {
        self.gene_topk
    }

    pub fn gene_sets(&self, signature: &Signature) -> GeneSets {
        GeneSets::from_signature(signature, self.gene_topk)
    }

    /// Submit the up- and down-regulated sets of one signature.
    pub fn submit(&self, service: &dyn EnrichmentService, signature: &Signature) -> Result<SubmittedQuery> {
        let sets = self.gene_sets(signature);
        let label = signature.label();

        let submit_one = |direction: Direction| -> Result<UserList> {
            let description = format!("{}, {}, from scRNA-seq pipeline", label, direction);
            let list = service.add_list(sets.get(direction), &description)?;
            debug!(
                "Submitted {} {} genes of '{}' as list {}",
                sets.get(direction).len(),
                direction,
                label,
                list.user_list_id
            );
            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            Ok(list)
        };

        let upregulated = submit_one(Direction::Upregulated)?;
        let downregulated = submit_one(Direction::Downregulated)?;
        info!(
            "Enrichment results for {}: up {} down {}",
            label,
            service.share_url(&upregulated.short_id),
            service.share_url(&downregulated.short_id)
        );

        Ok(SubmittedQuery {
            comparison: signature.comparison().clone(),
            upregulated,
            downregulated,
        })
    }

    /// Submit every signature of the store, in store order.
    pub fn submit_all(&self, service: &dyn EnrichmentService, store: &SignatureStore) -> Result<Vec<SubmittedQuery>> {
        store.iter().map(|signature| self.submit(service, signature)).collect()
    }

    /// Test the up-regulated set of one signature against a local library.
    ///
    /// A table without any evaluable term is an error.
    pub fn evaluate_local(
        &self,
        enricher: &LocalEnricher,
        library: &TermLibrary,
        signature: &Signature,
    ) -> Result<EnrichmentResult> {
        let genes = signature.upregulated(self.gene_topk);
        let result = enricher.enrich(library, &genes, Direction::Upregulated)?;
        if result.is_empty() {
            return Err(PipelineError::EmptyResult {
                comparison: signature.label(),
                library: library.name().to_string(),
            });
        }
        Ok(result)
    }

    pub fn evaluate_all_local(
        &self,
        enricher: &LocalEnricher,
        library: &TermLibrary,
        store: &SignatureStore,
    ) -> Result<Vec<(ComparisonId, EnrichmentResult)>> {
        store
            .iter()
            .map(|signature| {
                let result = self.evaluate_local(enricher, library, signature)?;
                Ok((signature.comparison().clone(), result))
            })
            .collect()
    }
}
