//! Error types for the signature and enrichment pipeline.

use thiserror::Error;

/// Terminal failures of a pipeline run.
///
/// None of these are downgraded to warnings; the only policy substitution
/// in the pipeline is the backend/downsampling safeguard, which logs instead.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Malformed input, missing metadata column, too few classes.
    #[error("Input error: {0}")]
    Input(String),

    /// A statistical backend failed on one comparison.
    #[error("{backend} failed on comparison '{comparison}': {source}")]
    Computation {
        backend: &'static str,
        comparison: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Error analyzing gene list '{description}': {reason}")]
    EnrichmentSubmission { description: String, reason: String },

    #[error("Error fetching enrichment results for list {list_id} from '{library}': {reason}")]
    EnrichmentFetch {
        list_id: u64,
        library: String,
        reason: String,
    },

    #[error(
        "Enrichment analysis returned empty results for '{comparison}' in library '{library}'. \
         Please check if your data contains proper gene names."
    )]
    EmptyResult { comparison: String, library: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
