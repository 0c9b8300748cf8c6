//! # single-enrich
//!
//! Differential expression signatures and gene set enrichment for annotated
//! single-cell data, part of the single-rust ecosystem.
//!
//! Samples are split into comparison groups by a categorical metadata column,
//! each comparison is turned into a ranked per-gene signature by one of five
//! statistical backends, and the top up- and down-regulated genes are tested
//! for enrichment either remotely (Enrichr) or against a local term library.
//! The best term per class and library is written back onto the metadata.
//!
//! ## Core Features
//!
//! - **Signature backends**: Wilcoxon rank-sum, characteristic direction,
//!   limma-voom, edgeR and DESeq2 style analyses behind one
//!   [`signature::SignatureBackend`] trait
//! - **Multiple Testing Correction**: Benjamini-Hochberg FDR for genes and terms
//! - **Enrichment**: remote submission and fetch, or a local one-sided Fisher test
//! - **Sparse Matrix Support**: `CsrMatrix` input from nalgebra-sparse
//!
//! ## Quick Start
//!
//! Build a [`data::SampleMatrix`] and [`data::SampleMetadata`], pick a
//! [`config::PipelineConfig`] and call [`pipeline::Pipeline::run`].
//!
//! ```rust,no_run
//! use single_enrich::config::{EnrichmentMode, GroupBy, PipelineConfig};
//! use single_enrich::data::{SampleMatrix, SampleMetadata};
//! use single_enrich::enrichment::TermLibrary;
//! use single_enrich::pipeline::Pipeline;
//! # fn run(matrix: SampleMatrix, mut metadata: SampleMetadata) -> single_enrich::error::Result<()> {
//! let config = PipelineConfig {
//!     group_by: GroupBy::Cluster { column: "leiden".into() },
//!     enrichment_mode: EnrichmentMode::Local,
//!     ..Default::default()
//! };
//! let library = TermLibrary::from_path("custom_library.txt")?;
//! let output = Pipeline::new(config)
//!     .with_local_library(&library)
//!     .run(&matrix, &mut metadata)?;
//! println!("{} signatures", output.signatures.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - **[`testing`]**: Statistical tests, empirical Bayes moderation and multiple testing correction
//! - **[`data`]**: Expression matrices and sample metadata
//! - **[`partition`]**: Comparison groups and the size safeguard
//! - **[`signature`]**: Backends and the signature store
//! - **[`enrichment`]**: Gene set submission, local evaluation and aggregation

pub mod config;
pub mod data;
pub mod enrichment;
pub mod error;
pub mod export;
pub mod partition;
pub mod pipeline;
pub mod signature;
pub mod testing;

pub use error::{PipelineError, Result};
