//! Delimited-text export of signatures, enrichment tables and annotations.

use crate::data::SampleMetadata;
use crate::enrichment::{AnnotationSummary, EnrichmentResult, TopTermRow};
use crate::error::Result;
use crate::signature::{Signature, SignatureStore};
use csv::{Writer, WriterBuilder};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Copy)]
pub struct Exporter {
    delimiter: u8,
}

impl Default for Exporter {
    fn default() -> Self {
        Exporter { delimiter: b',' }
    }
}

impl Exporter {
    pub fn new(delimiter: u8) -> Self {
        Exporter { delimiter }
    }

    fn writer<W: Write>(&self, inner: W) -> Writer<W> {
        WriterBuilder::new().delimiter(self.delimiter).from_writer(inner)
    }

    /// Gene symbol followed by every backend column, in signature order.
    pub fn write_signature<W: Write>(&self, signature: &Signature, inner: W) -> Result<()> {
        let mut writer = self.writer(inner);
        let mut header = vec!["gene"];
        header.extend(signature.columns().iter().map(|c| c.name));
        writer.write_record(&header)?;

        for (i, gene) in signature.genes().iter().enumerate() {
            let mut record = vec![gene.clone()];
            record.extend(signature.columns().iter().map(|c| c.values[i].to_string()));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn write_top_terms<W: Write>(&self, rows: &[TopTermRow], inner: W) -> Result<()> {
        let mut writer = self.writer(inner);
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn write_enrichment<W: Write>(&self, result: &EnrichmentResult, inner: W) -> Result<()> {
        let mut writer = self.writer(inner);
        writer.write_record([
            "rank",
            "term_name",
            "pvalue",
            "zscore",
            "combined_score",
            "odds_ratio",
            "FDR",
            "log10P",
            "overlapping_genes",
            "gene_set_library",
            "geneset",
        ])?;

        let optional = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_default();
        for row in &result.rows {
            writer.write_record([
                row.rank.to_string(),
                row.term.clone(),
                row.p_value.to_string(),
                optional(row.z_score),
                optional(row.combined_score),
                optional(row.odds_ratio),
                row.fdr.to_string(),
                row.log10_p().to_string(),
                row.overlapping_genes.join(";"),
                result.library.clone(),
                result.direction.to_string(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Sample id followed by every metadata column; missing cells are empty.
    pub fn write_metadata<W: Write>(&self, metadata: &SampleMetadata, inner: W) -> Result<()> {
        let mut writer = self.writer(inner);
        let names: Vec<&str> = metadata.column_names().collect();
        let columns = names
            .iter()
            .map(|name| metadata.column(name))
            .collect::<Result<Vec<_>>>()?;

        let mut header = vec!["sample"];
        header.extend(names.iter().copied());
        writer.write_record(&header)?;

        for (i, sample) in metadata.sample_ids().iter().enumerate() {
            let mut record = vec![sample.as_str()];
            record.extend(columns.iter().map(|c| c[i].as_deref().unwrap_or("")));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// One `DEG_{label}.csv` per signature.
    pub fn export_signatures(&self, dir: impl AsRef<Path>, store: &SignatureStore) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let mut written = Vec::with_capacity(store.len());
        for signature in store {
            let path = dir.join(format!("DEG_{}.csv", sanitize_file_name(&signature.label())));
            self.write_signature(signature, File::create(&path)?)?;
            written.push(path);
        }
        info!("Wrote {} signature tables to {}", written.len(), dir.display());
        Ok(written)
    }

    /// One `Top3_Enriched_Terms_{library}.csv` per annotated library.
    pub fn export_top_terms(&self, dir: impl AsRef<Path>, summary: &AnnotationSummary) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let mut written = Vec::with_capacity(summary.libraries().len());
        for library in summary.libraries() {
            let path = dir.join(format!(
                "Top3_Enriched_Terms_{}.csv",
                sanitize_file_name(&library.library)
            ));
            self.write_top_terms(&library.rows, File::create(&path)?)?;
            written.push(path);
        }
        info!("Wrote {} top-term tables to {}", written.len(), dir.display());
        Ok(written)
    }
}

/// Replace path separators and other characters unsafe in file names.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
