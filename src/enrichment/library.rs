use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A remote library id with the label shown for its results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibrarySpec {
    pub id: &'static str,
    pub label: &'static str,
}

const fn spec(id: &'static str, label: &'static str) -> LibrarySpec {
    LibrarySpec { id, label }
}

const GENE_ONTOLOGY: &[LibrarySpec] = &[
    spec(
        "GO_Biological_Process_2018",
        "Gene Ontology Biological Process (2018 version)",
    ),
    spec(
        "MGI_Mammalian_Phenotype_Level_4_2019",
        "MGI Mammalian Phenotype Level 4 2019",
    ),
];
const PATHWAY: &[LibrarySpec] = &[spec("KEGG_2019_Human", "KEGG Pathways")];
const TRANSCRIPTION_FACTOR: &[LibrarySpec] =
    &[spec("ChEA_2016", "ChEA (experimentally validated targets)")];
const KINASE: &[LibrarySpec] = &[
    spec("KEA_2015", "KEA (experimentally validated targets)"),
    spec("ARCHS4_Kinases_Coexp", "ARCHS4 (coexpressed genes)"),
];
const MIRNA: &[LibrarySpec] = &[
    spec(
        "TargetScan_microRNA_2017",
        "TargetScan (experimentally validated targets)",
    ),
    spec(
        "miRTarBase_2017",
        "miRTarBase (experimentally validated targets)",
    ),
];
const CELL_TYPE: &[LibrarySpec] = &[spec(
    "HuBMAP_ASCT_plus_B_augmented_w_RNAseq_Coexpression",
    "HuBMAP ASCT+B Cell Type",
)];
const DISEASE: &[LibrarySpec] = &[spec("GWAS_Catalog_2019", "GWAS Catalog")];

/// Curated bundles of remote libraries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LibraryCategory {
    #[serde(rename = "Gene Ontology")]
    GeneOntology,
    Pathway,
    #[serde(rename = "Transcription Factor")]
    TranscriptionFactor,
    Kinase,
    #[serde(rename = "miRNA")]
    MiRna,
    #[serde(rename = "Cell Type")]
    CellType,
    Disease,
}

impl LibraryCategory {
    pub const ALL: [LibraryCategory; 7] = [
        LibraryCategory::GeneOntology,
        LibraryCategory::Pathway,
        LibraryCategory::TranscriptionFactor,
        LibraryCategory::Kinase,
        LibraryCategory::MiRna,
        LibraryCategory::CellType,
        LibraryCategory::Disease,
    ];

    pub const fn libraries(self) -> &'static [LibrarySpec] {
        match self {
            LibraryCategory::GeneOntology => GENE_ONTOLOGY,
            LibraryCategory::Pathway => PATHWAY,
            LibraryCategory::TranscriptionFactor => TRANSCRIPTION_FACTOR,
            LibraryCategory::Kinase => KINASE,
            LibraryCategory::MiRna => MIRNA,
            LibraryCategory::CellType => CELL_TYPE,
            LibraryCategory::Disease => DISEASE,
        }
    }
}

/// Locally supplied term → gene set library.
///
/// Each line holds a term name, a double tab, and the member genes separated
/// by tabs or spaces. Genes are uppercased and deduplicated within a term.
#[derive(Debug, Clone, PartialEq)]
pub struct TermLibrary {
    name: String,
    terms: Vec<(String, Vec<String>)>,
}

impl TermLibrary {
    pub fn new(name: impl Into<String>) -> Self {
        TermLibrary {
            name: name.into(),
            terms: Vec::new(),
        }
    }

    pub fn with_term<I, S>(mut self, term: impl Into<String>, genes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.terms.push((term.into(), normalize_genes(genes)));
        self
    }

    /// Parse a library; `name` becomes the label of its results.
    pub fn from_reader<R: BufRead>(name: impl Into<String>, reader: R) -> Result<Self> {
        let mut library = TermLibrary::new(name);
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim_end_matches(['\r', '\n']);
            if line.trim().is_empty() {
                continue;
            }
            let (term, genes) = line.split_once("\t\t").ok_or_else(|| {
                PipelineError::Input(format!(
                    "Line {} of library '{}' has no term/gene separator",
                    line_no + 1,
                    library.name
                ))
            })?;
            library
                .terms
                .push((term.to_string(), normalize_genes(genes.split_whitespace())));
        }
        Ok(library)
    }

    /// Parse a library file, labelled with its file name.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let file = File::open(path)?;
        Self::from_reader(name, BufReader::new(file))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.terms.iter().map(|(t, g)| (t.as_str(), g.as_slice()))
    }

    pub fn genes(&self, term: &str) -> Option<&[String]> {
        self.terms
            .iter()
            .find(|(t, _)| t == term)
            .map(|(_, g)| g.as_slice())
    }
}

fn normalize_genes<I, S>(genes: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    genes
        .into_iter()
        .map(|g| g.as_ref().trim().to_uppercase())
        .filter(|g| !g.is_empty() && seen.insert(g.clone()))
        .collect()
}
