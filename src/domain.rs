use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Domain {
    Archaea,
    Bacteria,
    Eukaryota,
    Viruses,
}

impl Domain {
    pub const ALL: [Domain; 4] = [
        Domain::Archaea,
        Domain::Bacteria,
        Domain::Eukaryota,
        Domain::Viruses,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Archaea => "Archaea",
            Domain::Bacteria => "Bacteria",
            Domain::Eukaryota => "Eukaryota",
            Domain::Viruses => "Viruses",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "archaea" => Ok(Domain::Archaea),
            "bacteria" => Ok(Domain::Bacteria),
            "eukaryota" | "eukaryotes" | "eukarya" => Ok(Domain::Eukaryota),
            "viruses" | "virus" => Ok(Domain::Viruses),
            _ => Err(PipelineError::InvalidDomain(value.to_string())),
        }
    }
}

impl TryFrom<String> for Domain {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Domain> for String {
    fn from(value: Domain) -> Self {
        value.as_str().to_string()
    }
}

fn is_path_safe(value: &str) -> bool {
    !value.is_empty()
        && value != "."
        && value != ".."
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'))
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GenomeId(String);

impl GenomeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GenomeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GenomeId {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        if !is_path_safe(normalized) {
            return Err(PipelineError::InvalidGenomeId(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

impl TryFrom<String> for GenomeId {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GenomeId> for String {
    fn from(value: GenomeId) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Accession(String);

impl Accession {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_assembly(&self) -> bool {
        self.0.starts_with("GCA_") || self.0.starts_with("GCF_")
    }

    pub fn record_file_name(&self) -> String {
        format!("{}.fa.gz", self.0)
    }
}

pub const NO_ASSEMBLY: &str = "-1";

pub fn parse_assembly(value: &str) -> Result<Option<Accession>, PipelineError> {
    if value.trim() == NO_ASSEMBLY {
        return Ok(None);
    }
    value.parse().map(Some)
}

impl fmt::Display for Accession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Accession {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        if normalized == NO_ASSEMBLY || !is_path_safe(normalized) {
            return Err(PipelineError::InvalidAccession(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

impl TryFrom<String> for Accession {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Accession> for String {
    fn from(value: Accession) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Local,
    Cluster,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Local => write!(f, "local"),
            ExecutionMode::Cluster => write!(f, "cluster"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MalformedRecordPolicy {
    Skip,
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenomeJob {
    pub genome_id: GenomeId,
    pub assembly: Option<Accession>,
    pub domain: Domain,
    pub project_root: camino::Utf8PathBuf,
}

impl GenomeJob {
    pub fn materialize_args(&self) -> Vec<String> {
        let mut args = vec![
            "materialize".to_string(),
            "--genome-id".to_string(),
            self.genome_id.to_string(),
        ];
        if let Some(assembly) = &self.assembly {
            args.push("--accession".to_string());
            args.push(assembly.to_string());
        }
        args.extend([
            "--project-dir".to_string(),
            self.project_root.to_string(),
            "--domain".to_string(),
            self.domain.to_string(),
        ]);
        args
    }
}
