use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error("malformed index record at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("invalid genome id: {0}")]
    InvalidGenomeId(String),

    #[error("invalid accession: {0}")]
    InvalidAccession(String),

    #[error("invalid taxonomic domain: {0}")]
    InvalidDomain(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("ENA request for {accession} failed: {message}")]
    FetchHttp { accession: String, message: String },

    #[error("ENA returned status {status} for {accession}: {message}")]
    FetchStatus {
        accession: String,
        status: u16,
        message: String,
    },

    #[error("ENA returned an empty record for {0}")]
    EmptyResponse(String),

    #[error("accession resolution failed: {0}")]
    ResolveHttp(String),

    #[error("accession resolution returned status {status}: {message}")]
    ResolveStatus { status: u16, message: String },

    #[error("failed to create directory {path}: {message}")]
    Directory { path: String, message: String },

    #[error("dispatch of {genome_id} failed: {message}")]
    Dispatch { genome_id: String, message: String },

    #[error("accession index unavailable at {0}")]
    IndexUnavailable(String),

    #[error("orchestrator cannot move from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("genome {genome_id} is incomplete: {missing} of {expected} records missing")]
    IncompleteGenome {
        genome_id: String,
        missing: usize,
        expected: usize,
    },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

