use std::sync::OnceLock;

use regex::Regex;
use reqwest::blocking::Client;
use serde_json::Value;
use tracing::debug;

use crate::domain::{Accession, GenomeId};
use crate::ena::build_http_client;
use crate::error::PipelineError;

pub trait AccessionResolver: Send + Sync {
    fn resolve(
        &self,
        genome_id: &GenomeId,
        assembly: Option<&Accession>,
    ) -> Result<Vec<Accession>, PipelineError>;
}

/// Reads chromosome accessions from the ENA assembly record and falls back to
/// the genome accessions listed on the UniProt proteome. Proteomes without an
/// assembly go straight to UniProt.
#[derive(Clone)]
pub struct EnaAssemblyResolver {
    client: Client,
    ena_base_url: String,
    uniprot_base_url: String,
}

impl EnaAssemblyResolver {
    pub fn new(
        ena_base_url: &str,
        uniprot_base_url: &str,
        timeout_secs: u64,
    ) -> Result<Self, PipelineError> {
        Ok(Self {
            client: build_http_client(timeout_secs)?,
            ena_base_url: ena_base_url.trim_end_matches('/').to_string(),
            uniprot_base_url: uniprot_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn get_text(&self, url: &str) -> Result<String, PipelineError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| PipelineError::ResolveHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| format!("request to {url} failed"));
            return Err(PipelineError::ResolveStatus { status, message });
        }
        response
            .text()
            .map_err(|err| PipelineError::ResolveHttp(err.to_string()))
    }

    fn assembly_accessions(&self, assembly: &Accession) -> Result<Vec<Accession>, PipelineError> {
        let url = format!("{}/xml/{}", self.ena_base_url, assembly.as_str());
        let xml = self.get_text(&url)?;
        Ok(chromosome_accessions(&xml))
    }

    fn proteome_accessions(&self, genome_id: &GenomeId) -> Result<Vec<Accession>, PipelineError> {
        let url = format!(
            "{}/proteomes/{}?format=json",
            self.uniprot_base_url,
            genome_id.as_str()
        );
        let body = self.get_text(&url)?;
        let value: Value = serde_json::from_str(&body)
            .map_err(|err| PipelineError::ResolveHttp(format!("proteome {genome_id}: {err}")))?;
        Ok(proteome_genome_accessions(&value))
    }
}

impl AccessionResolver for EnaAssemblyResolver {
    fn resolve(
        &self,
        genome_id: &GenomeId,
        assembly: Option<&Accession>,
    ) -> Result<Vec<Accession>, PipelineError> {
        if let Some(assembly) = assembly {
            let accessions = self.assembly_accessions(assembly)?;
            if !accessions.is_empty() {
                debug!(%genome_id, count = accessions.len(), "resolved from ENA assembly");
                return Ok(accessions);
            }
        }
        let accessions = self.proteome_accessions(genome_id)?;
        debug!(%genome_id, count = accessions.len(), "resolved from UniProt proteome");
        Ok(accessions)
    }
}

fn chromosome_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<CHROMOSOME\s+accession="([^"]+)""#).expect("static chromosome regex")
    })
}

pub fn chromosome_accessions(xml: &str) -> Vec<Accession> {
    let mut out: Vec<Accession> = Vec::new();
    for caps in chromosome_regex().captures_iter(xml) {
        if let Ok(acc) = caps[1].parse::<Accession>() {
            if !out.contains(&acc) {
                out.push(acc);
            }
        }
    }
    out
}

pub fn proteome_genome_accessions(value: &Value) -> Vec<Accession> {
    let mut out: Vec<Accession> = Vec::new();
    let components = value
        .get("components")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for component in components {
        let xrefs = component
            .get("proteomeCrossReferences")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for xref in xrefs {
            if xref.get("database").and_then(Value::as_str) != Some("GenomeAccession") {
                continue;
            }
            if let Some(acc) = xref
                .get("id")
                .and_then(Value::as_str)
                .and_then(|id| id.parse::<Accession>().ok())
            {
                if !out.contains(&acc) {
                    out.push(acc);
                }
            }
        }
    }
    out
}
