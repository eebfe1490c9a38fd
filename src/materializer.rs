use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{Accession, GenomeJob};
use crate::ena::{FetchOutcome, SequenceClient, fetch_accession};
use crate::error::PipelineError;
use crate::project::Project;
use crate::resolve::AccessionResolver;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordFailure {
    pub accession: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenomeReport {
    pub genome_id: String,
    pub domain: String,
    pub workspace: String,
    pub expected: usize,
    pub downloaded: Vec<String>,
    pub already_present: Vec<String>,
    pub failures: Vec<RecordFailure>,
    pub missing: Vec<String>,
}

impl GenomeReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.missing.is_empty()
    }

    pub fn into_result(self) -> Result<Self, PipelineError> {
        if self.is_complete() {
            return Ok(self);
        }
        Err(PipelineError::IncompleteGenome {
            genome_id: self.genome_id.clone(),
            missing: self.missing.len(),
            expected: self.expected,
        })
    }
}

pub struct GenomeMaterializer<R: AccessionResolver, C: SequenceClient> {
    resolver: R,
    client: C,
}

impl<R: AccessionResolver, C: SequenceClient> GenomeMaterializer<R, C> {
    pub fn new(resolver: R, client: C) -> Self {
        Self { resolver, client }
    }

    pub fn materialize(&self, job: &GenomeJob) -> Result<GenomeReport, PipelineError> {
        let project = Project::from_root(job.project_root.clone());
        let workspace = project.ensure_workspace(job.domain, &job.genome_id)?;

        let accessions = self.resolver.resolve(&job.genome_id, job.assembly.as_ref())?;
        info!(
            genome_id = %job.genome_id,
            records = accessions.len(),
            "fetching genome records"
        );

        let mut report = GenomeReport {
            genome_id: job.genome_id.to_string(),
            domain: job.domain.to_string(),
            workspace: workspace.to_string(),
            expected: accessions.len(),
            downloaded: Vec::new(),
            already_present: Vec::new(),
            failures: Vec::new(),
            missing: Vec::new(),
        };

        for accession in &accessions {
            match fetch_accession(&self.client, accession, &workspace) {
                Ok(FetchOutcome::Downloaded { .. }) => report.downloaded.push(accession.to_string()),
                Ok(FetchOutcome::AlreadyPresent { .. }) => {
                    report.already_present.push(accession.to_string())
                }
                Err(err) => {
                    warn!(genome_id = %job.genome_id, %accession, error = %err, "record fetch failed");
                    report.failures.push(RecordFailure {
                        accession: accession.to_string(),
                        error: err.to_string(),
                    });
                }
            }
        }

        report.missing = missing_records(&workspace, &accessions)
            .into_iter()
            .map(String::from)
            .collect();
        if report.is_complete() {
            info!(genome_id = %job.genome_id, "genome complete");
        } else {
            warn!(
                genome_id = %job.genome_id,
                failures = report.failures.len(),
                missing = report.missing.len(),
                "genome incomplete"
            );
        }
        Ok(report)
    }
}

pub fn missing_records(workspace: &Utf8Path, accessions: &[Accession]) -> Vec<Accession> {
    accessions
        .iter()
        .filter(|acc| !Project::record_path(workspace, acc).as_std_path().exists())
        .cloned()
        .collect()
}
