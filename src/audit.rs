use serde::Serialize;

use crate::error::PipelineError;
use crate::index::AccessionIndex;
use crate::project::Project;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceStatus {
    Missing,
    Empty,
    Present,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenomeAudit {
    pub genome_id: String,
    pub domain: String,
    pub status: WorkspaceStatus,
    pub records: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub project_root: String,
    pub genomes: Vec<GenomeAudit>,
    pub missing: usize,
    pub empty: usize,
    pub present: usize,
}

pub fn audit_project(project: &Project) -> Result<AuditReport, PipelineError> {
    let index = AccessionIndex::read(&project.index_path())?;
    let mut genomes = Vec::with_capacity(index.len());

    for (genome_id, record) in index.iter() {
        let workspace = project.workspace_dir(record.domain, genome_id);
        let (status, records) = if !workspace.as_std_path().is_dir() {
            (WorkspaceStatus::Missing, 0)
        } else {
            let files = Project::list_record_files(&workspace)?;
            if files.is_empty() {
                (WorkspaceStatus::Empty, 0)
            } else {
                (WorkspaceStatus::Present, files.len())
            }
        };
        genomes.push(GenomeAudit {
            genome_id: genome_id.to_string(),
            domain: record.domain.to_string(),
            status,
            records,
        });
    }

    let count = |wanted: WorkspaceStatus| genomes.iter().filter(|g| g.status == wanted).count();
    Ok(AuditReport {
        project_root: project.root().to_string(),
        missing: count(WorkspaceStatus::Missing),
        empty: count(WorkspaceStatus::Empty),
        present: count(WorkspaceStatus::Present),
        genomes,
    })
}
