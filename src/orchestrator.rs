use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::ResolvedConfig;
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::domain::{ExecutionMode, GenomeJob};
use crate::error::PipelineError;
use crate::index::{AccessionIndex, AccessionIndexLoader, IndexSummary};
use crate::project::Project;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Uninitialized,
    Indexed,
    Dispatched,
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorState::Uninitialized => write!(f, "uninitialized"),
            OrchestratorState::Indexed => write!(f, "indexed"),
            OrchestratorState::Dispatched => write!(f, "dispatched"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchedGenome {
    pub genome_id: String,
    pub domain: String,
    pub outcome: DispatchOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchFailure {
    pub genome_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub project_root: String,
    pub mode: ExecutionMode,
    pub created_dirs: Vec<String>,
    pub index: IndexSummary,
    pub dispatched: Vec<DispatchedGenome>,
    pub failures: Vec<DispatchFailure>,
    pub started_at: String,
    pub finished_at: String,
}

impl DispatchReport {
    pub fn incomplete_genomes(&self) -> Vec<&str> {
        self.dispatched
            .iter()
            .filter(|genome| match &genome.outcome {
                DispatchOutcome::Completed { report } => !report.is_complete(),
                DispatchOutcome::Submitted { .. } => false,
            })
            .map(|genome| genome.genome_id.as_str())
            .collect()
    }
}

pub struct ProjectOrchestrator<D: Dispatcher> {
    config: ResolvedConfig,
    mode: ExecutionMode,
    project: Project,
    upid_file: Utf8PathBuf,
    dispatcher: D,
    state: OrchestratorState,
    index: Option<(AccessionIndex, IndexSummary)>,
    created_dirs: Vec<Utf8PathBuf>,
    started_at: String,
}

impl<D: Dispatcher> ProjectOrchestrator<D> {
    pub fn new(
        config: ResolvedConfig,
        mode: ExecutionMode,
        project_name: &str,
        upid_file: &Utf8Path,
        dispatcher: D,
    ) -> Result<Self, PipelineError> {
        let project = Project::new(config.location_root(mode), project_name)?;
        Ok(Self {
            config,
            mode,
            project,
            upid_file: upid_file.to_path_buf(),
            dispatcher,
            state: OrchestratorState::Uninitialized,
            index: None,
            created_dirs: Vec::new(),
            started_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn index(&self) -> Option<&AccessionIndex> {
        self.index.as_ref().map(|(index, _)| index)
    }

    pub fn initialize_project(&self) -> Result<Vec<Utf8PathBuf>, PipelineError> {
        let created = self.project.initialize(&self.config.domains)?;
        info!(root = %self.project.root(), created = created.len(), "project initialized");
        Ok(created)
    }

    pub fn prepare(&mut self) -> Result<&AccessionIndex, PipelineError> {
        self.expect_state(OrchestratorState::Uninitialized, OrchestratorState::Indexed)?;
        self.created_dirs = self.initialize_project()?;

        let loader = AccessionIndexLoader::new(
            self.config.malformed_records,
            self.config.domains.clone(),
        );
        let (index, summary) = loader.ensure(&self.upid_file, &self.project, false)?;
        self.state = OrchestratorState::Indexed;
        let (index, _) = self.index.insert((index, summary));
        Ok(index)
    }

    pub fn dispatch(&mut self) -> Result<DispatchReport, PipelineError> {
        self.expect_state(OrchestratorState::Indexed, OrchestratorState::Dispatched)?;
        // The persisted file is the source of truth for what gets dispatched.
        let index = AccessionIndex::read(&self.project.index_path())?;
        let jobs = index.jobs(&self.project);
        info!(genomes = jobs.len(), mode = %self.mode, "dispatching genomes");

        let results = self.dispatch_all(&jobs)?;

        let mut dispatched = Vec::new();
        let mut failures = Vec::new();
        for (job, result) in jobs.iter().zip(results) {
            match result {
                Ok(outcome) => dispatched.push(DispatchedGenome {
                    genome_id: job.genome_id.to_string(),
                    domain: job.domain.to_string(),
                    outcome,
                }),
                Err(err) => {
                    warn!(genome_id = %job.genome_id, error = %err, "dispatch failed");
                    failures.push(DispatchFailure {
                        genome_id: job.genome_id.to_string(),
                        error: err.to_string(),
                    });
                }
            }
        }

        self.state = OrchestratorState::Dispatched;
        let summary = self
            .index
            .as_ref()
            .map(|(_, summary)| summary.clone())
            .ok_or_else(|| PipelineError::IndexUnavailable(self.project.index_path().to_string()))?;

        Ok(DispatchReport {
            project_root: self.project.root().to_string(),
            mode: self.mode,
            created_dirs: self.created_dirs.iter().map(|dir| dir.to_string()).collect(),
            index: summary,
            dispatched,
            failures,
            started_at: self.started_at.clone(),
            finished_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    pub fn run(&mut self) -> Result<DispatchReport, PipelineError> {
        self.prepare()?;
        self.dispatch()
    }

    fn dispatch_all(
        &self,
        jobs: &[GenomeJob],
    ) -> Result<Vec<Result<DispatchOutcome, PipelineError>>, PipelineError> {
        let dispatcher = &self.dispatcher;
        let workers = match (self.mode, self.config.local_workers) {
            (ExecutionMode::Local, Some(workers)) if workers > 1 => workers,
            _ => return Ok(jobs.iter().map(|job| dispatcher.dispatch(job)).collect()),
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|err| PipelineError::ConfigParse(format!("worker pool: {err}")))?;
        Ok(pool.install(|| {
            jobs.par_iter()
                .map(|job| dispatcher.dispatch(job))
                .collect()
        }))
    }

    fn expect_state(
        &self,
        expected: OrchestratorState,
        next: OrchestratorState,
    ) -> Result<(), PipelineError> {
        if self.state != expected {
            return Err(PipelineError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        Ok(())
    }
}
