use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LsfSettings;
use crate::domain::GenomeJob;
use crate::ena::SequenceClient;
use crate::error::PipelineError;
use crate::materializer::{GenomeMaterializer, GenomeReport};
use crate::project::Project;
use crate::resolve::AccessionResolver;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Submitted { job_id: Option<String> },
    Completed { report: GenomeReport },
}

pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, job: &GenomeJob) -> Result<DispatchOutcome, PipelineError>;
}

fn dispatch_error(job: &GenomeJob, message: impl Into<String>) -> PipelineError {
    PipelineError::Dispatch {
        genome_id: job.genome_id.to_string(),
        message: message.into(),
    }
}

#[derive(Debug, Clone)]
pub struct LocalProcessDispatcher {
    program: PathBuf,
    extra_args: Vec<String>,
}

impl LocalProcessDispatcher {
    pub fn new(program: PathBuf, extra_args: Vec<String>) -> Self {
        Self {
            program,
            extra_args,
        }
    }

    pub fn command_args(&self, job: &GenomeJob) -> Vec<String> {
        let mut args = job.materialize_args();
        args.push("--json".to_string());
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

impl Dispatcher for LocalProcessDispatcher {
    fn dispatch(&self, job: &GenomeJob) -> Result<DispatchOutcome, PipelineError> {
        let args = self.command_args(job);
        debug!(program = %self.program.display(), ?args, "spawning materializer");
        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|err| dispatch_error(job, format!("spawn {}: {err}", self.program.display())))?;

        // An incomplete genome exits non-zero but still prints its report.
        match serde_json::from_slice::<GenomeReport>(&output.stdout) {
            Ok(report) => Ok(DispatchOutcome::Completed { report }),
            Err(err) => Err(dispatch_error(
                job,
                format!(
                    "materializer exited with {} without a readable report: {err}",
                    output.status
                ),
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LsfDispatcher {
    settings: LsfSettings,
    program: PathBuf,
    extra_args: Vec<String>,
}

impl LsfDispatcher {
    pub fn new(settings: LsfSettings, program: PathBuf, extra_args: Vec<String>) -> Self {
        Self {
            settings,
            program,
            extra_args,
        }
    }

    pub fn submit_args(&self, job: &GenomeJob) -> Vec<String> {
        let project = Project::from_root(job.project_root.clone());
        let (out_log, err_log) = project.job_log_paths(job.domain, &job.genome_id);
        let lsf = &self.settings;

        let mut args = vec![
            "-M".to_string(),
            lsf.memory_mb.to_string(),
            "-R".to_string(),
            format!("rusage[mem={},tmp={}]", lsf.memory_mb, lsf.tmp_mb),
            "-n".to_string(),
            lsf.cpus.to_string(),
            "-o".to_string(),
            out_log.to_string(),
            "-e".to_string(),
            err_log.to_string(),
            "-g".to_string(),
            lsf.group.clone(),
            "-J".to_string(),
            job.genome_id.to_string(),
        ];
        if let Some(queue) = &lsf.queue {
            args.push("-q".to_string());
            args.push(queue.clone());
        }
        if let Some(email) = &lsf.email {
            args.push("-u".to_string());
            args.push(email.clone());
        }
        args.push(self.program.to_string_lossy().to_string());
        args.extend(job.materialize_args());
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

fn job_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Job <(\d+)>").expect("static job id regex"))
}

/// Job id from a `bsub` answer such as
/// `Job <4242> is submitted to default queue <normal>.`
pub fn parse_job_id(stdout: &str) -> Option<String> {
    job_id_regex()
        .captures(stdout)
        .map(|caps| caps[1].to_string())
}

impl Dispatcher for LsfDispatcher {
    fn dispatch(&self, job: &GenomeJob) -> Result<DispatchOutcome, PipelineError> {
        let args = self.submit_args(job);
        debug!(submit = %self.settings.submit_command, ?args, "submitting genome job");
        let output = Command::new(&self.settings.submit_command)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| {
                dispatch_error(job, format!("run {}: {err}", self.settings.submit_command))
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("{} exited with {}", self.settings.submit_command, output.status)
            } else {
                stderr
            };
            return Err(dispatch_error(job, message));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(DispatchOutcome::Submitted {
            job_id: parse_job_id(&stdout),
        })
    }
}

pub struct InProcessDispatcher<R: AccessionResolver, C: SequenceClient> {
    materializer: GenomeMaterializer<R, C>,
}

impl<R: AccessionResolver, C: SequenceClient> InProcessDispatcher<R, C> {
    pub fn new(materializer: GenomeMaterializer<R, C>) -> Self {
        Self { materializer }
    }
}

impl<R: AccessionResolver, C: SequenceClient> Dispatcher for InProcessDispatcher<R, C> {
    fn dispatch(&self, job: &GenomeJob) -> Result<DispatchOutcome, PipelineError> {
        let report = self.materializer.materialize(job)?;
        Ok(DispatchOutcome::Completed { report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Domain;

    fn job() -> GenomeJob {
        GenomeJob {
            genome_id: "UP000005640".parse().unwrap(),
            assembly: Some("GCA_000001405".parse().unwrap()),
            domain: Domain::Eukaryota,
            project_root: "/gpfs/rfam/proj".into(),
        }
    }

    #[test]
    fn bsub_arguments() {
        let settings = LsfSettings {
            queue: Some("production".to_string()),
            ..LsfSettings::default()
        };
        let dispatcher = LsfDispatcher::new(settings, PathBuf::from("/opt/rfam-genomes"), Vec::new());
        let args = dispatcher.submit_args(&job());

        assert_eq!(args[0], "-M");
        assert!(args.contains(&"rusage[mem=2000,tmp=2000]".to_string()));
        assert!(args.contains(&"/gpfs/rfam/proj/Eukaryota/UP000005640.out".to_string()));
        assert!(args.contains(&"/rfam_gen".to_string()));
        assert!(args.contains(&"production".to_string()));
        let exe = args.iter().position(|a| a == "/opt/rfam-genomes").unwrap();
        assert_eq!(args[exe + 1], "materialize");
        assert_eq!(args.last().unwrap(), "Eukaryota");
    }

    #[test]
    fn job_id_from_bsub_answer() {
        assert_eq!(
            parse_job_id("Job <4242> is submitted to default queue <normal>.\n"),
            Some("4242".to_string())
        );
        assert_eq!(parse_job_id("Request aborted by esub."), None);
    }
}
