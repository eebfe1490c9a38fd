use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::domain::{Domain, ExecutionMode, MalformedRecordPolicy};
use crate::error::PipelineError;

pub const DEFAULT_CONFIG_FILE: &str = "rfam-genomes.json";
pub const DEFAULT_CLUSTER_ROOT: &str = "/nfs/production/rfam/genomes";
pub const DEFAULT_ENA_BASE_URL: &str = "https://www.ebi.ac.uk/ena/browser/api";
pub const DEFAULT_UNIPROT_BASE_URL: &str = "https://rest.uniprot.org";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub local_root: Option<String>,
    #[serde(default)]
    pub cluster_root: Option<String>,
    #[serde(default)]
    pub domains: Option<Vec<Domain>>,
    #[serde(default)]
    pub malformed_records: Option<MalformedRecordPolicy>,
    #[serde(default)]
    pub local_workers: Option<usize>,
    #[serde(default)]
    pub ena_base_url: Option<String>,
    #[serde(default)]
    pub uniprot_base_url: Option<String>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub lsf: Option<LsfEntry>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LsfEntry {
    #[serde(default)]
    pub submit_command: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub queue: Option<String>,
    #[serde(default)]
    pub memory_mb: Option<u32>,
    #[serde(default)]
    pub tmp_mb: Option<u32>,
    #[serde(default)]
    pub cpus: Option<u32>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LsfSettings {
    pub submit_command: String,
    pub group: String,
    pub queue: Option<String>,
    pub memory_mb: u32,
    pub tmp_mb: u32,
    pub cpus: u32,
    pub email: Option<String>,
}

impl Default for LsfSettings {
    fn default() -> Self {
        Self {
            submit_command: "bsub".to_string(),
            group: "/rfam_gen".to_string(),
            queue: None,
            memory_mb: 2000,
            tmp_mb: 2000,
            cpus: 1,
            email: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub local_root: Utf8PathBuf,
    pub cluster_root: Utf8PathBuf,
    pub domains: Vec<Domain>,
    pub malformed_records: MalformedRecordPolicy,
    pub local_workers: Option<usize>,
    pub ena_base_url: String,
    pub uniprot_base_url: String,
    pub request_timeout_secs: u64,
    pub lsf: LsfSettings,
}

impl ResolvedConfig {
    pub fn location_root(&self, mode: ExecutionMode) -> &Utf8PathBuf {
        match mode {
            ExecutionMode::Local => &self.local_root,
            ExecutionMode::Cluster => &self.cluster_root,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, PipelineError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| PipelineError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| PipelineError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, PipelineError> {
        let local_root = match config.local_root {
            Some(root) => Utf8PathBuf::from(root),
            None => default_local_root()?,
        };
        let cluster_root = Utf8PathBuf::from(
            config
                .cluster_root
                .unwrap_or_else(|| DEFAULT_CLUSTER_ROOT.to_string()),
        );

        let mut domains = config.domains.unwrap_or_else(|| Domain::ALL.to_vec());
        domains.sort();
        domains.dedup();
        if domains.is_empty() {
            return Err(PipelineError::ConfigParse(
                "domains must list at least one domain".to_string(),
            ));
        }

        if config.local_workers == Some(0) {
            return Err(PipelineError::ConfigParse(
                "local_workers must be at least 1".to_string(),
            ));
        }

        let lsf = match config.lsf {
            Some(entry) => {
                let defaults = LsfSettings::default();
                LsfSettings {
                    submit_command: entry.submit_command.unwrap_or(defaults.submit_command),
                    group: entry.group.unwrap_or(defaults.group),
                    queue: entry.queue,
                    memory_mb: entry.memory_mb.unwrap_or(defaults.memory_mb),
                    tmp_mb: entry.tmp_mb.unwrap_or(defaults.tmp_mb),
                    cpus: entry.cpus.unwrap_or(defaults.cpus),
                    email: entry.email,
                }
            }
            None => LsfSettings::default(),
        };

        Ok(ResolvedConfig {
            local_root,
            cluster_root,
            domains,
            malformed_records: config
                .malformed_records
                .unwrap_or(MalformedRecordPolicy::Skip),
            local_workers: config.local_workers,
            ena_base_url: trim_base(config.ena_base_url, DEFAULT_ENA_BASE_URL),
            uniprot_base_url: trim_base(config.uniprot_base_url, DEFAULT_UNIPROT_BASE_URL),
            request_timeout_secs: config.request_timeout_secs.unwrap_or(60),
            lsf,
        })
    }
}

fn trim_base(value: Option<String>, default: &str) -> String {
    value
        .unwrap_or_else(|| default.to_string())
        .trim_end_matches('/')
        .to_string()
}

fn default_local_root() -> Result<Utf8PathBuf, PipelineError> {
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(dirs.data_local_dir().join("rfam-genomes")).ok()
        })
        .ok_or_else(|| PipelineError::Filesystem("unable to resolve local data directory".to_string()))
}
