use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::{Accession, Domain, GenomeId};
use crate::error::PipelineError;

pub const INDEX_FILE_NAME: &str = "upid_gca_dict.json";
pub const RECORD_SUFFIX: &str = ".fa.gz";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    root: Utf8PathBuf,
}

impl Project {
    pub fn new(location_root: &Utf8Path, name: &str) -> Result<Self, PipelineError> {
        let name = name.trim();
        if name.is_empty() || name.contains('/') || name == "." || name == ".." {
            return Err(PipelineError::Filesystem(format!(
                "invalid project name: {name:?}"
            )));
        }
        Ok(Self {
            root: location_root.join(name),
        })
    }

    pub fn from_root(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn index_path(&self) -> Utf8PathBuf {
        self.root.join(INDEX_FILE_NAME)
    }

    pub fn domain_dir(&self, domain: Domain) -> Utf8PathBuf {
        self.root.join(domain.as_str())
    }

    pub fn workspace_dir(&self, domain: Domain, genome_id: &GenomeId) -> Utf8PathBuf {
        self.domain_dir(domain).join(genome_id.as_str())
    }

    pub fn record_path(workspace: &Utf8Path, accession: &Accession) -> Utf8PathBuf {
        workspace.join(accession.record_file_name())
    }

    pub fn merged_dir(&self) -> Utf8PathBuf {
        self.root.join("merged")
    }

    pub fn job_log_paths(&self, domain: Domain, genome_id: &GenomeId) -> (Utf8PathBuf, Utf8PathBuf) {
        let dir = self.domain_dir(domain);
        (
            dir.join(format!("{genome_id}.out")),
            dir.join(format!("{genome_id}.err")),
        )
    }

    pub fn initialize(&self, domains: &[Domain]) -> Result<Vec<Utf8PathBuf>, PipelineError> {
        let mut created = Vec::new();
        if !self.root.as_std_path().is_dir() {
            fs::create_dir_all(self.root.as_std_path())
                .map_err(|err| directory_error(&self.root, err))?;
            created.push(self.root.clone());
        }
        for domain in domains {
            let dir = self.domain_dir(*domain);
            if create_dir_if_absent(&dir)? {
                created.push(dir);
            }
        }
        Ok(created)
    }

    /// Makes sure `{root}/{domain}/{genome_id}` exists. A directory created
    /// concurrently by another process counts as success.
    pub fn ensure_workspace(
        &self,
        domain: Domain,
        genome_id: &GenomeId,
    ) -> Result<Utf8PathBuf, PipelineError> {
        let domain_dir = self.domain_dir(domain);
        fs::create_dir_all(domain_dir.as_std_path())
            .map_err(|err| directory_error(&domain_dir, err))?;
        let workspace = self.workspace_dir(domain, genome_id);
        create_dir_if_absent(&workspace)?;
        Ok(workspace)
    }

    pub fn list_record_files(workspace: &Utf8Path) -> Result<Vec<Utf8PathBuf>, PipelineError> {
        let entries = fs::read_dir(workspace.as_std_path())
            .map_err(|err| PipelineError::Filesystem(format!("read {workspace}: {err}")))?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| PipelineError::Filesystem(err.to_string()))?;
            let path = Utf8PathBuf::from_path_buf(entry.path())
                .map_err(|_| PipelineError::Filesystem("non-utf8 file path in workspace".to_string()))?;
            let is_record = path
                .file_name()
                .map(|name| name.ends_with(RECORD_SUFFIX) && !name.starts_with('.'))
                .unwrap_or(false);
            if is_record && path.as_std_path().is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), PipelineError> {
        let parent = path
            .parent()
            .ok_or_else(|| PipelineError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix(".rfam-genomes")
            .suffix(".partial")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        io::Write::write_all(&mut temp, content)
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

fn create_dir_if_absent(path: &Utf8Path) -> Result<bool, PipelineError> {
    match fs::create_dir(path.as_std_path()) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists && path.as_std_path().is_dir() => {
            Ok(false)
        }
        Err(err) => Err(directory_error(path, err)),
    }
}

fn directory_error(path: &Utf8Path, err: io::Error) -> PipelineError {
    PipelineError::Directory {
        path: path.to_string(),
        message: err.to_string(),
    }
}
