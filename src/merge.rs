use std::fs;
use std::io::{self, BufRead, BufReader, Write};

use camino::{Utf8Path, Utf8PathBuf};
use clap::ValueEnum;
use flate2::read::MultiGzDecoder;
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::GenomeId;
use crate::error::PipelineError;
use crate::index::AccessionIndex;
use crate::project::Project;

pub const PROJECT_BUNDLE_NAME: &str = "all_merged.fa.gz";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MergeScope {
    Genome,
    Project,
}

#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub scope: MergeScope,
    pub verify: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub scope: MergeScope,
    pub bundles: Vec<String>,
    pub inputs: usize,
    pub missing_genomes: Vec<String>,
}

pub fn read_genome_list(path: &Utf8Path) -> Result<Vec<GenomeId>, PipelineError> {
    let file = fs::File::open(path.as_std_path())
        .map_err(|err| PipelineError::Filesystem(format!("open {path}: {err}")))?;
    let mut ids = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        ids.push(line.parse()?);
    }
    Ok(ids)
}

pub fn validate_gzip(path: &Utf8Path) -> Result<(), PipelineError> {
    let file = fs::File::open(path.as_std_path())
        .map_err(|err| PipelineError::Filesystem(format!("open {path}: {err}")))?;
    io::copy(&mut MultiGzDecoder::new(file), &mut io::sink())
        .map_err(|err| PipelineError::Filesystem(format!("corrupt gzip {path}: {err}")))?;
    Ok(())
}

fn append_file(out: &mut impl Write, path: &Utf8Path, verify: bool) -> Result<(), PipelineError> {
    if verify {
        validate_gzip(path)?;
    }
    let mut input = fs::File::open(path.as_std_path())
        .map_err(|err| PipelineError::Filesystem(format!("open {path}: {err}")))?;
    io::copy(&mut input, out).map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    Ok(())
}

fn write_bundle(
    bundle: &Utf8Path,
    inputs: &[Utf8PathBuf],
    verify: bool,
) -> Result<(), PipelineError> {
    let parent = bundle
        .parent()
        .ok_or_else(|| PipelineError::Filesystem("invalid bundle path".to_string()))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".rfam-merge")
        .suffix(".partial")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    {
        let mut out = io::BufWriter::new(temp.as_file_mut());
        for input in inputs {
            append_file(&mut out, input, verify)?;
        }
        out.flush()
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    }
    temp.persist(bundle.as_std_path())
        .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    Ok(())
}

/// Merges the record files of `genomes` (or every indexed genome) into
/// `{project}/merged/`. Genomes without a workspace are reported, not fatal.
pub fn merge_project(
    project: &Project,
    genomes: Option<&[GenomeId]>,
    options: &MergeOptions,
) -> Result<MergeReport, PipelineError> {
    let index = AccessionIndex::read(&project.index_path())?;
    let selected: Vec<GenomeId> = match genomes {
        Some(ids) => ids.to_vec(),
        None => index.iter().map(|(id, _)| id.clone()).collect(),
    };

    let mut missing_genomes = Vec::new();
    let mut per_genome: Vec<(GenomeId, Vec<Utf8PathBuf>)> = Vec::new();
    for genome_id in selected {
        let Some(record) = index.get(&genome_id) else {
            warn!(%genome_id, "genome not in project index");
            missing_genomes.push(genome_id.to_string());
            continue;
        };
        let workspace = project.workspace_dir(record.domain, &genome_id);
        if !workspace.as_std_path().is_dir() {
            warn!(%genome_id, "no workspace to merge");
            missing_genomes.push(genome_id.to_string());
            continue;
        }
        per_genome.push((genome_id, Project::list_record_files(&workspace)?));
    }

    let merged_dir = project.merged_dir();
    let inputs: usize = per_genome.iter().map(|(_, files)| files.len()).sum();
    let mut bundles = Vec::new();
    match options.scope {
        MergeScope::Genome => {
            for (genome_id, files) in &per_genome {
                let bundle = merged_dir.join(format!("{genome_id}.fa.gz"));
                write_bundle(&bundle, files, options.verify)?;
                bundles.push(bundle.to_string());
            }
        }
        MergeScope::Project => {
            let files: Vec<Utf8PathBuf> = per_genome
                .into_iter()
                .flat_map(|(_, files)| files)
                .collect();
            let bundle = merged_dir.join(PROJECT_BUNDLE_NAME);
            write_bundle(&bundle, &files, options.verify)?;
            bundles.push(bundle.to_string());
        }
    }
    info!(bundles = bundles.len(), inputs, "merge finished");

    Ok(MergeReport {
        scope: options.scope,
        bundles,
        inputs,
        missing_genomes,
    })
}
