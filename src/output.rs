use std::io::{self, Write};

use serde::Serialize;

use crate::audit::{AuditReport, WorkspaceStatus};
use crate::dispatch::DispatchOutcome;
use crate::ena::FetchOutcome;
use crate::index::IndexSummary;
use crate::materializer::GenomeReport;
use crate::merge::MergeReport;
use crate::orchestrator::DispatchReport;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

pub struct HumanOutput;

impl HumanOutput {
    pub fn print_dispatch(report: &DispatchReport) {
        println!(
            "project {} ({} mode): {} genomes indexed, {} skipped records",
            report.project_root,
            report.mode,
            report.index.genomes,
            report.index.skipped.len()
        );
        let submitted = report
            .dispatched
            .iter()
            .filter(|g| matches!(g.outcome, DispatchOutcome::Submitted { .. }))
            .count();
        let completed = report.dispatched.len() - submitted;
        println!(
            "dispatched {} (submitted {submitted}, ran {completed}), failed {}",
            report.dispatched.len(),
            report.failures.len()
        );
        for failure in &report.failures {
            println!("  FAILED {}: {}", failure.genome_id, failure.error);
        }
        for genome_id in report.incomplete_genomes() {
            println!("  INCOMPLETE {genome_id}");
        }
    }

    pub fn print_genome(report: &GenomeReport) {
        println!(
            "{} [{}]: {} records, {} downloaded, {} already present, {} failed",
            report.genome_id,
            report.domain,
            report.expected,
            report.downloaded.len(),
            report.already_present.len(),
            report.failures.len()
        );
        for failure in &report.failures {
            println!("  {}: {}", failure.accession, failure.error);
        }
        if !report.missing.is_empty() {
            println!("  missing: {}", report.missing.join(", "));
        }
    }

    pub fn print_fetch(outcome: &FetchOutcome) {
        match outcome {
            FetchOutcome::Downloaded { path, bytes } => println!("downloaded {path} ({bytes} bytes)"),
            FetchOutcome::AlreadyPresent { path } => println!("already present {path}"),
        }
    }

    pub fn print_index(summary: &IndexSummary) {
        let verb = if summary.loaded { "wrote" } else { "kept" };
        println!(
            "{verb} {} with {} genomes",
            summary.index_path, summary.genomes
        );
        for skipped in &summary.skipped {
            println!("  skipped line {}: {}", skipped.line, skipped.reason);
        }
    }

    pub fn print_audit(report: &AuditReport) {
        println!(
            "{}: {} present, {} empty, {} missing",
            report.project_root, report.present, report.empty, report.missing
        );
        for genome in &report.genomes {
            if genome.status != WorkspaceStatus::Present {
                println!("  {:?} {} [{}]", genome.status, genome.genome_id, genome.domain);
            }
        }
    }

    pub fn print_merge(report: &MergeReport) {
        println!("merged {} files into {} bundles", report.inputs, report.bundles.len());
        for bundle in &report.bundles {
            println!("  {bundle}");
        }
        for genome_id in &report.missing_genomes {
            println!("  no workspace for {genome_id}");
        }
    }
}
