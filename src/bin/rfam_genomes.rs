use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use rfam_genome_pipeline::audit::audit_project;
use rfam_genome_pipeline::config::{ConfigLoader, ResolvedConfig};
use rfam_genome_pipeline::dispatch::{Dispatcher, LocalProcessDispatcher, LsfDispatcher};
use rfam_genome_pipeline::domain::{
    Accession, Domain, ExecutionMode, GenomeId, GenomeJob, MalformedRecordPolicy,
};
use rfam_genome_pipeline::ena::{EnaHttpClient, fetch_accession};
use rfam_genome_pipeline::error::PipelineError;
use rfam_genome_pipeline::index::AccessionIndexLoader;
use rfam_genome_pipeline::materializer::GenomeMaterializer;
use rfam_genome_pipeline::merge::{MergeOptions, MergeScope, merge_project, read_genome_list};
use rfam_genome_pipeline::orchestrator::ProjectOrchestrator;
use rfam_genome_pipeline::output::{HumanOutput, JsonOutput, OutputMode};
use rfam_genome_pipeline::project::Project;
use rfam_genome_pipeline::resolve::EnaAssemblyResolver;

#[derive(Parser)]
#[command(name = "rfam-genomes")]
#[command(about = "Download Rfam genome sequences from ENA, locally or through LSF")]
#[command(version)]
struct Cli {
    /// Print reports as JSON on stdout.
    #[arg(long, global = true)]
    json: bool,

    /// Pipeline config (defaults to ./rfam-genomes.json when present).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Initialize a project, load the UPID/GCA index and dispatch every genome")]
    Run(RunArgs),
    #[command(about = "Download every sequence record of one genome")]
    Materialize(MaterializeArgs),
    #[command(about = "Download one sequence record")]
    Fetch(FetchArgs),
    #[command(about = "Write the project's upid_gca_dict.json from a UPID/GCA file")]
    LoadIndex(LoadIndexArgs),
    #[command(about = "Report workspace status for every indexed genome")]
    Audit(ProjectDirArgs),
    #[command(about = "Concatenate record files into release bundles")]
    Merge(MergeArgs),
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    project_name: String,

    #[arg(long)]
    upid_file: Utf8PathBuf,

    #[arg(long, value_enum, default_value_t = ExecutionMode::Local)]
    mode: ExecutionMode,

    /// Bounded number of concurrent local genome processes.
    #[arg(long)]
    workers: Option<usize>,

    #[arg(long, value_enum)]
    on_malformed: Option<MalformedRecordPolicy>,
}

#[derive(Args)]
struct MaterializeArgs {
    #[arg(long)]
    genome_id: GenomeId,

    /// GCA assembly; omit for proteomes without one.
    #[arg(long)]
    accession: Option<Accession>,

    #[arg(long)]
    project_dir: Utf8PathBuf,

    #[arg(long)]
    domain: Domain,
}

#[derive(Args)]
struct FetchArgs {
    #[arg(long)]
    accession: Accession,

    #[arg(long)]
    dest: Utf8PathBuf,
}

#[derive(Args)]
struct LoadIndexArgs {
    #[arg(long)]
    upid_file: Utf8PathBuf,

    #[arg(long)]
    project_dir: Utf8PathBuf,

    /// Rebuild even when the index file already exists.
    #[arg(long)]
    force: bool,

    #[arg(long, value_enum)]
    on_malformed: Option<MalformedRecordPolicy>,
}

#[derive(Args)]
struct ProjectDirArgs {
    #[arg(long)]
    project_dir: Utf8PathBuf,
}

#[derive(Args)]
struct MergeArgs {
    #[arg(long)]
    project_dir: Utf8PathBuf,

    /// File with one genome id per line; defaults to every indexed genome.
    #[arg(long)]
    genomes: Option<Utf8PathBuf>,

    #[arg(long, value_enum, default_value_t = MergeScope::Genome)]
    scope: MergeScope,

    #[arg(long)]
    verify: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<PipelineError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &PipelineError) -> u8 {
    match error {
        PipelineError::Parse { .. }
        | PipelineError::InvalidGenomeId(_)
        | PipelineError::InvalidAccession(_)
        | PipelineError::InvalidDomain(_)
        | PipelineError::ConfigRead(_)
        | PipelineError::ConfigParse(_)
        | PipelineError::IndexUnavailable(_) => 2,
        PipelineError::FetchHttp { .. }
        | PipelineError::FetchStatus { .. }
        | PipelineError::EmptyResponse(_)
        | PipelineError::ResolveHttp(_)
        | PipelineError::ResolveStatus { .. } => 3,
        PipelineError::IncompleteGenome { .. } => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };
    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => run_project(args, config, cli.config.as_deref(), output_mode),
        Commands::Materialize(args) => run_materialize(args, &config, output_mode),
        Commands::Fetch(args) => run_fetch(args, &config, output_mode),
        Commands::LoadIndex(args) => run_load_index(args, &config, output_mode),
        Commands::Audit(args) => {
            let project = Project::from_root(args.project_dir);
            let report = audit_project(&project)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print(&report).into_diagnostic()?,
                OutputMode::Human => HumanOutput::print_audit(&report),
            }
            Ok(())
        }
        Commands::Merge(args) => run_merge(args, output_mode),
    }
}

/// Arguments every child invocation needs to see the same configuration.
fn child_args(config_path: Option<&str>) -> miette::Result<Vec<String>> {
    let Some(path) = config_path else {
        return Ok(Vec::new());
    };
    let absolute = std::fs::canonicalize(path).into_diagnostic()?;
    Ok(vec![
        "--config".to_string(),
        absolute.to_string_lossy().to_string(),
    ])
}

fn run_project(
    args: RunArgs,
    mut config: ResolvedConfig,
    config_path: Option<&str>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    if let Some(workers) = args.workers {
        if workers == 0 {
            return Err(miette::Report::msg("--workers must be at least 1"));
        }
        config.local_workers = Some(workers);
    }
    if let Some(policy) = args.on_malformed {
        config.malformed_records = policy;
    }

    let program: PathBuf = std::env::current_exe().into_diagnostic()?;
    let extra = child_args(config_path)?;
    match args.mode {
        ExecutionMode::Local => {
            let dispatcher = LocalProcessDispatcher::new(program, extra);
            orchestrate(args, config, dispatcher, output_mode)
        }
        ExecutionMode::Cluster => {
            let dispatcher = LsfDispatcher::new(config.lsf.clone(), program, extra);
            orchestrate(args, config, dispatcher, output_mode)
        }
    }
}

fn orchestrate<D: Dispatcher>(
    args: RunArgs,
    config: ResolvedConfig,
    dispatcher: D,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let mut orchestrator = ProjectOrchestrator::new(
        config,
        args.mode,
        &args.project_name,
        &args.upid_file,
        dispatcher,
    )?;
    let report = orchestrator.run()?;
    match output_mode {
        OutputMode::Json => JsonOutput::print(&report).into_diagnostic()?,
        OutputMode::Human => HumanOutput::print_dispatch(&report),
    }
    Ok(())
}

fn run_materialize(
    args: MaterializeArgs,
    config: &ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let resolver = EnaAssemblyResolver::new(
        &config.ena_base_url,
        &config.uniprot_base_url,
        config.request_timeout_secs,
    )?;
    let client = EnaHttpClient::new(&config.ena_base_url, config.request_timeout_secs)?;
    let materializer = GenomeMaterializer::new(resolver, client);
    let job = GenomeJob {
        genome_id: args.genome_id,
        assembly: args.accession,
        domain: args.domain,
        project_root: args.project_dir,
    };

    let report = materializer.materialize(&job)?;
    match output_mode {
        OutputMode::Json => JsonOutput::print(&report).into_diagnostic()?,
        OutputMode::Human => HumanOutput::print_genome(&report),
    }
    report.into_result()?;
    Ok(())
}

fn run_fetch(
    args: FetchArgs,
    config: &ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let client = EnaHttpClient::new(&config.ena_base_url, config.request_timeout_secs)?;
    let outcome = fetch_accession(&client, &args.accession, &args.dest)?;
    match output_mode {
        OutputMode::Json => JsonOutput::print(&outcome).into_diagnostic()?,
        OutputMode::Human => HumanOutput::print_fetch(&outcome),
    }
    Ok(())
}

fn run_load_index(
    args: LoadIndexArgs,
    config: &ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let project = Project::from_root(args.project_dir);
    let loader = AccessionIndexLoader::new(
        args.on_malformed.unwrap_or(config.malformed_records),
        config.domains.clone(),
    );
    let (_, summary) = loader.ensure(&args.upid_file, &project, args.force)?;
    match output_mode {
        OutputMode::Json => JsonOutput::print(&summary).into_diagnostic()?,
        OutputMode::Human => HumanOutput::print_index(&summary),
    }
    Ok(())
}

fn run_merge(args: MergeArgs, output_mode: OutputMode) -> miette::Result<()> {
    let project = Project::from_root(args.project_dir);
    let genomes = args
        .genomes
        .as_deref()
        .map(read_genome_list)
        .transpose()?;
    let options = MergeOptions {
        scope: args.scope,
        verify: args.verify,
    };
    let report = merge_project(&project, genomes.as_deref(), &options)?;
    match output_mode {
        OutputMode::Json => JsonOutput::print(&report).into_diagnostic()?,
        OutputMode::Human => HumanOutput::print_merge(&report),
    }
    Ok(())
}
