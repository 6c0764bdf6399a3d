use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::info;
use tracing_subscriber::EnvFilter;

use kira_genome_batch::bootstrap::{BootstrapAction, ensure_datasets_binary};
use kira_genome_batch::config::{ConfigLoader, Overrides, ResolvedConfig};
use kira_genome_batch::datasets::{DatasetsClient, SystemDatasetsClient};
use kira_genome_batch::error::BatchError;
use kira_genome_batch::layout::Layout;
use kira_genome_batch::output::{JsonOutput, OutputMode, TracingSink, print_run_summary};
use kira_genome_batch::pipeline::{Pipeline, RunOptions};

#[derive(Parser)]
#[command(name = "kira-gb")]
#[command(about = "Batch download and unpack NCBI genome assemblies listed in a TSV")]
#[command(version, author)]
struct Cli {
    /// Print results as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// JSON config file (default: ./kira-gb.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Validate, probe, fetch, unpack and write the manifest")]
    Run(RunArgs),
    #[command(about = "Validate the input table and write assemblies.txt")]
    Accessions(InputArgs),
    #[command(about = "Rewrite logs/manifest.tsv from the input table")]
    Manifest(InputArgs),
    #[command(about = "Download the datasets CLI if it is missing")]
    Bootstrap(ToolArgs),
}

#[derive(Args, Clone, Default)]
struct InputArgs {
    /// Accession table; column 1 holds GCA_/GCF_ accessions
    #[arg(long, short = 'i')]
    input: Option<PathBuf>,

    /// Field delimiter (default: tab)
    #[arg(long)]
    delimiter: Option<String>,

    /// Directory for assemblies.txt, zips/, out/ and logs/
    #[arg(long)]
    workdir: Option<PathBuf>,
}

#[derive(Args, Clone, Default)]
struct ToolArgs {
    /// Path of the datasets executable (default: <workdir>/datasets)
    #[arg(long)]
    datasets: Option<PathBuf>,

    #[arg(long)]
    datasets_url: Option<String>,

    /// Fail instead of downloading a missing datasets executable
    #[arg(long)]
    no_bootstrap: bool,

    #[arg(long)]
    workdir: Option<PathBuf>,
}

#[derive(Args, Clone)]
struct RunArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Concurrent datasets/unzip jobs
    #[arg(long, short = 'j')]
    jobs: Option<usize>,

    /// Artifact kinds to request, comma separated (genome,gff3,protein,cds,...)
    #[arg(long, value_delimiter = ',')]
    include: Option<Vec<String>>,

    #[arg(long)]
    datasets: Option<PathBuf>,

    #[arg(long)]
    datasets_url: Option<String>,

    #[arg(long)]
    no_bootstrap: bool,

    /// CA bundle handed to datasets as SSL_CERT_FILE
    #[arg(long)]
    ca_bundle: Option<PathBuf>,

    /// Re-read existing archives and refetch the unreadable ones
    #[arg(long)]
    verify_existing: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<BatchError>() {
            return ExitCode::from(error.exit_code());
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    match cli.command {
        Commands::Run(args) => {
            let config = resolve(cli.config.as_deref(), run_overrides(args))?;
            run_pipeline(config, output_mode)
        }
        Commands::Accessions(args) => {
            let config = resolve(cli.config.as_deref(), input_overrides(args))?;
            run_accessions(config, output_mode)
        }
        Commands::Manifest(args) => {
            let config = resolve(cli.config.as_deref(), input_overrides(args))?;
            run_manifest(config, output_mode)
        }
        Commands::Bootstrap(args) => {
            let config = resolve(cli.config.as_deref(), tool_overrides(args))?;
            let path = datasets_path(&config);
            let action = bootstrap(&config, &path)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print(&serde_json::json!({
                    "path": path,
                    "action": action,
                }))
                .into_diagnostic(),
                OutputMode::Human => {
                    println!("{}", path.display());
                    Ok(())
                }
            }
        }
    }
}

fn resolve(path: Option<&str>, overrides: Overrides) -> miette::Result<ResolvedConfig> {
    Ok(ConfigLoader::resolve(path, overrides)?)
}

fn run_overrides(args: RunArgs) -> Overrides {
    Overrides {
        input: args.input.input,
        delimiter: args.input.delimiter,
        workdir: args.input.workdir,
        jobs: args.jobs,
        include: args.include,
        datasets_bin: args.datasets,
        datasets_url: args.datasets_url,
        ca_bundle: args.ca_bundle,
        verify_existing: args.verify_existing,
        no_bootstrap: args.no_bootstrap,
    }
}

fn input_overrides(args: InputArgs) -> Overrides {
    Overrides {
        input: args.input,
        delimiter: args.delimiter,
        workdir: args.workdir,
        ..Overrides::default()
    }
}

fn tool_overrides(args: ToolArgs) -> Overrides {
    Overrides {
        datasets_bin: args.datasets,
        datasets_url: args.datasets_url,
        workdir: args.workdir,
        no_bootstrap: args.no_bootstrap,
        ..Overrides::default()
    }
}

fn run_options(config: &ResolvedConfig) -> RunOptions {
    RunOptions {
        input: config.input.clone(),
        delimiter: config.delimiter,
        jobs: config.jobs,
        include: config.include.clone(),
        verify_existing: config.verify_existing,
    }
}

fn datasets_path(config: &ResolvedConfig) -> PathBuf {
    config.datasets_bin.clone().unwrap_or_else(|| {
        Layout::new(config.workdir.clone())
            .default_datasets_bin()
            .into_std_path_buf()
    })
}

fn bootstrap(config: &ResolvedConfig, path: &Path) -> Result<BootstrapAction, BatchError> {
    if !config.bootstrap {
        if path.exists() {
            return Ok(BootstrapAction::AlreadyPresent);
        }
        return Err(BatchError::MissingTool(path.display().to_string()));
    }
    ensure_datasets_binary(path, &config.datasets_url)
}

fn run_pipeline(config: ResolvedConfig, output_mode: OutputMode) -> miette::Result<()> {
    let path = datasets_path(&config);
    bootstrap(&config, &path)?;

    let client = SystemDatasetsClient::new(path).with_ca_bundle(config.ca_bundle.clone());
    if let Some(version) = client.version() {
        info!(%version, program = %client.program().display(), "using datasets");
    }

    let pipeline = Pipeline::new(Layout::new(config.workdir.clone()), client);
    let report = pipeline.run(&run_options(&config), &TracingSink)?;

    match output_mode {
        OutputMode::Json => JsonOutput::print(&report).into_diagnostic(),
        OutputMode::Human => {
            print_run_summary(&report);
            Ok(())
        }
    }
}

fn run_accessions(config: ResolvedConfig, output_mode: OutputMode) -> miette::Result<()> {
    let pipeline = Pipeline::new(
        Layout::new(config.workdir.clone()),
        SystemDatasetsClient::new(datasets_path(&config)),
    );
    let accessions = pipeline.prepare_accessions(&run_options(&config), &TracingSink)?;

    match output_mode {
        OutputMode::Json => JsonOutput::print(&accessions).into_diagnostic(),
        OutputMode::Human => {
            for acc in &accessions {
                println!("{acc}");
            }
            Ok(())
        }
    }
}

fn run_manifest(config: ResolvedConfig, output_mode: OutputMode) -> miette::Result<()> {
    let pipeline = Pipeline::new(
        Layout::new(config.workdir.clone()),
        SystemDatasetsClient::new(datasets_path(&config)),
    );
    let report = pipeline.rebuild_manifest(&run_options(&config), &TracingSink)?;

    match output_mode {
        OutputMode::Json => JsonOutput::print(&report).into_diagnostic(),
        OutputMode::Human => {
            println!("{} ({} rows)", report.manifest, report.accessions);
            Ok(())
        }
    }
}
