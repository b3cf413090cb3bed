use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tabmeta::config::{ConfigLoader, ResolvedConfig};
use tabmeta::driver::{ImportDriver, ImportOptions};
use tabmeta::error::TabmetaError;
use tabmeta::mapping::KeyMap;
use tabmeta::platform::HttpPlatformClient;
use tabmeta::table::Table;

#[derive(Parser)]
#[command(name = "tabmeta")]
#[command(about = "Imports tabular metadata into a research-data platform hierarchy")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Match rows to containers and merge their metadata")]
    Import(ImportArgs),
}

#[derive(Args)]
struct ImportArgs {
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    input: Option<String>,

    #[arg(long)]
    output: Option<String>,

    #[arg(long)]
    destination: Option<String>,

    #[arg(long)]
    base_url: Option<String>,

    #[arg(long)]
    dry_run: bool,

    #[arg(long)]
    overwrite: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<TabmetaError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &TabmetaError) -> u8 {
    match error {
        TabmetaError::MissingConfig
        | TabmetaError::ConfigRead(_)
        | TabmetaError::ConfigParse(_)
        | TabmetaError::KeyMapParse(_)
        | TabmetaError::InvalidLevel(_)
        | TabmetaError::MissingColumn(_) => 2,
        TabmetaError::PlatformHttp(_)
        | TabmetaError::PlatformStatus { .. }
        | TabmetaError::ContainerNotFound(_) => 3,
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
    match cli.command {
        Commands::Import(args) => run_import(args),
    }
}

fn run_import(args: ImportArgs) -> miette::Result<()> {
    let mut config = ConfigLoader::resolve(args.config.as_deref()).into_diagnostic()?;
    apply_overrides(&mut config, &args);

    let key_map = match &config.key_map {
        Some(path) => KeyMap::load(path).into_diagnostic()?,
        None => KeyMap::default(),
    };

    let mut table =
        Table::load(&config.input, config.first_row, config.delimiter).into_diagnostic()?;
    info!(input = %config.input, rows = table.rows.len(), "loaded input table");

    let client = HttpPlatformClient::new(&config.base_url).into_diagnostic()?;
    let destination = client.get_container(&config.destination).into_diagnostic()?;

    let options = ImportOptions {
        mapping_column: config.mapping_column.clone(),
        metadata_destination: config.metadata_destination.clone(),
        overwrite: config.overwrite,
        dry_run: config.dry_run,
        attached_files: config.attached_files,
    };
    let driver = ImportDriver::new(&client, options, key_map);

    let candidates = driver
        .gather_candidates(&destination, config.object_type)
        .into_diagnostic()?;
    let summary = driver.import(&mut table, &candidates).into_diagnostic()?;

    table.write(&config.output, config.delimiter).into_diagnostic()?;
    info!(output = %config.output, "wrote status report");

    println!(
        "{}",
        serde_json::to_string_pretty(&summary).into_diagnostic()?
    );
    Ok(())
}

fn apply_overrides(config: &mut ResolvedConfig, args: &ImportArgs) {
    if let Some(input) = &args.input {
        config.input = input.as_str().into();
    }
    if let Some(output) = &args.output {
        config.output = output.as_str().into();
    }
    if let Some(destination) = &args.destination {
        config.destination = destination.clone();
    }
    if let Some(base_url) = &args.base_url {
        config.base_url = base_url.clone();
    }
    if args.dry_run {
        config.dry_run = true;
    }
    if args.overwrite {
        config.overwrite = true;
    }
}
