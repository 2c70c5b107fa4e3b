use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use geostage::config::ConfigLoader;
use geostage::domain::UploadCandidate;
use geostage::error::StageError;
use geostage::inspect::SignatureInspector;
use geostage::output::{JsonOutput, OutputMode, StderrProgress};
use geostage::pipeline::{Pipeline, ProgressSink, ValidationResult};
use geostage::staging::StagingDirectory;

const EXIT_REJECTED: u8 = 3;

#[derive(Parser)]
#[command(name = "geostage")]
#[command(about = "Flatten and validate geospatial uploads into a staging directory")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Stage and validate files and zip archives")]
    Validate(ValidateArgs),
}

#[derive(Args)]
struct ValidateArgs {
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Staging directory; must be absent or empty. Defaults to a temp dir.
    #[arg(long)]
    staging: Option<Utf8PathBuf>,

    #[arg(long)]
    config: Option<String>,

    /// Keep the temporary staging directory after the run.
    #[arg(long)]
    keep: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(error) = report.downcast_ref::<StageError>() {
                return ExitCode::from(map_exit_code(error));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &StageError) -> u8 {
    match error {
        StageError::ConfigRead(_)
        | StageError::ConfigParse(_)
        | StageError::InvalidConfig(_)
        | StageError::ArchiveOpen { .. }
        | StageError::Staging { .. } => 2,
        _ => 1,
    }
}

fn run() -> miette::Result<ExitCode> {
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

    match cli.command {
        Commands::Validate(args) => run_validate(args, output_mode),
    }
}

fn run_validate(args: ValidateArgs, output_mode: OutputMode) -> miette::Result<ExitCode> {
    let config = ConfigLoader::resolve(args.config.as_deref())?;
    let candidates = args
        .files
        .iter()
        .map(|path| UploadCandidate::from_path(path))
        .collect::<Result<Vec<_>, StageError>>()?;

    let mut staging = match &args.staging {
        Some(root) => StagingDirectory::create(root)?,
        None => StagingDirectory::temporary()?,
    };

    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Human => &StderrProgress,
    };
    let pipeline = Pipeline::new(config, SignatureInspector);
    let result = pipeline.run(candidates, &mut staging, sink)?;

    match output_mode {
        OutputMode::Json => JsonOutput::print_result(&result).into_diagnostic()?,
        OutputMode::Human => print_summary(&result),
    }

    if args.staging.is_none() {
        if args.keep {
            let kept = staging.persist();
            if matches!(output_mode, OutputMode::Human) {
                println!("staging kept at {kept}");
            }
        } else {
            staging.cleanup()?;
        }
    }

    if result.errors.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_REJECTED))
    }
}

fn print_summary(result: &ValidationResult) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    println!("{cyan}geostage summary ({}){reset}", result.staging_dir);
    println!("{green}accepted: {}{reset}", result.accepted.len());
    for file in &result.accepted {
        println!(
            "{green}  {} ({} bytes, from {}){reset}",
            file.staged_name,
            file.byte_length,
            file.source_chain.join(" > ")
        );
    }
    println!("{yellow}errors: {}{reset}", result.errors.len());
    for error in &result.errors {
        println!("{yellow}  [{}] {}{reset}", error.field, error.message());
    }
}
