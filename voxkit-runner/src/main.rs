//! Command line runner for voxkit pipeline documents

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use voxkit_core::PipelineConfig;
use voxkit_runner::{describe_catalog, run_file, summarize, RunOptions};

#[derive(Parser)]
#[command(name = "voxkit-run", about = "Preflight and run a voxkit pipeline document")]
struct Cli {
    /// Pipeline document (JSON)
    #[arg(required_unless_present = "list_filters")]
    pipeline: Option<PathBuf>,

    /// Stop after the preflight pass
    #[arg(long)]
    preflight_only: bool,

    /// Treat preflight warnings as failures
    #[arg(long)]
    halt_on_warning: bool,

    /// Write the run report as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Print the registered filters and exit
    #[arg(long)]
    list_filters: bool,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let catalog = voxkit_filters::default_catalog()?;
    if cli.list_filters {
        for line in describe_catalog(&catalog) {
            println!("{line}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let Some(pipeline_path) = cli.pipeline else {
        anyhow::bail!("a pipeline file is required");
    };
    let options = RunOptions {
        pipeline_path,
        preflight_only: cli.preflight_only,
        report_path: cli.report,
        config: PipelineConfig {
            halt_on_warning: cli.halt_on_warning,
            ..PipelineConfig::default()
        },
    };

    let (report, _registry) = run_file(&options, &catalog)?;
    print!("{}", summarize(&report));

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
