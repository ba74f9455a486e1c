use std::process::ExitCode;

use clap::CommandFactory;
use degrid::cli::{CliArgs, CliSources, parse_cli};
use degrid::error::RunError;
use degrid::run::{ExecutionPlan, RunSummary, execute};
use degrid::settings::resolve_settings;
use degrid_inpaint::Backend;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let (cli_args, cli_sources): (CliArgs, CliSources) = parse_cli();
    init_tracing(cli_args.verbose);

    if cli_args.list_backends {
        display_available_backends();
        return ExitCode::SUCCESS;
    }

    match run_cli(&cli_args, &cli_sources).await {
        Ok(Some(summary)) => {
            println!("{summary}");
            ExitCode::SUCCESS
        }
        Ok(None) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run_cli(cli: &CliArgs, sources: &CliSources) -> Result<Option<RunSummary>, RunError> {
    let resolved = resolve_settings(cli, sources)?;
    if let Some(path) = &resolved.config_path {
        tracing::debug!(config = %path.display(), "loaded configuration");
    }
    let settings = resolved.settings;

    let Some(input) = settings.input.dir.clone() else {
        usage();
        return Ok(None);
    };

    let plan = ExecutionPlan {
        settings,
        input,
        interactive: true,
    };
    execute(plan).await.map(Some)
}

/// `-v` and `-vv` win over `RUST_LOG`; otherwise `RUST_LOG` or `info`.
fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn usage() {
    let mut command = CliArgs::command();
    command.print_help().ok();
    println!();
    display_available_backends();
}

fn display_available_backends() {
    println!("available inpainting engines:");
    for backend in Backend::available() {
        println!("  {backend}");
    }
}
