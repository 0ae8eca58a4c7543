//! Main entry point for the packr CLI app

use std::error::Error;

use packr::bundle::Packer;
use packr::cli;
use tracing_subscriber::EnvFilter;

fn main() -> std::process::ExitCode {
    let args = cli::parse();
    init_tracing(args.verbose);

    if let Err(e) = run_app(args) {
        eprintln!("Error: {}", e);
        if !e.is_validation() {
            let mut source = e.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {}", cause);
                source = cause.source();
            }
        }
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run_app(args: cli::Args) -> packr::Result<()> {
    let config = args.load_config()?;
    Packer::new().pack(&config)?;
    println!("Done!");
    Ok(())
}
