//! Lumber CLI binary entrypoint.
//!
//! This is the main entry point for the `lumber` command-line tool.

use std::io;
use std::process::ExitCode;

use clap::Parser;

use lumber_cli::cli::{Cli, Commands};
use lumber_cli::commands::{GenerateCommand, ViewCommand};
use lumber_cli::diagnostics;

fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing
    let diagnostics_sink = match diagnostics::init(cli.log_file.as_deref(), cli.log_level) {
        Ok(sink) => sink,
        Err(e) => {
            eprintln!("Failed to set up diagnostics: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let code = match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    };

    if let Some(sink) = diagnostics_sink {
        sink.finalize();
    }
    code
}

async fn run(cli: Cli) -> Result<(), lumber_cli::CliError> {
    let mut stdout = io::stdout().lock();

    match cli.command {
        Commands::View(args) => {
            let cmd = ViewCommand::new(&args);
            let stop = async {
                if tokio::signal::ctrl_c().await.is_err() {
                    std::future::pending::<()>().await;
                }
            };
            cmd.execute(&mut stdout, stop).await?;
        }
        Commands::Gen(args) => {
            let cmd = GenerateCommand::new(&args);
            cmd.execute(&mut stdout)?;
        }
    }

    Ok(())
}
