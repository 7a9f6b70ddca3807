//! Entry point for the `replset-agent` CLI.
//!
//! Parses arguments, installs the tracing subscriber, loads the agent
//! config, dispatches to the command handler, and maps errors to exit codes.

use replset_agent::cli::Cli;
use replset_agent::config::Config;
use replset_agent::{commands, exit_codes};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_tracing(cli.verbose);

    let result =
        Config::load(&cli.config).and_then(|config| commands::dispatch(&config, cli.command));

    match result {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(err) => {
            // Print user-actionable error message to stderr
            eprintln!("Error: {}", err);
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

/// `RUST_LOG` wins when set; otherwise info, or debug with `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "replset_agent=debug"
    } else {
        "replset_agent=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
