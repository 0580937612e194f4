//! Command line front end for the conveyer.
//!
//! Reads lines from stdin, pushes them through a decorator, a separator and a multiplexer, and
//! prints every value that reaches the output channel. Ctrl-C stops the run.

use std::process::ExitCode;

use clap::Parser;
use conveyer_telemetry::tracing::init_tracing;

use crate::config::load_cli_config;
use crate::error::{CliError, CliResult};

mod config;
mod error;
mod topology;

/// Push stdin lines through a decorator, separator and multiplexer conveyer.
#[derive(Debug, Parser)]
#[command(name = "conveyer", version)]
struct Args {
    /// Capacity of every channel, overriding the configured value.
    #[arg(long)]
    buffer_size: Option<usize>,
    /// Number of channels the separator fans out to, overriding the configured value.
    #[arg(long)]
    outputs: Option<usize>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprint!("{}", err.render_report());
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> CliResult<()> {
    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME")).map_err(CliError::config)?;

    let config = load_cli_config(args.buffer_size, args.outputs)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(topology::run(config))
}
