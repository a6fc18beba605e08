//! acctfetch CLI: lists non-privileged accounts and joins each one with its
//! profile document.
//!
//! Results go to stdout as a JSON array. Logs and progress go to stderr.

mod commands;

use std::process::ExitCode;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
