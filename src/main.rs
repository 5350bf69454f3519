//! # hopper CLI
//!
//! This is the binary entry point for the `hopper` command-line tool.
//!
//! Its primary responsibilities are:
//! - Parsing command-line arguments using `clap`.
//! - Initialising logging and terminal output preferences.
//! - Executing the appropriate command based on the parsed arguments.
//!
//! Layer resolution, reconciliation and watching live in the `hopper`
//! library crate; the binary is a thin wrapper around it.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}
