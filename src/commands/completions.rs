//! # Completions Command Implementation
//!
//! Prints a completion script for `hopper` to stdout, or with `--dir` writes
//! it under the shell's conventional file name (`hopper.bash`, `_hopper`,
//! `hopper.fish`, ...):
//!
//! ```bash
//! hopper completions bash > ~/.local/share/bash-completion/completions/hopper
//! hopper completions zsh --dir ~/.zfunc
//! ```

use anyhow::{Context, Result};
use clap::{Args, CommandFactory};
use clap_complete::{generate, generate_to, Shell};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::cli::Cli;

const BIN_NAME: &str = "hopper";

/// Generate shell completion scripts
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// The shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,

    /// Write the script into this directory instead of stdout
    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,
}

/// Execute the `completions` command.
pub fn execute(args: CompletionsArgs) -> Result<()> {
    match &args.dir {
        Some(dir) => {
            let path = install_completions(args.shell, dir)?;
            eprintln!("Wrote {}", path.display());
        }
        None => write_completions(args.shell, &mut io::stdout()),
    }
    Ok(())
}

fn write_completions(shell: Shell, out: &mut dyn Write) {
    generate(shell, &mut Cli::command(), BIN_NAME, out);
}

fn install_completions(shell: Shell, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    generate_to(shell, &mut Cli::command(), BIN_NAME, dir)
        .with_context(|| format!("Failed to write {} completions to {}", shell, dir.display()))
}
