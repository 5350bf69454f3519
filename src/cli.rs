//! CLI argument parsing and command dispatch

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands;
use hopper::output::OutputConfig;

/// hopper - Fetch, pin and watch the source layers of an embedded Linux build
#[derive(Parser, Debug)]
#[command(name = "hopper")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve the configured layers and bring every clone to its ref
    Fetch(commands::fetch::FetchArgs),

    /// Show the resolved layer collection and its fetch plan
    Layers(commands::layers::LayersArgs),

    /// Poll the layers' remotes and print a pinned collection on change
    Watch(commands::watch::WatchArgs),

    /// Manage the cached layer index
    Index(commands::index::IndexArgs),

    /// Generate shell completion scripts
    Completions(commands::completions::CompletionsArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        init_logging(&self.log_level);
        let output = OutputConfig::from_env_and_flag(&self.color);

        match self.command {
            Commands::Fetch(args) => commands::fetch::execute(args, &output),
            Commands::Layers(args) => commands::layers::execute(args, &output),
            Commands::Watch(args) => commands::watch::execute(args, &output),
            Commands::Index(args) => commands::index::execute(args, &output),
            Commands::Completions(args) => commands::completions::execute(args),
        }
    }
}

/// Route the `log` facade to stderr. `RUST_LOG` overrides `--log-level`.
fn init_logging(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    // A second initialisation (in-process tests) is harmless.
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .try_init();
}
