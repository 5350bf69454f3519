//! # Index Command Implementation
//!
//! Maintains the on-disk cache of the public layer index.
//!
//! - `hopper index update [--branch B]` downloads the layer table and
//!   rewrites the cache. A failed download keeps the existing cache.
//! - `hopper index show [NAME]` prints one entry (aliases are followed), or
//!   every cached entry when no name is given.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::PathBuf;

use hopper::defaults::{default_index_cache_path, DEFAULT_INDEX_BRANCH};
use hopper::index::{IndexEntry, LayerIndex};
use hopper::output::{Marker, OutputConfig};
use hopper::process::SystemRunner;

/// Manage the cached layer index
#[derive(Args, Debug)]
pub struct IndexArgs {
    #[command(subcommand)]
    pub command: IndexCommand,

    /// Location of the layer index cache.
    #[arg(long, global = true, value_name = "FILE", env = "HOPPER_INDEX_CACHE")]
    pub index_cache: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum IndexCommand {
    /// Download the layer index and refresh the cache
    Update {
        /// Release branch whose layer table is downloaded.
        #[arg(long, default_value = DEFAULT_INDEX_BRANCH)]
        branch: String,
    },
    /// Show a cached entry, or all of them
    Show {
        /// Layer short name or alias.
        name: Option<String>,
    },
}

/// Execute the `index` command.
pub fn execute(args: IndexArgs, output: &OutputConfig) -> Result<()> {
    let cache = args.index_cache.unwrap_or_else(default_index_cache_path);

    match args.command {
        IndexCommand::Update { branch } => {
            let index = super::refresh_index(&SystemRunner, &cache, &branch)?;
            if index.is_empty() {
                anyhow::bail!("Layer index for '{}' could not be downloaded", branch);
            }
            println!(
                "{} {} layers cached in {}",
                output.marker(Marker::Ok),
                index.len(),
                cache.display()
            );
        }
        IndexCommand::Show { name } => {
            let index = if cache.exists() {
                LayerIndex::load(&cache)
                    .with_context(|| format!("Failed to read layer index cache {}", cache.display()))?
            } else {
                LayerIndex::new()
            };

            match name {
                Some(name) => {
                    let entry = index
                        .find(&name)
                        .with_context(|| format!("No layer index entry for '{}'", name))?;
                    print_entry(entry);
                }
                None => index.entries().for_each(print_entry),
            }
        }
    }
    Ok(())
}

fn print_entry(entry: &IndexEntry) {
    println!("{}", entry.shortname);
    if let Some(description) = &entry.description {
        println!("  description: {}", description);
    }
    println!("  remote:      {}", entry.remote.as_deref().unwrap_or("-"));
    if let Some(subpath) = &entry.subpath {
        println!("  subpath:     {}", subpath);
    }
}
