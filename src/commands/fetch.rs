//! # Fetch Command Implementation
//!
//! Resolves the configured layers, checks that layers sharing a clone agree
//! on their ref, and reconciles every clone in parallel. On success the
//! source directory of each layer is printed, one per line, ready to be
//! dropped into a `bblayers.conf`.

use anyhow::Result;
use clap::Args;
use log::warn;
use std::time::Instant;

use hopper::fetch::FetchOrchestrator;
use hopper::output::{Marker, OutputConfig};
use hopper::process::SystemRunner;
use hopper::reconcile::ReconcileOptions;

use super::{EnvArgs, LayerArgs};

/// Resolve the configured layers and bring every clone to its ref
#[derive(Args, Debug, Clone, Default)]
pub struct FetchArgs {
    #[command(flatten)]
    pub layers: LayerArgs,

    #[command(flatten)]
    pub env: EnvArgs,

    /// Update each existing clone's remote before resolving its ref.
    #[arg(short = 'b', long)]
    pub remote_bleeding: bool,

    /// Allow removing non-repository content found where a clone should go.
    #[arg(long)]
    pub clobber: bool,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,
}

/// Execute the `fetch` command.
pub fn execute(args: FetchArgs, output: &OutputConfig) -> Result<()> {
    let start_time = Instant::now();
    let runner = SystemRunner;

    let file = super::load_layer_file(&args.layers)?;
    let collection = super::load_collection(&args.layers, &file, &runner)?;
    let env = super::environment(&args.env, &file)?;

    let options = ReconcileOptions {
        mirror: env.source_mirror(),
        force_update: args.remote_bleeding,
        allow_overwrite: args.clobber,
    };

    let output = output.clone().quiet(args.quiet);
    let spinner = output.spinner(format!("Fetching {} layers", collection.len()));

    let result = FetchOrchestrator::new(&runner, options).fetch(&collection, &env);
    spinner.finish_and_clear();

    let reports = match result {
        Ok(reports) => reports,
        Err(e) => {
            output.status(Marker::Fail, "Fetch failed");
            return Err(e.into());
        }
    };

    let cloned = reports.iter().filter(|r| r.cloned).count();
    let moved = reports.iter().filter(|r| r.checked_out).count();
    output.status(
        Marker::Ok,
        format_args!(
            "{} repositories ready in {:.2}s ({} cloned, {} checked out)",
            reports.len(),
            start_time.elapsed().as_secs_f64(),
            cloned,
            moved
        ),
    );

    for layer in &collection {
        match layer.source_path(&env) {
            Some(path) => println!("{}", path.display()),
            None => warn!("No source directory found for layer '{}'", layer.full_name()),
        }
    }

    Ok(())
}
