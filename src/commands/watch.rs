//! # Watch Command Implementation
//!
//! Polls the remotes of the configured layers and, whenever a watched branch
//! moves, prints the collection pinned to the commits just observed. Pins
//! can also be written to a directory as `pin-<hash>.yaml`, which a CI job
//! can pick up and feed back to `hopper fetch --config`.
//!
//! The first poll only records the remote state unless `--trigger` is given.

use anyhow::{Context, Result};
use clap::Args;
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use hopper::defaults::DEFAULT_WATCH_INTERVAL;
use hopper::output::{Marker, OutputConfig};
use hopper::process::{ProcessRunner, SystemRunner};
use hopper::watcher::{PinnedSnapshot, RemoteWatcher, WatcherCore};

use super::LayerArgs;

/// Poll the layers' remotes and print a pinned collection on change
#[derive(Args, Debug, Clone, Default)]
pub struct WatchArgs {
    #[command(flatten)]
    pub layers: LayerArgs,

    /// Seconds between polls.
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_WATCH_INTERVAL)]
    pub interval: u64,

    /// Poll once, emit a pin for every watched collection, and exit.
    #[arg(long)]
    pub once: bool,

    /// Emit a pin from the first poll even if nothing has moved.
    #[arg(long)]
    pub trigger: bool,

    /// Also write each pin to this directory.
    #[arg(long, value_name = "DIR")]
    pub pin_dir: Option<PathBuf>,
}

/// Execute the `watch` command.
pub fn execute(args: WatchArgs, output: &OutputConfig) -> Result<()> {
    let file = super::load_layer_file(&args.layers)?;
    let runner: Arc<dyn ProcessRunner> = Arc::new(SystemRunner);
    let collection = super::load_collection(&args.layers, &file, runner.as_ref())?;

    let mut core = WatcherCore::new();
    core.add_layers(collection);
    if core.remotes().is_empty() {
        anyhow::bail!("None of the configured layers has a git remote to watch");
    }

    if args.once {
        for snapshot in core.poll(runner.as_ref(), true)? {
            emit(&snapshot, args.pin_dir.as_deref())?;
        }
        return Ok(());
    }

    output.status(
        Marker::Watch,
        format_args!(
            "Watching {} remotes every {}s",
            core.remotes().len(),
            args.interval
        ),
    );
    let watcher = RemoteWatcher::spawn(core, runner, Duration::from_secs(args.interval.max(1)))?;
    if args.trigger {
        watcher.trigger();
    }

    while let Some(snapshot) = watcher.next() {
        emit(&snapshot, args.pin_dir.as_deref())?;
    }
    Ok(())
}

/// Print a pin document and optionally store it as `pin-<hash>.yaml`.
fn emit(snapshot: &PinnedSnapshot, pin_dir: Option<&Path>) -> Result<()> {
    let document = snapshot.document();
    let yaml = serde_yaml::to_string(&document)?;
    println!("---\n{}", yaml.trim_end());

    if let Some(dir) = pin_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create pin directory {}", dir.display()))?;
        let path = dir.join(format!("pin-{}.yaml", document.hash));
        fs::write(&path, yaml).with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Pinned {} -> {}", document.original_hash, path.display());
    }
    Ok(())
}
