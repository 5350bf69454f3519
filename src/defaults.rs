//! Default values for hopper configuration.
//!
//! This module provides centralized default values used across commands,
//! ensuring consistency and avoiding duplication.

use std::env;
use std::path::PathBuf;

/// Ref used for layers that name no revision of their own.
pub const DEFAULT_VERSION: &str = "master";

/// Layer file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "hopper.yaml";

/// Layer index branch queried when refreshing the index cache.
pub const DEFAULT_INDEX_BRANCH: &str = "master";

/// Seconds between watcher polls.
pub const DEFAULT_WATCH_INTERVAL: u64 = 30;

/// Returns the default path of the on-disk layer index cache.
///
/// Uses the platform-appropriate cache directory:
/// - Linux: `~/.cache/hopper/layer-index.yaml` (XDG Base Directory)
/// - macOS: `~/Library/Caches/hopper/layer-index.yaml`
/// - Windows: `{FOLDERID_LocalAppData}\hopper\layer-index.yaml`
///
/// Falls back to `.hopper-cache` in the current directory if the platform
/// cache directory cannot be determined.
///
/// This can be overridden by the `HOPPER_INDEX_CACHE` environment variable.
pub fn default_index_cache_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".hopper-cache"))
        .join("hopper")
        .join("layer-index.yaml")
}

/// Returns the default worker count for parallel fetches.
///
/// `LSB_DJOB_NUMPROC` (set by batch schedulers) wins when it holds a
/// positive number; otherwise half of the available CPUs, at least one.
pub fn default_thread_count() -> usize {
    if let Some(n) = env::var("LSB_DJOB_NUMPROC")
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
    {
        return n;
    }

    std::thread::available_parallelism()
        .map(|n| n.get() / 2)
        .unwrap_or(1)
        .max(1)
}
