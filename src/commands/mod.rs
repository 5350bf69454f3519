//! # CLI Command Implementations
//!
//! This module contains the implementation for each subcommand of the `hopper`
//! command-line tool. Each subcommand is defined in its own file to keep the
//! logic separated and maintainable.
//!
//! ## Structure
//!
//! Each command module typically contains:
//! - An `Args` struct that defines the command-specific arguments and options,
//!   derived using `clap`.
//! - An `execute` function that takes the parsed `Args` and performs the
//!   command's logic.
//!
//! Commands that work on a layer collection share [`LayerArgs`] (where the
//! layers come from) and [`EnvArgs`] (where clones go), flattened into their
//! own argument structs.

pub mod completions;
pub mod fetch;
pub mod index;
pub mod layers;
pub mod watch;

use anyhow::{anyhow, Context, Result};
use clap::Args;
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hopper::config::{self, LayerFile};
use hopper::defaults::{default_index_cache_path, DEFAULT_CONFIG_FILE, DEFAULT_INDEX_BRANCH, DEFAULT_VERSION};
use hopper::environment::Environment;
use hopper::index::{HttpIndexFetcher, LayerIndex};
use hopper::layers::LayerCollection;
use hopper::process::ProcessRunner;

/// Where the layer collection comes from.
#[derive(Args, Debug, Clone, Default)]
pub struct LayerArgs {
    /// Layer file to read. `hopper.yaml` is used when present.
    #[arg(short, long, value_name = "FILE", env = "HOPPER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Extra layer, as KEY[=REF][@PATH] (e.g. meta-oe/meta-networking=daisy).
    #[arg(short = 'l', long = "layer", value_name = "SPEC")]
    pub layers: Vec<String>,

    /// Ref for layers that name none (defaults to the file's version, then master).
    #[arg(short = 'v', long = "version", value_name = "REF")]
    pub version: Option<String>,

    /// Read the layer index from this YAML file instead of the cache.
    #[arg(long, value_name = "FILE", conflicts_with = "refresh_index")]
    pub index: Option<PathBuf>,

    /// Download the layer index before resolving.
    #[arg(long)]
    pub refresh_index: bool,

    /// Location of the layer index cache.
    #[arg(long, value_name = "FILE", env = "HOPPER_INDEX_CACHE")]
    pub index_cache: Option<PathBuf>,
}

/// Where clones and local layers live.
#[derive(Args, Debug, Clone, Default)]
pub struct EnvArgs {
    /// Working directory; clones are made under `<DIR>/repos`.
    #[arg(long, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Object-store mirror root; clones borrow from `<DIR>/repo-mirror`.
    #[arg(long, value_name = "DIR")]
    pub mirror: Option<PathBuf>,

    /// Directory searched for `local` layers without an explicit path.
    #[arg(long, value_name = "DIR")]
    pub local_layers: Option<PathBuf>,

    /// Maximum clones reconciled at once.
    #[arg(long, value_name = "NUM")]
    pub threads: Option<usize>,
}

/// Read the layer file named by `args`, or the default one if it exists.
pub fn load_layer_file(args: &LayerArgs) -> Result<LayerFile> {
    let path = match &args.config {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Configuration file not found: {}", path.display());
            }
            path.clone()
        }
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !default.exists() {
                debug!("no {} found, using command-line layers only", DEFAULT_CONFIG_FILE);
                return Ok(LayerFile::default());
            }
            default
        }
    };

    config::load(&path).with_context(|| format!("Failed to load config from {}", path.display()))
}

/// The layer index to resolve against.
///
/// `--index` wins; `--refresh-index` downloads and caches a fresh copy;
/// otherwise the cache is used if it exists, and the built-in tables alone
/// if it does not.
pub fn load_index(args: &LayerArgs, runner: &dyn ProcessRunner) -> Result<LayerIndex> {
    if let Some(path) = &args.index {
        return LayerIndex::load(path)
            .with_context(|| format!("Failed to read layer index {}", path.display()));
    }

    let cache = args
        .index_cache
        .clone()
        .unwrap_or_else(default_index_cache_path);
    if args.refresh_index {
        return refresh_index(runner, &cache, DEFAULT_INDEX_BRANCH);
    }

    if cache.exists() {
        debug!("reading layer index cache {}", cache.display());
        return LayerIndex::load(&cache)
            .with_context(|| format!("Failed to read layer index cache {}", cache.display()));
    }

    info!("No layer index cache; run `hopper index update` to download one");
    Ok(LayerIndex::new())
}

/// Download the index for `branch` and store it at `cache`. A failed
/// download leaves the previous cache in place.
pub fn refresh_index(runner: &dyn ProcessRunner, cache: &Path, branch: &str) -> Result<LayerIndex> {
    let index = LayerIndex::fetch(&HttpIndexFetcher::new(runner), branch);
    if index.is_empty() {
        return Ok(index);
    }
    index
        .save(cache)
        .with_context(|| format!("Failed to write layer index cache {}", cache.display()))?;
    Ok(index)
}

/// Resolve and validate the collection described by the layer file and the
/// `--layer` specifiers.
pub fn load_collection(
    args: &LayerArgs,
    file: &LayerFile,
    runner: &dyn ProcessRunner,
) -> Result<LayerCollection> {
    let version = args
        .version
        .as_deref()
        .or(file.version.as_deref())
        .unwrap_or(DEFAULT_VERSION);

    let mut collection = LayerCollection::new(Some(version));
    collection.add_index(Arc::new(load_index(args, runner)?));

    let specifiers = args
        .layers
        .iter()
        .map(|s| config::parse_layer_specifier(s))
        .collect::<hopper::error::Result<Vec<_>>>()?;

    collection.parse(&file.layers)?;
    collection.parse(&specifiers)?;
    if collection.is_empty() {
        return Err(anyhow!(
            "No layers given; add them to {} or pass --layer",
            DEFAULT_CONFIG_FILE
        ));
    }

    collection.validate()?;
    Ok(collection)
}

/// Build the environment from flags, then the layer file, then
/// `HOPPER_MIRROR` / `HOPPER_LOCAL`. A relative work directory is taken
/// from the current directory.
pub fn environment(args: &EnvArgs, file: &LayerFile) -> Result<Environment> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let work_dir = match &args.work_dir {
        Some(dir) => cwd.join(dir),
        None => cwd,
    };

    Ok(Environment::from_env(work_dir)
        .with_mirror(file.mirror.clone())
        .with_mirror(args.mirror.clone())
        .with_local_layers(file.local_layers.clone())
        .with_local_layers(args.local_layers.clone())
        .with_threads(file.threads)
        .with_threads(args.threads))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hopper::index::IndexEntry;
    use hopper::process::SystemRunner;
    use tempfile::TempDir;

    fn write_index(dir: &Path) -> PathBuf {
        let index = LayerIndex::from_entries(vec![IndexEntry::new(
            "meta-networking",
            "git://git.openembedded.org/meta-openembedded",
            Some("meta-networking"),
        )])
        .unwrap();
        let path = dir.join("index.yaml");
        index.save(&path).unwrap();
        path
    }

    #[test]
    fn test_missing_config_is_reported() {
        let args = LayerArgs {
            config: Some(PathBuf::from("/nonexistent/hopper.yaml")),
            ..Default::default()
        };
        let err = load_layer_file(&args).unwrap_err();
        assert!(err.to_string().contains("Configuration file not found"));
    }

    #[test]
    fn test_collection_from_specifiers_and_index() {
        let temp = TempDir::new().unwrap();
        let args = LayerArgs {
            layers: vec!["meta-oe/meta-networking=daisy".to_string()],
            index: Some(write_index(temp.path())),
            ..Default::default()
        };

        let collection = load_collection(&args, &LayerFile::default(), &SystemRunner).unwrap();
        assert_eq!(collection.len(), 2);
        let layer = collection.get("meta-networking").unwrap();
        assert_eq!(layer.subpath.as_deref(), Some("meta-networking"));
        assert_eq!(layer.git_source().unwrap().r#ref.as_deref(), Some("daisy"));
        assert!(collection.get("bitbake").is_some());
    }

    #[test]
    fn test_version_flag_overrides_file() {
        let temp = TempDir::new().unwrap();
        let file = LayerFile {
            version: Some("dunfell".to_string()),
            layers: vec![(
                "poky/meta".to_string(),
                config::LayerSpec::new(Some("git://a/poky"), None),
            )],
            ..Default::default()
        };
        let mut args = LayerArgs {
            index: Some(write_index(temp.path())),
            ..Default::default()
        };

        let collection = load_collection(&args, &file, &SystemRunner).unwrap();
        assert_eq!(collection.default_version(), Some("dunfell"));

        args.version = Some("kirkstone".to_string());
        let collection = load_collection(&args, &file, &SystemRunner).unwrap();
        assert_eq!(collection.default_version(), Some("kirkstone"));
        assert_eq!(
            collection.get("meta").unwrap().git_source().unwrap().r#ref.as_deref(),
            Some("kirkstone")
        );
    }

    #[test]
    fn test_empty_collection_is_an_error() {
        let temp = TempDir::new().unwrap();
        let args = LayerArgs {
            index: Some(write_index(temp.path())),
            ..Default::default()
        };
        assert!(load_collection(&args, &LayerFile::default(), &SystemRunner).is_err());
    }

    #[test]
    fn test_environment_flags_override_file() {
        let temp = TempDir::new().unwrap();
        let file = LayerFile {
            mirror: Some(PathBuf::from("/srv/file-mirror")),
            threads: Some(3),
            ..Default::default()
        };
        let args = EnvArgs {
            work_dir: Some(temp.path().to_path_buf()),
            mirror: Some(PathBuf::from("/srv/flag-mirror")),
            ..Default::default()
        };
        let env = environment(&args, &file).unwrap();
        assert_eq!(env.mirror_path(), Some(Path::new("/srv/flag-mirror")));
        assert_eq!(env.threads(), 3);
        assert_eq!(env.working_path(), temp.path());
    }

    #[test]
    fn test_relative_work_dir_is_made_absolute() {
        let args = EnvArgs {
            work_dir: Some(PathBuf::from("work")),
            ..Default::default()
        };
        let env = environment(&args, &LayerFile::default()).unwrap();
        let cwd = std::env::current_dir().unwrap();
        assert!(env.working_path().is_absolute());
        assert_eq!(env.working_path(), cwd.join("work"));
        assert_eq!(env.sources_path(), cwd.join("work").join("repos"));
    }
}
