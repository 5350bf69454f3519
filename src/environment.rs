//! Where hopper keeps things on disk.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::defaults;
use crate::error::Result;

/// Working paths and limits shared by every fetch.
///
/// ```text
/// <work>/
///   repos/<clone-name>/     one working clone per remote
/// <mirror>/
///   repo-mirror/<name>.git  optional object store borrowed by clones
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    working_path: PathBuf,
    mirror_path: Option<PathBuf>,
    local_layers: Option<PathBuf>,
    threads: usize,
}

impl Environment {
    pub fn new(working_path: impl Into<PathBuf>) -> Self {
        Self {
            working_path: working_path.into(),
            mirror_path: None,
            local_layers: None,
            threads: defaults::default_thread_count(),
        }
    }

    /// Like [`Environment::new`], taking the mirror and local-layer
    /// directories from `HOPPER_MIRROR` and `HOPPER_LOCAL`.
    pub fn from_env(working_path: impl Into<PathBuf>) -> Self {
        let mut environment = Self::new(working_path);
        environment.mirror_path = env::var_os("HOPPER_MIRROR")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        environment.local_layers = env::var_os("HOPPER_LOCAL")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        environment
    }

    pub fn with_mirror(mut self, mirror: Option<PathBuf>) -> Self {
        if mirror.is_some() {
            self.mirror_path = mirror;
        }
        self
    }

    pub fn with_local_layers(mut self, local: Option<PathBuf>) -> Self {
        if local.is_some() {
            self.local_layers = local;
        }
        self
    }

    pub fn with_threads(mut self, threads: Option<usize>) -> Self {
        if let Some(threads) = threads {
            self.threads = threads.max(1);
        }
        self
    }

    pub fn working_path(&self) -> &Path {
        &self.working_path
    }

    /// Directory holding one working clone per remote.
    pub fn sources_path(&self) -> PathBuf {
        self.working_path.join("repos")
    }

    pub fn mirror_path(&self) -> Option<&Path> {
        self.mirror_path.as_deref()
    }

    /// Object store clones borrow from, `<mirror>/repo-mirror`.
    pub fn source_mirror(&self) -> Option<PathBuf> {
        self.mirror_path.as_ref().map(|m| m.join("repo-mirror"))
    }

    /// Directory searched for `local` layers that give no explicit path.
    pub fn local_layers_path(&self) -> Option<&Path> {
        self.local_layers.as_deref()
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Create the working and sources directories.
    pub fn prepare(&self) -> Result<()> {
        if !self.working_path.exists() {
            info!("Preparing environment at '{}'", self.working_path.display());
            fs::create_dir_all(&self.working_path)?;
        }
        let sources = self.sources_path();
        if !sources.exists() {
            debug!("creating repo directory {}", sources.display());
            fs::create_dir_all(&sources)?;
        }
        Ok(())
    }
}
