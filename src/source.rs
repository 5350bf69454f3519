//! Source descriptors: where a layer's content comes from.

use std::fmt;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::environment::Environment;
use crate::git;

/// A git remote and the ref to check out.
///
/// Either half may be unknown while a layer is being resolved: the remote is
/// filled in from a layer index and a missing ref falls back to the
/// collection's default version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitSource {
    pub remote: Option<String>,
    #[serde(rename = "ref")]
    pub r#ref: Option<String>,
}

impl GitSource {
    pub fn new(remote: Option<String>, r#ref: Option<String>) -> Self {
        Self { remote, r#ref }
    }

    pub fn can_fetch(&self) -> bool {
        self.remote.is_some()
    }

    /// Clone identity of the remote.
    pub fn clone_name(&self) -> Option<String> {
        self.remote
            .as_deref()
            .map(git::clone_name)
            .filter(|name| git::is_valid_clone_name(name))
    }

    /// `<work>/repos/<clone-name>`.
    pub fn resolve_path(&self, env: &Environment) -> Option<PathBuf> {
        self.clone_name().map(|name| env.sources_path().join(name))
    }

    /// `ref@remote`, the string a layer's identity hash is built from.
    pub fn rev_string(&self) -> String {
        format!(
            "{}@{}",
            self.r#ref.as_deref().unwrap_or(""),
            self.remote.as_deref().unwrap_or("")
        )
    }
}

/// A layer that lives on the local filesystem and is never fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSource {
    pub name: String,
    pub path: Option<PathBuf>,
}

impl LocalSource {
    pub fn new(name: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path,
        }
    }

    /// The explicit path, or `<name>` / `<name>.git` inside the local-layer
    /// directory.
    pub fn resolve_path(&self, env: &Environment) -> Option<PathBuf> {
        if let Some(path) = &self.path {
            return Some(path.clone());
        }

        let local = env.local_layers_path()?;
        let valid = [self.name.clone(), format!("{}.git", self.name)];
        fs::read_dir(local)
            .ok()?
            .filter_map(|entry| entry.ok())
            .find(|entry| {
                valid
                    .iter()
                    .any(|name| entry.file_name().to_str() == Some(name.as_str()))
            })
            .map(|entry| entry.path())
    }
}

/// Where a layer's content comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceDescriptor {
    Git(GitSource),
    Local(LocalSource),
}

impl SourceDescriptor {
    pub fn git(remote: Option<&str>, r#ref: Option<&str>) -> Self {
        SourceDescriptor::Git(GitSource::new(
            remote.map(str::to_string),
            r#ref.map(str::to_string),
        ))
    }

    pub fn local(name: &str, path: Option<PathBuf>) -> Self {
        SourceDescriptor::Local(LocalSource::new(name, path))
    }

    /// Local sources are always usable; git sources need a remote.
    pub fn can_fetch(&self) -> bool {
        match self {
            SourceDescriptor::Git(git) => git.can_fetch(),
            SourceDescriptor::Local(_) => true,
        }
    }

    pub fn as_git(&self) -> Option<&GitSource> {
        match self {
            SourceDescriptor::Git(git) => Some(git),
            SourceDescriptor::Local(_) => None,
        }
    }

    pub fn resolve_path(&self, env: &Environment) -> Option<PathBuf> {
        match self {
            SourceDescriptor::Git(git) => git.resolve_path(env),
            SourceDescriptor::Local(local) => local.resolve_path(env),
        }
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDescriptor::Git(git) => write!(
                f,
                "git {}@{}",
                git.r#ref.as_deref().unwrap_or("<default>"),
                git.remote.as_deref().unwrap_or("<unknown>")
            ),
            SourceDescriptor::Local(local) => match &local.path {
                Some(path) => write!(f, "local {}@{}", local.name, path.display()),
                None => write!(f, "local {}", local.name),
            },
        }
    }
}
