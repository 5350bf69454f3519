//! Helpers for talking to the system `git` binary.
//!
//! hopper never links a git library. Every operation is a `git` sub-command
//! run through a [`ProcessRunner`](crate::process::ProcessRunner), which picks
//! up the user's SSH keys, credential helpers and `~/.gitconfig` for free.
//! This module holds the pieces that do not need a repository: clone-identity
//! derivation, argv construction, and parsers for the porcelain output of
//! the sub-commands the reconciler and watcher issue.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use url::Url;

/// Build a `git` argv from sub-command arguments.
pub fn git_argv<S: AsRef<str>>(args: &[S]) -> Vec<String> {
    std::iter::once("git".to_string())
        .chain(args.iter().map(|a| a.as_ref().to_string()))
        .collect()
}

/// Derive the clone identity of a remote URI.
///
/// This is the last non-empty path segment with any `.git` suffix removed,
/// and names the directory the remote is cloned into. Layers whose remotes
/// share a clone identity share one clone.
///
/// URIs that do not parse as URLs (scp-style `git@host:path` or plain
/// filesystem paths) fall back to splitting on `/` and `:`.
pub fn clone_name(uri: &str) -> String {
    let path = match Url::parse(uri) {
        Ok(url) if !url.cannot_be_a_base() => url.path().to_string(),
        _ => uri.to_string(),
    };

    let last = path
        .split(['/', ':', '\\'])
        .filter(|segment| !segment.is_empty())
        .next_back()
        .unwrap_or("");

    last.strip_suffix(".git").unwrap_or(last).to_string()
}

/// Whether `name` can name a directory under the clone root.
///
/// Remotes without a usable path segment (`https://example.com/`) and dot
/// segments would resolve to the clone root itself or its parent.
pub fn is_valid_clone_name(name: &str) -> bool {
    !matches!(name, "" | "." | "..")
}

/// Locate a same-named repository in a local object-store mirror.
///
/// `<mirror>/<name>.git` (a bare mirror) is preferred over `<mirror>/<name>`.
pub fn find_reference(mirror: &Path, clone_name: &str) -> Option<PathBuf> {
    [format!("{}.git", clone_name), clone_name.to_string()]
        .into_iter()
        .map(|candidate| mirror.join(candidate))
        .find(|path| path.exists())
}

/// Provide a helpful hint for common clone failures.
pub fn clone_hint(stderr: &str) -> Option<String> {
    if stderr.contains("Authentication failed")
        || stderr.contains("Permission denied")
        || stderr.contains("Could not read from remote repository")
    {
        Some(
            "Authentication failed. Make sure you have access to the repository.\n\
             For private repos, ensure you have:\n\
             - SSH key added to ssh-agent\n\
             - Git credentials configured\n\
             - Personal access token set up"
                .to_string(),
        )
    } else if stderr.contains("Could not resolve host") {
        Some("Check your network connection or proxy settings".to_string())
    } else {
        None
    }
}

/// Parse `git ls-remote` output into a `ref name -> commit sha` table.
pub fn parse_ls_remote(stdout: &str) -> BTreeMap<String, String> {
    stdout
        .lines()
        .filter_map(|line| {
            // Git ls-remote output format: <hash>\t<ref>
            let mut parts = line.split_whitespace();
            let sha = parts.next()?;
            let name = parts.next()?;
            Some((name.to_string(), sha.to_string()))
        })
        .collect()
}

/// Parse `git remote -v` output into `(name, uri)` pairs.
///
/// Only the first URI listed for each remote is kept (the fetch URL), and
/// remotes stay in the order git printed them.
pub fn parse_remotes(stdout: &str) -> Vec<(String, String)> {
    let mut remotes: Vec<(String, String)> = Vec::new();
    for line in stdout.lines() {
        let mut parts = line.split_whitespace();
        let (Some(name), Some(uri)) = (parts.next(), parts.next()) else {
            continue;
        };
        if !remotes.iter().any(|(existing, _)| existing == name) {
            remotes.push((name.to_string(), uri.to_string()));
        }
    }
    remotes
}

/// Parse `git for-each-ref --format='%(refname) %(upstream)' refs/heads`
/// into `(local branch, upstream)` pairs. Branches without an upstream are
/// reported with `None`.
pub fn parse_upstreams(stdout: &str) -> Vec<(String, Option<String>)> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let branch = parts.next()?;
            Some((branch.to_string(), parts.next().map(str::to_string)))
        })
        .collect()
}

/// A single change marker from `git status --porcelain`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Unchanged,
    Modified,
    Added,
    Deleted,
    Renamed,
    Copied,
    Updated,
    Untracked,
    Ignored,
}

impl ChangeKind {
    pub fn from_status_char(c: char) -> Self {
        match c.to_ascii_lowercase() {
            'm' => ChangeKind::Modified,
            'a' => ChangeKind::Added,
            'd' => ChangeKind::Deleted,
            'r' => ChangeKind::Renamed,
            'c' => ChangeKind::Copied,
            'u' => ChangeKind::Updated,
            '?' => ChangeKind::Untracked,
            '!' => ChangeKind::Ignored,
            _ => ChangeKind::Unchanged,
        }
    }
}

/// Parsed `git status --porcelain` output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkingTreeStatus {
    /// Paths with a change in the index.
    pub staged: BTreeMap<String, ChangeKind>,
    /// Paths with a change in the working tree.
    pub unstaged: BTreeMap<String, ChangeKind>,
    pub untracked: Vec<String>,
}

impl WorkingTreeStatus {
    pub fn parse(stdout: &str) -> Self {
        let mut status = WorkingTreeStatus::default();
        for line in stdout.lines() {
            let mut chars = line.chars();
            let (Some(index), Some(worktree)) = (chars.next(), chars.next()) else {
                continue;
            };
            let path = line.get(3..).unwrap_or("").to_string();
            let index = ChangeKind::from_status_char(index);
            let worktree = ChangeKind::from_status_char(worktree);

            if index == ChangeKind::Untracked || worktree == ChangeKind::Untracked {
                status.untracked.push(path);
                continue;
            }
            if index != ChangeKind::Unchanged {
                status.staged.insert(path.clone(), index);
            }
            if worktree != ChangeKind::Unchanged {
                status.unstaged.insert(path, worktree);
            }
        }
        status
    }

    /// Dirty means any staged or unstaged change, and, when `untracked` is
    /// set, any untracked file.
    pub fn is_dirty(&self, untracked: bool) -> bool {
        !self.staged.is_empty()
            || !self.unstaged.is_empty()
            || (untracked && !self.untracked.is_empty())
    }

    /// Number of distinct paths with any change.
    pub fn change_count(&self) -> usize {
        let mut paths: Vec<&String> = self
            .staged
            .keys()
            .chain(self.unstaged.keys())
            .chain(self.untracked.iter())
            .collect();
        paths.sort();
        paths.dedup();
        paths.len()
    }
}
