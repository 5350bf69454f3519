//! # Working Clone Access
//!
//! [`Repository`] wraps one working clone on disk and answers the questions
//! the reconciler asks of it: is there a repository here, which remotes does
//! it have, what is `HEAD`, what does a ref resolve to, is the tree dirty.
//!
//! Every query is a `git` sub-command issued through a borrowed
//! [`ProcessRunner`], with the clone as the working directory. Queries whose
//! failure is meaningful (a ref that does not exist, a missing upstream)
//! return `Ok(None)`; only failures that stop reconciliation are `Err`.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{Error, Result};
use crate::git::{self, WorkingTreeStatus};
use crate::process::{ProcessOutput, ProcessRunner};

/// The outcome of resolving a ref string inside a clone.
///
/// At least one of `symbolic` and `commit` is set. `resolved` is always the
/// commit the ref currently points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefState {
    /// Full symbolic name, e.g. `refs/heads/master` or `refs/remotes/origin/daisy`.
    pub symbolic: Option<String>,
    /// Set only when the ref string named a commit object directly.
    pub commit: Option<String>,
    pub resolved: String,
}

impl RefState {
    pub fn is_remote_tracking(&self) -> bool {
        self.symbolic
            .as_deref()
            .is_some_and(|name| name.starts_with("refs/remotes/"))
    }

    pub fn is_tag(&self) -> bool {
        self.symbolic
            .as_deref()
            .is_some_and(|name| name.starts_with("refs/tags/"))
    }
}

/// Where `HEAD` currently points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadState {
    /// `None` when `HEAD` is detached.
    pub symbolic: Option<String>,
    pub commit: String,
}

/// A working clone at a fixed path.
pub struct Repository<'a> {
    path: PathBuf,
    runner: &'a dyn ProcessRunner,
}

impl<'a> Repository<'a> {
    pub fn new(path: impl Into<PathBuf>, runner: &'a dyn ProcessRunner) -> Self {
        Self {
            path: path.into(),
            runner,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory name of the clone, used in messages.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    fn git<S: AsRef<str>>(&self, args: &[S]) -> Result<ProcessOutput> {
        self.runner
            .run(&git::git_argv(args), Some(&self.path), &[])
    }

    /// Run a git sub-command that must succeed.
    fn git_checked<S: AsRef<str>>(&self, args: &[S]) -> Result<ProcessOutput> {
        let output = self.git(args)?;
        if !output.success() {
            return Err(Error::GitCommand {
                command: git::git_argv(args).join(" "),
                path: self.path.display().to_string(),
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Whether a git repository exists at the path.
    pub fn valid(&self) -> Result<bool> {
        if !self.path.is_dir() {
            return Ok(false);
        }
        if self.path.join(".git").exists() {
            return Ok(true);
        }
        Ok(self.git(&["rev-parse"])?.success())
    }

    /// Clone `remote` into the path.
    ///
    /// `reference` is a local repository to borrow objects from. Pre-existing
    /// content at the path is removed only when `allow_overwrite` is set.
    pub fn clone_from(
        &self,
        remote: &str,
        reference: Option<&Path>,
        allow_overwrite: bool,
    ) -> Result<()> {
        if self.path.exists() || self.path.is_symlink() {
            if !allow_overwrite {
                return Err(Error::ExistingContent {
                    path: self.path.display().to_string(),
                });
            }
            debug!("removing existing content at {}", self.path.display());
            if self.path.is_dir() && !self.path.is_symlink() {
                fs::remove_dir_all(&self.path)?;
            } else {
                fs::remove_file(&self.path)?;
            }
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut args = vec!["clone".to_string()];
        if let Some(reference) = reference {
            args.push("--no-hardlinks".to_string());
            args.push("--reference".to_string());
            args.push(reference.display().to_string());
        }
        args.push(remote.to_string());
        args.push(self.path.display().to_string());

        // The target does not exist yet, so the clone runs from the caller's cwd.
        let output = self.runner.run(&git::git_argv(&args), None, &[])?;
        if !output.success() {
            let stderr = output.stderr.trim().to_string();
            return Err(Error::GitClone {
                url: remote.to_string(),
                r#ref: "HEAD".to_string(),
                hint: git::clone_hint(&stderr),
                message: stderr,
            });
        }
        Ok(())
    }

    /// Configured remotes as `(name, fetch uri)`, in git's listing order.
    pub fn remotes(&self) -> Result<Vec<(String, String)>> {
        let output = self.git_checked(&["remote", "-v"])?;
        Ok(git::parse_remotes(&output.stdout))
    }

    /// Name of the first remote whose URI is exactly `uri`.
    ///
    /// URIs are not normalised, so `x.git` and `x` are different remotes.
    pub fn remote_named_for(&self, uri: &str) -> Result<Option<String>> {
        Ok(self
            .remotes()?
            .into_iter()
            .find(|(_, remote)| remote == uri)
            .map(|(name, _)| name))
    }

    /// Fetch new tracking refs for `remote`, or for every remote when `None`.
    pub fn remote_update(&self, remote: Option<&str>) -> Result<()> {
        let mut args = vec!["remote", "update"];
        args.extend(remote);
        self.git_checked(&args)?;
        Ok(())
    }

    pub fn status(&self) -> Result<WorkingTreeStatus> {
        let output = self.git_checked(&["status", "--porcelain"])?;
        Ok(WorkingTreeStatus::parse(&output.stdout))
    }

    /// Dirty counts staged, unstaged and untracked changes.
    pub fn is_dirty(&self) -> Result<bool> {
        Ok(self.status()?.is_dirty(true))
    }

    /// Current `HEAD`. `None` for a clone with no commits.
    pub fn head(&self) -> Result<Option<HeadState>> {
        let output = self.git(&["rev-parse", "HEAD", "--symbolic-full-name", "HEAD"])?;
        if !output.success() {
            return Ok(None);
        }
        let mut lines = output.stdout.lines().map(str::trim);
        let (Some(commit), Some(symbolic)) = (lines.next(), lines.next()) else {
            return Ok(None);
        };
        Ok(Some(HeadState {
            symbolic: (symbolic != "HEAD" && !symbolic.is_empty()).then(|| symbolic.to_string()),
            commit: commit.to_string(),
        }))
    }

    /// Resolve `reference` in the order: tracking ref of `remote`, local
    /// ref or tag, raw commit.
    ///
    /// A tracking ref that some local branch follows resolves to that local
    /// branch. When both names for one branch or tag exist, git's own
    /// precedence decides.
    pub fn find_ref(&self, reference: &str, remote: Option<&str>) -> Result<Option<RefState>> {
        if let Some(remote) = remote {
            let tracking = format!("refs/remotes/{}/{}", remote, reference);
            let output = self.git(&["show-ref", tracking.as_str()])?;
            let found = output
                .success()
                .then(|| output.first_line())
                .flatten()
                .and_then(|line| {
                    let mut parts = line.split_whitespace();
                    Some((parts.next()?.to_string(), parts.next()?.to_string()))
                });

            if let Some((commit, fullref)) = found {
                let output = self.git(&[
                    "for-each-ref",
                    "--format=%(refname) %(upstream)",
                    "refs/heads",
                ])?;
                let local = if output.success() {
                    git::parse_upstreams(&output.stdout)
                        .into_iter()
                        .find(|(_, upstream)| upstream.as_deref() == Some(fullref.as_str()))
                        .map(|(branch, _)| branch)
                } else {
                    None
                };
                return Ok(Some(RefState {
                    symbolic: Some(local.unwrap_or(fullref)),
                    commit: None,
                    resolved: commit,
                }));
            }
        }

        let output = self.git(&["rev-parse", "--symbolic-full-name", reference])?;
        if output.success() {
            if let Some(fullref) = output.first_line() {
                if let Some(commit) = self.ref_commit(fullref)? {
                    return Ok(Some(RefState {
                        symbolic: Some(fullref.to_string()),
                        commit: None,
                        resolved: commit,
                    }));
                }
            }
        }

        Ok(self.absolute_sha(reference)?.map(|sha| RefState {
            symbolic: None,
            commit: Some(sha.clone()),
            resolved: sha,
        }))
    }

    /// Short name of a full ref, e.g. `refs/heads/master` to `master`.
    pub fn short_ref(&self, fullref: &str) -> Result<Option<String>> {
        let output = self.git(&["rev-parse", "--abbrev-ref", fullref])?;
        Ok(output
            .success()
            .then(|| output.first_line().map(str::to_string))
            .flatten())
    }

    /// Commit a full ref points at, via `show-ref`.
    pub fn ref_commit(&self, fullref: &str) -> Result<Option<String>> {
        let output = self.git(&["show-ref", fullref])?;
        Ok(output
            .success()
            .then(|| {
                output
                    .stdout
                    .lines()
                    .find_map(|line| line.split_whitespace().next().map(str::to_string))
            })
            .flatten())
    }

    /// Expand an object name to its full sha, if it names an object.
    pub fn absolute_sha(&self, object: &str) -> Result<Option<String>> {
        let output = self.git(&["rev-parse", object])?;
        Ok(output
            .success()
            .then(|| output.first_line().map(str::to_string))
            .flatten())
    }

    pub fn checkout(&self, object: &str) -> Result<()> {
        let output = self.git(&["checkout", object])?;
        if !output.success() {
            return Err(Error::Checkout {
                clone: self.name(),
                target: object.to_string(),
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(())
    }

    /// `git describe --dirty --all --exact-match --long` of `HEAD`.
    pub fn describe(&self) -> Result<Option<String>> {
        let output = self.git(&["describe", "--dirty", "--all", "--exact-match", "--long"])?;
        Ok(output
            .success()
            .then(|| output.first_line().map(str::to_string))
            .flatten())
    }
}
