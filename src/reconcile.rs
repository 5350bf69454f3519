//! # Git Reconciliation
//!
//! [`GitReconciler`] brings one working clone to a requested ref. It runs a
//! small state machine:
//!
//! ```text
//! Missing ──clone──▶ Cloned ──find ref──▶ RefResolved ──checkout──▶ CheckedOut
//!    │                  │                     │
//!    └──────────────────┴─────────────────────┴──▶ Err(..)
//! ```
//!
//! - **Missing**: no repository at the path. The remote is cloned, borrowing
//!   objects from a mirror when one holds the same repository.
//! - **Cloned**: the remote whose URI matches exactly is looked up, its
//!   tracking refs are updated when asked to, and the ref is resolved.
//! - **RefResolved**: if `HEAD` already satisfies the target nothing is
//!   touched. Otherwise the tree must be clean before checkout.
//! - **CheckedOut**: the ref is resolved once more to report the final state.
//!
//! Every failure is returned to the caller; nothing is retried. The
//! reconciler only ever touches the clone it was pointed at.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::git;
use crate::process::ProcessRunner;
use crate::repository::{HeadState, RefState, Repository};

/// Caller choices that change what reconciliation may do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Object store to borrow from when cloning (`<mirror>/<name>[.git]`).
    pub mirror: Option<PathBuf>,
    /// Update the remote's tracking refs before resolving, unless the clone
    /// was just made.
    pub force_update: bool,
    /// Permit removing non-repository content at the clone path.
    pub allow_overwrite: bool,
}

/// Where a reconciliation currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileState {
    Missing,
    Cloned {
        fresh: bool,
    },
    RefResolved {
        remote_name: Option<String>,
        target: RefState,
    },
    CheckedOut {
        remote_name: Option<String>,
    },
}

/// What a reconciliation did and where it left the clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub clone_name: String,
    pub path: PathBuf,
    pub remote: String,
    /// Name of the configured remote matching `remote`, if any.
    pub remote_name: Option<String>,
    pub requested: String,
    pub target: RefState,
    pub head: Option<HeadState>,
    pub cloned: bool,
    pub checked_out: bool,
}

impl std::fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}:", self.clone_name)?;
        match &self.head {
            Some(head) => writeln!(
                f,
                "  * head     = {} ({})",
                head.symbolic.as_deref().unwrap_or("detached"),
                head.commit
            )?,
            None => writeln!(f, "  * head     = none")?,
        }
        writeln!(
            f,
            "  * expected = {} -> sha = {}",
            self.target
                .symbolic
                .as_deref()
                .or(self.target.commit.as_deref())
                .unwrap_or("?"),
            self.target.resolved
        )?;
        writeln!(f, "  * path     = {}", self.path.display())?;
        write!(
            f,
            "  * '{}' = {}",
            self.remote_name.as_deref().unwrap_or("<none>"),
            self.remote
        )
    }
}

/// Reconciles working clones through a process runner.
pub struct GitReconciler<'a> {
    runner: &'a dyn ProcessRunner,
    options: ReconcileOptions,
}

impl<'a> GitReconciler<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, options: ReconcileOptions) -> Self {
        Self { runner, options }
    }

    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Bring the clone at `path` to `reference` of `remote`.
    pub fn reconcile(&self, path: &Path, remote: &str, reference: &str) -> Result<ReconcileReport> {
        let repo = Repository::new(path, self.runner);
        let clone_name = git::clone_name(remote);
        let mut cloned = false;
        let mut checked_out = false;

        let mut state = ReconcileState::Missing;
        let remote_name = loop {
            debug!("{}: {:?}", clone_name, state);
            state = match state {
                ReconcileState::Missing => {
                    if repo.valid()? {
                        ReconcileState::Cloned { fresh: false }
                    } else {
                        self.clone(&repo, &clone_name, remote, reference)?;
                        cloned = true;
                        ReconcileState::Cloned { fresh: true }
                    }
                }
                ReconcileState::Cloned { fresh } => {
                    let remote_name = repo.remote_named_for(remote)?;
                    debug!("{}: remote name = {:?}", clone_name, remote_name);
                    if self.options.force_update && !fresh {
                        info!("{}: updating remote {:?}", clone_name, remote_name);
                        repo.remote_update(remote_name.as_deref())?;
                    }
                    let target = self.find_target(&repo, &clone_name, reference, remote_name.as_deref())?;
                    ReconcileState::RefResolved {
                        remote_name,
                        target,
                    }
                }
                ReconcileState::RefResolved {
                    remote_name,
                    target,
                } => {
                    if self.is_satisfied(&repo, &target)? {
                        info!("{}: Already checked out at expected ref", clone_name);
                    } else {
                        self.checkout(&repo, &clone_name, reference, &target)?;
                        checked_out = true;
                    }
                    ReconcileState::CheckedOut { remote_name }
                }
                ReconcileState::CheckedOut { remote_name } => break remote_name,
            };
        };

        let target = self.find_target(&repo, &clone_name, reference, remote_name.as_deref())?;
        let head = repo.head()?;
        if let Some(head) = &head {
            let on_branch = head.symbolic.is_some() && head.symbolic == target.symbolic;
            if on_branch && head.commit != target.resolved {
                warn!(
                    "{}: local branch {} is at {} but tracks {}",
                    clone_name,
                    head.symbolic.as_deref().unwrap_or_default(),
                    head.commit,
                    target.resolved
                );
            }
        }

        let report = ReconcileReport {
            clone_name,
            path: path.to_path_buf(),
            remote: remote.to_string(),
            remote_name,
            requested: reference.to_string(),
            target,
            head,
            cloned,
            checked_out,
        };
        info!("{}", report);
        Ok(report)
    }

    fn clone(&self, repo: &Repository<'_>, clone_name: &str, remote: &str, reference: &str) -> Result<()> {
        let mirror = self
            .options
            .mirror
            .as_deref()
            .and_then(|mirror| git::find_reference(mirror, clone_name));
        info!("{}: Cloning {}", clone_name, remote);
        repo.clone_from(remote, mirror.as_deref(), self.options.allow_overwrite)
            .map_err(|e| match e {
                Error::GitClone {
                    url, message, hint, ..
                } => Error::GitClone {
                    url,
                    r#ref: reference.to_string(),
                    message,
                    hint,
                },
                other => other,
            })
    }

    fn find_target(
        &self,
        repo: &Repository<'_>,
        clone_name: &str,
        reference: &str,
        remote_name: Option<&str>,
    ) -> Result<RefState> {
        repo.find_ref(reference, remote_name)?
            .ok_or_else(|| Error::RefNotFound {
                clone: clone_name.to_string(),
                r#ref: reference.to_string(),
            })
    }

    /// `HEAD` satisfies the target when both symbolic refs are absent or
    /// equal and, for a bare commit target, the commits match. A detached
    /// `HEAD` on the commit a tag points at also satisfies a tag target.
    fn is_satisfied(&self, repo: &Repository<'_>, target: &RefState) -> Result<bool> {
        let Some(head) = repo.head()? else {
            return Ok(false);
        };

        if head.symbolic == target.symbolic {
            return Ok(match &target.commit {
                None => target.symbolic.is_some(),
                Some(commit) => *commit == head.commit,
            });
        }

        if head.symbolic.is_none() && target.is_tag() {
            if let Some(tag) = &target.symbolic {
                let peeled = repo.absolute_sha(&format!("{}^{{commit}}", tag))?;
                return Ok(peeled.as_deref() == Some(head.commit.as_str()));
            }
        }
        Ok(false)
    }

    fn checkout(
        &self,
        repo: &Repository<'_>,
        clone_name: &str,
        reference: &str,
        target: &RefState,
    ) -> Result<()> {
        info!("{}: Not checked out to a valid ref/commit", clone_name);

        let status = repo.status()?;
        if status.is_dirty(true) {
            return Err(Error::DirtyWorkingTree {
                clone: clone_name.to_string(),
                target: reference.to_string(),
                changes: status.change_count(),
            });
        }

        // A fresh tracking ref is checked out by its short name so git
        // creates a local branch following it.
        let object = match &target.symbolic {
            Some(_) if target.is_remote_tracking() => reference.to_string(),
            Some(symbolic) => repo
                .short_ref(symbolic)?
                .unwrap_or_else(|| symbolic.clone()),
            None => target.resolved.clone(),
        };

        info!("{}: Checking out '{}'", clone_name, object);
        repo.checkout(&object)?;
        if let Some(description) = repo.describe()? {
            debug!("{}: now at {}", clone_name, description);
        }
        Ok(())
    }
}
