//! # Fetch Planning and Execution
//!
//! Several layers often live in one repository (`poky` carries `meta`,
//! `meta-poky` and `meta-yocto-bsp`). [`FetchPlan`] groups the layers of a
//! collection by clone identity so each repository is reconciled once, and
//! refuses plans in which layers sharing a clone ask for different refs.
//!
//! [`FetchOrchestrator`] then reconciles every planned clone. Clones live in
//! disjoint directories, so they are reconciled in parallel on a rayon pool
//! bounded by the caller's thread limit.

use std::collections::BTreeMap;
use std::path::PathBuf;

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::git;
use crate::layers::LayerCollection;
use crate::process::ProcessRunner;
use crate::reconcile::{GitReconciler, ReconcileOptions, ReconcileReport};
use crate::source::SourceDescriptor;

/// One clone to reconcile and the layers it serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub clone_name: String,
    pub remote: String,
    pub r#ref: String,
    pub path: PathBuf,
    pub layers: Vec<String>,
}

/// Clone identity to reconciliation task, built from a layer collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchPlan {
    entries: BTreeMap<String, PlanEntry>,
    local: Vec<String>,
}

impl FetchPlan {
    /// Group the collection's git layers by clone identity.
    ///
    /// Every layer mapped to one clone must request the same ref, otherwise
    /// this fails with [`Error::Conflict`]. Local layers are not fetched and
    /// are only listed.
    pub fn build(collection: &LayerCollection, env: &Environment) -> Result<Self> {
        let mut plan = FetchPlan::default();

        for layer in collection {
            let git = match &layer.source {
                Some(SourceDescriptor::Local(local)) => {
                    debug!("fetch: '{}' is local ({})", layer.name, local.name);
                    plan.local.push(layer.name.clone());
                    continue;
                }
                Some(SourceDescriptor::Git(git)) => git,
                None => {
                    return Err(Error::Resolution {
                        layer: layer.full_name(),
                        message: "layer has no source".to_string(),
                    })
                }
            };

            let remote = git.remote.clone().ok_or_else(|| Error::Resolution {
                layer: layer.full_name(),
                message: "layer has no remote".to_string(),
            })?;
            let r#ref = collection.effective_ref(layer)?;
            let clone_name = git::clone_name(&remote);
            if !git::is_valid_clone_name(&clone_name) {
                return Err(Error::Resolution {
                    layer: layer.full_name(),
                    message: format!("remote '{}' does not name a clone directory", remote),
                });
            }

            match plan.entries.get_mut(&clone_name) {
                Some(entry) => {
                    if entry.r#ref != r#ref {
                        return Err(Error::Conflict {
                            clone: clone_name,
                            existing: entry.layers.clone(),
                            layer: layer.name.clone(),
                            expected: entry.r#ref.clone(),
                            found: r#ref,
                        });
                    }
                    if entry.remote != remote {
                        warn!(
                            "Layers sharing clone '{}' name different remotes ({} and {}); using {}",
                            clone_name, entry.remote, remote, entry.remote
                        );
                    }
                    entry.layers.push(layer.name.clone());
                }
                None => {
                    let path = env.sources_path().join(&clone_name);
                    plan.entries.insert(
                        clone_name.clone(),
                        PlanEntry {
                            clone_name,
                            remote,
                            r#ref,
                            path,
                            layers: vec![layer.name.clone()],
                        },
                    );
                }
            }
        }

        Ok(plan)
    }

    /// Planned clones, ordered by clone name.
    pub fn entries(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries.values()
    }

    pub fn get(&self, clone_name: &str) -> Option<&PlanEntry> {
        self.entries.get(clone_name)
    }

    /// Names of layers that are used in place and never fetched.
    pub fn local_layers(&self) -> &[String] {
        &self.local
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Drives one [`GitReconciler`] per planned clone.
pub struct FetchOrchestrator<'a> {
    runner: &'a dyn ProcessRunner,
    options: ReconcileOptions,
}

impl<'a> FetchOrchestrator<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, options: ReconcileOptions) -> Self {
        Self { runner, options }
    }

    /// Plan and fetch a collection. Planning errors surface before any git
    /// command runs.
    pub fn fetch(&self, collection: &LayerCollection, env: &Environment) -> Result<Vec<ReconcileReport>> {
        let plan = FetchPlan::build(collection, env)?;
        env.prepare()?;
        self.execute(&plan, env.threads())
    }

    /// Reconcile every planned clone with at most `limit` in flight.
    ///
    /// All clones are attempted; the first error, in clone-name order, is
    /// returned.
    pub fn execute(&self, plan: &FetchPlan, limit: usize) -> Result<Vec<ReconcileReport>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(limit.max(1))
            .build()
            .map_err(|e| Error::ThreadPool {
                message: e.to_string(),
            })?;

        info!("Fetching {} repositories ({} threads)", plan.len(), limit.max(1));
        let reconciler = GitReconciler::new(self.runner, self.options.clone());
        let entries: Vec<&PlanEntry> = plan.entries().collect();

        let results: Vec<Result<ReconcileReport>> = pool.install(|| {
            entries
                .par_iter()
                .map(|entry| {
                    debug!(
                        "Git Fetch '{}' @ {} for {}",
                        entry.clone_name,
                        entry.r#ref,
                        entry.layers.join(", ")
                    );
                    reconciler.reconcile(&entry.path, &entry.remote, &entry.r#ref)
                })
                .collect()
        });

        results.into_iter().collect()
    }
}
