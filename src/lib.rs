//! # hopper
//!
//! This library resolves, fetches, pins and watches the source *layers* of an
//! embedded Linux (OpenEmbedded/Yocto) build. It is used by the `hopper`
//! command-line tool but can also be driven directly by other build tooling.
//!
//! ## Quick Example
//!
//! ```
//! use hopper::environment::Environment;
//! use hopper::fetch::FetchPlan;
//! use hopper::layers::{Layer, LayerCollection};
//! use hopper::source::SourceDescriptor;
//!
//! let mut layers = LayerCollection::new(Some("kirkstone"));
//! for name in ["meta", "meta-poky"] {
//!     layers.push(Layer::new(
//!         name,
//!         None,
//!         Some(SourceDescriptor::git(Some("git://git.yoctoproject.org/poky"), None)),
//!     ));
//! }
//!
//! // Both layers live in one clone, which is reconciled once.
//! let plan = FetchPlan::build(&layers, &Environment::new("/work")).unwrap();
//! assert_eq!(plan.len(), 1);
//! assert_eq!(plan.get("poky").unwrap().r#ref, "kirkstone");
//! assert_eq!(layers.hash().len(), 16);
//! ```
//!
//! ## Core Concepts
//!
//! - **Sources (`source`)**: where a layer comes from, a git remote and ref or
//!   a local directory.
//! - **Layer Index (`index`)**: short name lookup with aliases and built-in
//!   defaults, filled from the public layer index or a cache file.
//! - **Layers (`layers`)**: the ordered, name-unique collection; specifier
//!   parsing, resolution against indexes, validation and identity hashing.
//! - **Reconciliation (`reconcile`, `repository`, `git`)**: brings one working
//!   clone to a requested ref, idempotently and without discarding local work.
//! - **Fetching (`fetch`)**: groups layers by clone, rejects ref conflicts, and
//!   reconciles every clone in parallel.
//! - **Watching (`watcher`)**: polls remotes and emits pinned collections when
//!   a watched branch moves.
//!
//! All git work goes through the [`process::ProcessRunner`] seam, which runs
//! the system `git` binary.

pub mod config;
pub mod defaults;
pub mod environment;
pub mod error;
pub mod fetch;
pub mod git;
pub mod index;
pub mod layers;
pub mod output;
pub mod process;
pub mod reconcile;
pub mod repository;
pub mod source;
pub mod watcher;

#[cfg(test)]
mod layers_proptest;
