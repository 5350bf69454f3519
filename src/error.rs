//! # Error Handling
//!
//! This module defines the centralized error type for `hopper`. It uses the
//! `thiserror` library to build a single `Error` enum that covers every
//! failure the layer resolution and git reconciliation engine can report.
//!
//! ## Key Components
//!
//! - **`Error`**: The main enum. Each variant carries enough context (layer
//!   names, clone names, refs, stderr) to explain the failure without a
//!   backtrace.
//!
//! - **`Result<T>`**: A type alias for `std::result::Result<T, Error>`.
//!
//! ## Fatal vs. recoverable
//!
//! Everything raised while resolving layers or reconciling a clone is fatal
//! and propagates to the invoking command; nothing is retried automatically.
//! The one recoverable variant is `RemoteQuery`, which the remote watcher
//! logs before abandoning the current poll cycle. The next cycle acts as the
//! retry.

use thiserror::Error;

/// Main error type for hopper operations
#[derive(Error, Debug)]
pub enum Error {
    /// No source descriptor could be found for a layer, neither from the
    /// specifier itself nor from any attached layer index.
    #[error("Unable to fill in source information for layer '{layer}': {message}")]
    Resolution { layer: String, message: String },

    /// Two layers that share one clone disagree on the ref to check out.
    #[error(
        "Mis-matched sources between layers ({}) and '{layer}' for clone '{clone}': {expected} != {found}",
        existing.join(", ")
    )]
    Conflict {
        clone: String,
        existing: Vec<String>,
        layer: String,
        expected: String,
        found: String,
    },

    /// A checkout was required but the working tree has local modifications.
    #[error("Cannot checkout '{target}' in '{clone}' due to dirty state ({changes} changed paths)")]
    DirtyWorkingTree {
        clone: String,
        target: String,
        changes: usize,
    },

    /// An error occurred while cloning a Git repository.
    ///
    /// Includes the repository URL, the ref being reconciled, the error
    /// message, and an optional hint for resolution.
    #[error("Git clone error for {url}@{r#ref}: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    GitClone {
        url: String,
        r#ref: String,
        message: String,
        /// Optional hint for how to resolve the clone issue
        hint: Option<String>,
    },

    /// `git checkout` of the resolved object failed.
    #[error("Failed to checkout '{target}' for '{clone}': {stderr}")]
    Checkout {
        clone: String,
        target: String,
        stderr: String,
    },

    /// The requested ref is neither a remote-tracking ref, a local ref or
    /// tag, nor a commit object in the clone.
    #[error("Unable to resolve ref '{r#ref}' in '{clone}'")]
    RefNotFound { clone: String, r#ref: String },

    /// Querying a remote's ref table failed (watcher only, recoverable).
    #[error("Failed to get remote state for '{remote}': {stderr}")]
    RemoteQuery { remote: String, stderr: String },

    /// The clone target exists but is not a repository, and the caller did
    /// not permit removing it.
    #[error("Repository or content already exists at {path}")]
    ExistingContent { path: String },

    /// Any other git sub-command failed.
    #[error("Git command failed in {path}: {command} - {stderr}")]
    GitCommand {
        command: String,
        path: String,
        stderr: String,
    },

    /// A child process could not be started at all.
    #[error("Failed to execute '{command}': {message}")]
    Process { command: String, message: String },

    /// The layer index could not be parsed.
    #[error("Layer index error: {message}")]
    IndexParse { message: String },

    /// An error occurred while parsing the layer configuration.
    ///
    /// This error includes the specific parsing issue and optionally a hint
    /// about how to fix it.
    #[error("Configuration parsing error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    ConfigParse {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// The worker pool for parallel reconciliation could not be built.
    #[error("Thread pool error: {message}")]
    ThreadPool { message: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl Error {
    /// Whether this error is the one a caller may retry on a later cycle.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::RemoteQuery { .. })
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
