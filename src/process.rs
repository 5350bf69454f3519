//! # Process Execution
//!
//! Every git sub-command the reconciler, the watcher and the HTTP index
//! fetcher issue goes through the [`ProcessRunner`] trait. The production
//! implementation, [`SystemRunner`], spawns the program with
//! `std::process::Command` and waits for it to exit. Tests substitute a
//! scripted runner that records every argv.
//!
//! Children are always waited on, never killed, so that an interrupted run
//! cannot leave a clone half checked out.

use std::path::Path;
use std::process::Command;

use log::debug;

use crate::error::{Error, Result};

/// Captured result of a finished child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `-1` when the child was terminated by a signal.
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// Convenience constructor for a successful run.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Convenience constructor for a failed run.
    pub fn failed(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// First line of stdout, trimmed, if it is non-empty.
    pub fn first_line(&self) -> Option<&str> {
        self.stdout
            .lines()
            .next()
            .map(str::trim)
            .filter(|line| !line.is_empty())
    }
}

/// Runs an argv to completion and reports `(exit code, stdout, stderr)`.
pub trait ProcessRunner: Send + Sync {
    /// Run `argv` (program first) in `cwd` with `env` added to the inherited
    /// environment.
    ///
    /// Only a failure to spawn is an `Err`; a non-zero exit is reported
    /// through [`ProcessOutput::status`].
    fn run(&self, argv: &[String], cwd: Option<&Path>, env: &[(String, String)])
        -> Result<ProcessOutput>;
}

/// The default runner, backed by the host's processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(
        &self,
        argv: &[String],
        cwd: Option<&Path>,
        env: &[(String, String)],
    ) -> Result<ProcessOutput> {
        let (program, args) = argv.split_first().ok_or_else(|| Error::Process {
            command: String::new(),
            message: "empty argument vector".to_string(),
        })?;

        let mut command = Command::new(program);
        command.args(args);
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }
        for (key, value) in env {
            command.env(key, value);
        }

        debug!("process: exec {:?} (cwd = {:?})", argv, cwd);
        let output = command.output().map_err(|e| Error::Process {
            command: argv.join(" "),
            message: e.to_string(),
        })?;

        let status = output.status.code().unwrap_or(-1);
        debug!("process: {:?} exited with {}", argv, status);

        Ok(ProcessOutput {
            status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
