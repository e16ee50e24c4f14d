//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain`, never from `crate::infra`,
//! `crate::commands`, or `crate::output`.

use std::path::{Path, PathBuf};
use std::process::Output;

use anyhow::Result;

use crate::domain::{ProvisionConfig, RunAs};

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program and capture its output.
    ///
    /// Implementations should delegate to `run_with_timeout` using the
    /// instance's configured default timeout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;
    /// Run a program with a custom timeout override.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds `timeout`.
    /// On timeout, the child process must be killed (not left orphaned).
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: std::time::Duration,
    ) -> Result<Output>;
    /// Run a program with stdin piped from `stdin`, under a custom timeout.
    async fn run_with_stdin(
        &self,
        program: &str,
        args: &[&str],
        stdin: &[u8],
        timeout: std::time::Duration,
    ) -> Result<Output>;
}

// ── Host Shell Port ───────────────────────────────────────────────────────────

/// A shell on one target host. Scripts are delivered on stdin.
#[allow(async_fn_in_trait)]
pub trait RemoteShell {
    /// Host label for logs and reports.
    fn label(&self) -> String;
    /// Run an action script as `run_as`, under the task timeout.
    async fn run_script(&self, run_as: &RunAs, script: &str) -> Result<Output>;
    /// Run a short read-only script (guards, reads), under the probe timeout.
    async fn query(&self, run_as: &RunAs, script: &str) -> Result<Output>;
}

// ── Login Probe Port ──────────────────────────────────────────────────────────

/// Verifies that an account accepts key-only SSH login.
#[allow(async_fn_in_trait)]
pub trait LoginProbe {
    /// Attempt a key-only login as `account` with `private_key` and run
    /// `true`. A zero exit status means the key works.
    async fn probe(&self, account: &str, private_key: &Path) -> Result<Output>;
}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Sync trait.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
}

// ── Filesystem and Config Ports ───────────────────────────────────────────────

/// Abstracts the control node's filesystem.
pub trait LocalFs {
    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn write(&self, path: &Path, content: &str) -> Result<()>;
    fn set_permissions(&self, path: &Path, mode: u32) -> Result<()>;
    /// The operator's home directory, for `~` expansion.
    fn home_dir(&self) -> Result<PathBuf>;
}

/// Abstracts loading and saving the provisioning configuration.
pub trait ConfigStore {
    /// Load the configuration; a missing file yields the defaults.
    fn load(&self) -> Result<ProvisionConfig>;
    /// Write the given raw document to the config path with mode 600.
    fn save_raw(&self, content: &str) -> Result<()>;
    /// The resolved config path.
    fn path(&self) -> Result<PathBuf>;
}
