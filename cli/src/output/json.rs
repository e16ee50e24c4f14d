//! JSON output helpers.
//!
//! Every `--json` code path prints exactly one pretty-printed document on
//! stdout: a report, a plan, or the error object below.

use anyhow::{Context, Result};
use std::path::Path;

use serde::Serialize;

use crate::domain::config::ProvisionConfig;

/// Format a JSON error object.
///
/// Output (pretty-printed):
/// ```json
/// {
///   "error": true,
///   "message": "...",
///   "code": "..."
/// }
/// ```
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_error(message: &str, code: &str) -> Result<String> {
    let obj = serde_json::json!({
        "error": true,
        "message": message,
        "code": code,
    });
    serde_json::to_string_pretty(&obj).context("JSON serialization failed")
}

/// Serialize any report type as pretty JSON.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_value<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("JSON serialization failed")
}

/// Renders command results as JSON documents on stdout.
pub struct JsonRenderer;

impl JsonRenderer {
    /// Print any serializable value.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render<T: Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", format_value(value)?);
        Ok(())
    }

    /// Print the configuration together with its resolved path.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_config(&self, config: &ProvisionConfig, path: &Path) -> Result<()> {
        self.render(&serde_json::json!({
            "path": path.display().to_string(),
            "config": config,
        }))
    }

    /// Print a public key with the file it was read from.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_public_key(&self, key: &str, path: &Path) -> Result<()> {
        self.render(&serde_json::json!({
            "path": path.display().to_string(),
            "public_key": key,
        }))
    }
}

/// Stable error code for the `code` field, derived from the typed error in
/// the chain.
#[must_use]
pub fn error_code(err: &anyhow::Error) -> &'static str {
    use crate::domain::error::{AccessError, ConfigError, CredentialError, TaskError};
    for cause in err.chain() {
        if cause.is::<ConfigError>() {
            return "config";
        }
        if cause.is::<CredentialError>() {
            return "credentials";
        }
        if let Some(access) = cause.downcast_ref::<AccessError>() {
            return match access {
                AccessError::KeyLoginUnverified { .. } => "key_login_unverified",
                AccessError::NoHomeDirectory(_) => "no_home_directory",
                AccessError::PolicyDeclined => "declined",
            };
        }
        if cause.is::<TaskError>() {
            return "task_failed";
        }
    }
    "error"
}
