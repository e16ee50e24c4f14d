//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use thiserror::Error;

// ── Config errors ─────────────────────────────────────────────────────────────

/// Errors raised while validating a provisioning configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid account name '{0}': must match ^[a-z_][a-z0-9_-]{{0,31}}$")]
    InvalidAccountName(String),

    #[error("Missing host for the {stage} stage. Set '{key}' in the config file.")]
    MissingHost { stage: &'static str, key: &'static str },

    #[error("Invalid value for {key}: {value}\n\n{hint}")]
    InvalidValue {
        key: String,
        value: String,
        hint: String,
    },
}

// ── Credential errors ─────────────────────────────────────────────────────────

/// Errors related to the control-node key pair.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Key directory {0} does not exist or is not a directory.")]
    MissingDirectory(String),

    #[error("Key generation failed for {path}: {stderr}")]
    KeygenFailed { path: String, stderr: String },

    #[error("Public key {path} is malformed: {reason}")]
    MalformedPublicKey { path: String, reason: String },
}

// ── Task errors ───────────────────────────────────────────────────────────────

/// Errors raised by the reconciliation of a single task.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Task '{task}' failed on {host} (exit {code}):\n{stderr}")]
    Failed {
        task: String,
        host: String,
        code: i32,
        stderr: String,
    },

    #[error("Task '{task}' was terminated by a signal on {host}")]
    Terminated { task: String, host: String },
}

// ── Access errors ─────────────────────────────────────────────────────────────

/// Errors specific to the access stage.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error(
        "Key-based login as '{account}' on {host} could not be verified. \
Password authentication was left enabled.\n{detail}"
    )]
    KeyLoginUnverified {
        account: String,
        host: String,
        detail: String,
    },

    #[error("Account '{0}' has no home directory entry in the passwd database.")]
    NoHomeDirectory(String),

    #[error("Disabling password authentication was declined by the operator.")]
    PolicyDeclined,
}
