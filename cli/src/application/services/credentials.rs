//! Application service — credential stage.
//!
//! Ensures the control-node key pair exists and returns its public half as a
//! typed value for the access stage. Never overwrites an existing pair.

use anyhow::{Context, Result};

use crate::application::ports::{CommandRunner, LocalFs, ProgressReporter};
use crate::domain::credentials::{KeyPair, PublicKey};
use crate::domain::error::CredentialError;
use crate::domain::report::{Stage, StageReport};
use crate::domain::task::TaskOutcome;

/// Task name used in reports.
pub const KEY_PAIR_TASK: &str = "ensure key pair";

/// What the credential stage did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPairAction {
    /// Both halves existed; nothing was written.
    Reused,
    /// The private half existed; the public half was derived from it.
    Repaired,
    /// A new pair was generated.
    Generated,
}

/// Result of the credential stage.
#[derive(Debug, Clone)]
pub struct CredentialOutcome {
    pub action: KeyPairAction,
    pub public_key: PublicKey,
    pub report: StageReport,
}

/// Ensure `pair` exists and return its public key.
///
/// # Errors
///
/// Returns an error if the key directory is missing, `ssh-keygen` fails, or
/// the public key cannot be read or parsed.
pub async fn ensure_key_pair(
    runner: &impl CommandRunner,
    fs: &impl LocalFs,
    pair: &KeyPair,
    comment: &str,
    reporter: &impl ProgressReporter,
) -> Result<CredentialOutcome> {
    let action = if fs.exists(&pair.private) {
        if fs.exists(&pair.public) {
            KeyPairAction::Reused
        } else {
            reporter.step("deriving missing public key...");
            derive_public(runner, fs, pair).await?;
            KeyPairAction::Repaired
        }
    } else {
        let dir = pair
            .private
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| std::path::Path::new("."));
        if !fs.is_dir(dir) {
            return Err(CredentialError::MissingDirectory(dir.display().to_string()).into());
        }
        reporter.step(&format!("generating RSA-{} key pair...", pair.bits));
        generate(runner, pair, comment).await?;
        KeyPairAction::Generated
    };

    let text = fs
        .read_to_string(&pair.public)
        .with_context(|| format!("reading public key {}", pair.public.display()))?;
    let public_key = PublicKey::parse(&text, &pair.public)?;

    tracing::info!(
        path = %pair.private.display(),
        action = ?action,
        key = %public_key.short(),
        "key pair ready"
    );
    match action {
        KeyPairAction::Reused => reporter.success(&format!(
            "key pair at {} (already in place)",
            pair.private.display()
        )),
        _ => reporter.success(&format!("key pair at {}", pair.private.display())),
    }

    let mut report = StageReport::new(Stage::Credentials, "local");
    let outcome = match action {
        KeyPairAction::Reused => TaskOutcome::Skipped,
        KeyPairAction::Repaired | KeyPairAction::Generated => TaskOutcome::Changed { output: None },
    };
    report.record(KEY_PAIR_TASK, outcome);

    Ok(CredentialOutcome {
        action,
        public_key,
        report,
    })
}

async fn generate(runner: &impl CommandRunner, pair: &KeyPair, comment: &str) -> Result<()> {
    let args = pair.keygen_args(comment);
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    let output = runner
        .run("ssh-keygen", &arg_refs)
        .await
        .context("running ssh-keygen")?;
    if !output.status.success() {
        return Err(CredentialError::KeygenFailed {
            path: pair.private.display().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into());
    }
    Ok(())
}

async fn derive_public(
    runner: &impl CommandRunner,
    fs: &impl LocalFs,
    pair: &KeyPair,
) -> Result<()> {
    let args = pair.derive_public_args();
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    let output = runner
        .run("ssh-keygen", &arg_refs)
        .await
        .context("running ssh-keygen -y")?;
    if !output.status.success() {
        return Err(CredentialError::KeygenFailed {
            path: pair.private.display().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into());
    }
    let public = String::from_utf8_lossy(&output.stdout);
    fs.write(&pair.public, &public)?;
    fs.set_permissions(&pair.public, 0o644)
}
