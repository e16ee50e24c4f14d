//! Application service — access stage.
//!
//! Creates the account, installs the public key, grants sudo and finally
//! disables password authentication once key login is known to work.

use std::path::Path;

use anyhow::{Context, Result};

use crate::application::ports::{LoginProbe, ProgressReporter, RemoteShell};
use crate::application::services::reconcile::reconcile;
use crate::domain::access::{
    FileSpec, PASSWORD_AUTH_KEYWORD, account_task, append_authorized_key_script, backup_path,
    ensure_directive, group_membership_task, install_file_script, parse_passwd_home, sudoers_task,
};
use crate::domain::config::AccessConfig;
use crate::domain::credentials::{PublicKey, authorized_keys_contains};
use crate::domain::error::AccessError;
use crate::domain::host::RunAs;
use crate::domain::report::{Stage, StageReport};
use crate::domain::task::{SCRIPT_PRELUDE, TaskOutcome, quote};

/// Report name of the sshd hardening step.
pub const SSHD_TASK: &str = "disable password authentication";

/// How key login is confirmed before sshd is tightened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginCheck {
    /// Run the login probe; a failure aborts before sshd is touched.
    Probe,
    /// The operator accepted the risk; no probe is run.
    Waived,
}

/// Inputs of the access stage that are not ports.
#[derive(Debug, Clone, Copy)]
pub struct AccessRequest<'a> {
    pub cfg: &'a AccessConfig,
    pub key: &'a PublicKey,
    pub private_key: &'a Path,
    pub login_check: LoginCheck,
    /// UTC timestamp used to name the sshd_config backup.
    pub stamp: &'a str,
}

/// Run the access stage against `shell`.
///
/// # Errors
///
/// Returns an error if any required step fails, or if key login cannot be
/// verified; in the latter case sshd_config is left untouched.
pub async fn provision_access(
    shell: &impl RemoteShell,
    probe: &impl LoginProbe,
    reporter: &impl ProgressReporter,
    request: &AccessRequest<'_>,
) -> Result<StageReport> {
    let account = &request.cfg.account;
    let mut report = StageReport::new(Stage::Access, shell.label());

    // 1. Account and supplementary groups
    let task = account_task(account);
    let outcome = reconcile(shell, &task, reporter).await?;
    report.record(task.name, outcome);

    if let Some(task) = group_membership_task(account) {
        let outcome = reconcile(shell, &task, reporter).await?;
        report.record(task.name, outcome);
    }

    // 2. Authorized key
    let home = resolve_home(shell, &account.name).await?;
    let (name, outcome) = ensure_authorized_key(shell, reporter, &account.name, &home, request.key)
        .await?;
    report.record(name, outcome);

    // 3. Sudoers drop-in, rewritten on every run
    let task = sudoers_task(&account.name);
    let outcome = reconcile(shell, &task, reporter).await?;
    report.record(task.name, outcome);

    // 4. Key login must work before password login is switched off
    match request.login_check {
        LoginCheck::Probe => {
            verify_key_login(probe, reporter, &account.name, &shell.label(), request.private_key)
                .await?;
        }
        LoginCheck::Waived => {
            tracing::warn!(account = %account.name, "key login probe waived");
            reporter.warn("key login was not verified before disabling password login");
        }
    }

    // 5. sshd_config
    let outcome = harden_sshd(shell, reporter, request.cfg, request.stamp).await?;
    report.record(SSHD_TASK, outcome);

    Ok(report)
}

async fn resolve_home(shell: &impl RemoteShell, account: &str) -> Result<String> {
    let output = shell
        .query(&RunAs::Root, &format!("getent passwd {}\n", quote(account)))
        .await
        .with_context(|| format!("looking up home directory of {account}"))?;
    if !output.status.success() {
        return Err(AccessError::NoHomeDirectory(account.to_string()).into());
    }
    parse_passwd_home(&String::from_utf8_lossy(&output.stdout))
        .ok_or_else(|| AccessError::NoHomeDirectory(account.to_string()).into())
}

async fn ensure_authorized_key(
    shell: &impl RemoteShell,
    reporter: &impl ProgressReporter,
    account: &str,
    home: &str,
    key: &PublicKey,
) -> Result<(String, TaskOutcome)> {
    let name = format!("authorize key for {account}");
    let file = format!("{home}/.ssh/authorized_keys");
    let output = shell
        .query(&RunAs::Root, &format!("cat {} 2>/dev/null || true\n", quote(&file)))
        .await
        .with_context(|| format!("reading {file}"))?;
    let existing = String::from_utf8_lossy(&output.stdout);

    if authorized_keys_contains(&existing, key) {
        tracing::info!(task = %name, outcome = "skipped", "key already authorized");
        reporter.success(&format!("{name} (already in place)"));
        return Ok((name, TaskOutcome::Skipped));
    }

    reporter.step(&format!("{name}..."));
    let script = format!(
        "{SCRIPT_PRELUDE}{}",
        append_authorized_key_script(account, home, key)
    );
    let output = shell
        .run_script(&RunAs::Root, &script)
        .await
        .with_context(|| format!("appending key to {file}"))?;
    if !output.status.success() {
        anyhow::bail!(
            "Failed to authorize key for {account}: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    tracing::info!(task = %name, outcome = "changed", key = %key.short(), "key authorized");
    reporter.success(&name);
    Ok((name, TaskOutcome::Changed { output: None }))
}

async fn verify_key_login(
    probe: &impl LoginProbe,
    reporter: &impl ProgressReporter,
    account: &str,
    host: &str,
    private_key: &Path,
) -> Result<()> {
    reporter.step(&format!("verifying key login as {account}..."));
    let output = probe
        .probe(account, private_key)
        .await
        .context("running key login probe")?;
    if !output.status.success() {
        tracing::error!(account, host, "key login probe failed");
        return Err(AccessError::KeyLoginUnverified {
            account: account.to_string(),
            host: host.to_string(),
            detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into());
    }
    reporter.success(&format!("key login as {account} works"));
    Ok(())
}

async fn harden_sshd(
    shell: &impl RemoteShell,
    reporter: &impl ProgressReporter,
    cfg: &AccessConfig,
    stamp: &str,
) -> Result<TaskOutcome> {
    let path = &cfg.sshd_config;
    let output = shell
        .query(&RunAs::Root, &format!("cat {}\n", quote(path)))
        .await
        .with_context(|| format!("reading {path}"))?;
    if !output.status.success() {
        anyhow::bail!(
            "Failed to read {path}: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    let current = String::from_utf8_lossy(&output.stdout);
    let edit = ensure_directive(&current, PASSWORD_AUTH_KEYWORD, "no");
    if !edit.changed {
        tracing::info!(task = SSHD_TASK, outcome = "skipped", "directive already set");
        reporter.success(&format!("{SSHD_TASK} (already in place)"));
        return Ok(TaskOutcome::Skipped);
    }

    reporter.step(&format!("{SSHD_TASK}..."));
    let backup = backup_path(path, stamp);
    let mut script = format!("{SCRIPT_PRELUDE}cp -p {} {}\n", quote(path), quote(&backup));
    script.push_str(&install_file_script(
        &FileSpec {
            path,
            mode: "0644",
            owner: Some("root:root"),
            validate: Some("sshd -t -f {}"),
        },
        &edit.content,
    ));
    script.push_str(&cfg.reload_command);
    script.push('\n');

    let output = shell
        .run_script(&RunAs::Root, &script)
        .await
        .with_context(|| format!("rewriting {path}"))?;
    if !output.status.success() {
        anyhow::bail!(
            "Failed to update {path}: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    tracing::info!(task = SSHD_TASK, outcome = "changed", backup = %backup, "sshd reloaded");
    reporter.success(&format!("{SSHD_TASK} (backup at {backup})"));
    Ok(TaskOutcome::Changed { output: None })
}
