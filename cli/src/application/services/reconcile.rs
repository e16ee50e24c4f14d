//! Application service — "ensure task T holds on this host".
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use anyhow::{Context, Result};

use crate::application::ports::{ProgressReporter, RemoteShell};
use crate::domain::error::TaskError;
use crate::domain::task::{ExecMode, Task, TaskOutcome, action_script, guard_script};

/// Evaluate the task's guard and run its action when the guard does not hold.
///
/// # Errors
///
/// Returns an error if the host cannot be reached, or if a `Required`
/// action exits non-zero. `BestEffort` failures are returned as
/// `TaskOutcome::Tolerated`.
pub async fn reconcile(
    shell: &impl RemoteShell,
    task: &Task,
    reporter: &impl ProgressReporter,
) -> Result<TaskOutcome> {
    let host = shell.label();

    if let Some(check) = guard_script(&task.guard) {
        let output = shell
            .query(&task.run_as, &check)
            .await
            .with_context(|| format!("checking guard for '{}'", task.name))?;
        if output.status.success() {
            tracing::info!(task = %task.name, host = %host, outcome = "skipped", "guard holds");
            reporter.success(&format!("{} (already in place)", task.name));
            return Ok(TaskOutcome::Skipped);
        }
    }

    reporter.step(&format!("{}...", task.name));
    tracing::debug!(task = %task.name, host = %host, run_as = %task.run_as, "running action");
    let output = shell
        .run_script(&task.run_as, &action_script(task))
        .await
        .with_context(|| format!("running '{}' on {host}", task.name))?;

    if output.status.success() {
        tracing::info!(task = %task.name, host = %host, outcome = "changed", "action succeeded");
        reporter.success(&task.name);
        let captured = task
            .capture
            .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string());
        return Ok(TaskOutcome::Changed { output: captured });
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let Some(code) = output.status.code() else {
        return Err(TaskError::Terminated {
            task: task.name.clone(),
            host,
        }
        .into());
    };

    match task.mode {
        ExecMode::BestEffort => {
            tracing::warn!(
                task = %task.name,
                host = %host,
                code,
                outcome = "tolerated",
                "best-effort action failed"
            );
            reporter.warn(&format!("{} failed (exit {code}), continuing", task.name));
            Ok(TaskOutcome::Tolerated { code, stderr })
        }
        ExecMode::Required => {
            tracing::error!(task = %task.name, host = %host, code, "required action failed");
            Err(TaskError::Failed {
                task: task.name.clone(),
                host,
                code,
                stderr,
            }
            .into())
        }
    }
}
