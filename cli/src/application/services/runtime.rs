//! Application service — runtime stage.

use anyhow::Result;

use crate::application::ports::{ProgressReporter, RemoteShell};
use crate::application::services::reconcile::reconcile;
use crate::domain::report::{Stage, StageReport};
use crate::domain::task::{Task, TaskOutcome};

/// Reconcile `tasks` in order, stopping at the first required failure.
///
/// # Errors
///
/// Returns the first `Required` task failure.
pub async fn provision_runtime(
    shell: &impl RemoteShell,
    reporter: &impl ProgressReporter,
    tasks: &[Task],
) -> Result<StageReport> {
    let mut report = StageReport::new(Stage::Runtime, shell.label());
    for task in tasks {
        let outcome = reconcile(shell, task, reporter).await?;
        if let TaskOutcome::Changed {
            output: Some(output),
        } = &outcome
            && !output.is_empty()
        {
            reporter.success(&format!("{}: {output}", task.name));
        }
        report.record(task.name.clone(), outcome);
    }
    Ok(report)
}
