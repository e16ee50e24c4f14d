//! Run reports: what each stage did, task by task.

use serde::Serialize;

use crate::domain::task::TaskOutcome;

/// The three provisioning stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Credentials,
    Access,
    Runtime,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Credentials => "credentials",
            Self::Access => "access",
            Self::Runtime => "runtime",
        })
    }
}

/// One reconciled task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskRecord {
    pub task: String,
    #[serde(flatten)]
    pub outcome: TaskOutcome,
}

/// Everything one stage did on its host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub host: String,
    pub tasks: Vec<TaskRecord>,
}

impl StageReport {
    #[must_use]
    pub fn new(stage: Stage, host: impl Into<String>) -> Self {
        Self {
            stage,
            host: host.into(),
            tasks: Vec::new(),
        }
    }

    pub fn record(&mut self, task: impl Into<String>, outcome: TaskOutcome) {
        self.tasks.push(TaskRecord {
            task: task.into(),
            outcome,
        });
    }

    /// Outcome of the named task, if it ran in this stage.
    #[must_use]
    pub fn outcome(&self, task: &str) -> Option<&TaskOutcome> {
        self.tasks.iter().find(|r| r.task == task).map(|r| &r.outcome)
    }

    /// Number of tasks whose action ran.
    #[must_use]
    pub fn changed(&self) -> usize {
        self.tasks
            .iter()
            .filter(|r| matches!(r.outcome, TaskOutcome::Changed { .. }))
            .count()
    }

    /// Number of tasks skipped by their guard.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.tasks
            .iter()
            .filter(|r| r.outcome == TaskOutcome::Skipped)
            .count()
    }

    /// Number of tolerated best-effort failures.
    #[must_use]
    pub fn tolerated(&self) -> usize {
        self.tasks
            .iter()
            .filter(|r| matches!(r.outcome, TaskOutcome::Tolerated { .. }))
            .count()
    }
}

/// The whole run, in stage order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub stages: Vec<StageReport>,
    /// Public key handed from the credential stage to the access stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

impl PipelineReport {
    #[must_use]
    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }
}
