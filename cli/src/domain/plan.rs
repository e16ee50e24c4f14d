//! Dry-run view of a provisioning run: what would execute, where, and under
//! which guard. Nothing here contacts a host.

use serde::Serialize;

use crate::domain::access::{
    PASSWORD_AUTH_KEYWORD, account_task, group_membership_task, sudoers_task,
};
use crate::domain::config::{ProvisionConfig, StageSelection};
use crate::domain::host::HostConfig;
use crate::domain::report::Stage;
use crate::domain::runtime::runtime_tasks;
use crate::domain::task::{ExecMode, Task, describe_guard};

/// One planned step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedTask {
    pub task: String,
    pub run_as: String,
    pub guard: String,
    pub best_effort: bool,
}

impl PlannedTask {
    fn from_task(task: &Task) -> Self {
        Self {
            task: task.name.clone(),
            run_as: task.run_as.to_string(),
            guard: describe_guard(&task.guard),
            best_effort: task.mode == ExecMode::BestEffort,
        }
    }

    fn step(task: impl Into<String>, run_as: &str, guard: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            run_as: run_as.to_string(),
            guard: guard.into(),
            best_effort: false,
        }
    }
}

/// Planned steps of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStage {
    pub stage: Stage,
    pub host: String,
    pub tasks: Vec<PlannedTask>,
}

fn host_label(host: Option<&HostConfig>) -> String {
    host.map_or_else(|| "(no host configured)".to_string(), HostConfig::label)
}

/// Build the plan for the selected stages.
#[must_use]
pub fn plan(cfg: &ProvisionConfig, selection: StageSelection) -> Vec<PlannedStage> {
    let mut stages = Vec::new();

    if selection.credentials || selection.access {
        stages.push(PlannedStage {
            stage: Stage::Credentials,
            host: "local".to_string(),
            tasks: vec![PlannedTask::step(
                format!("ensure RSA-{} key pair", cfg.credentials.bits),
                "operator",
                format!("unless {} exists", cfg.credentials.private_key),
            )],
        });
    }

    if selection.access {
        let access = &cfg.access;
        let name = &access.account.name;
        let mut tasks = vec![PlannedTask::from_task(&account_task(&access.account))];
        if let Some(task) = group_membership_task(&access.account) {
            tasks.push(PlannedTask::from_task(&task));
        }
        tasks.push(PlannedTask::step(
            format!("authorize key for {name}"),
            "root",
            "unless the key is already in authorized_keys",
        ));
        tasks.push(PlannedTask::from_task(&sudoers_task(name)));
        if access.verify_key_login {
            tasks.push(PlannedTask::step(
                format!("verify key login as {name}"),
                name,
                "always",
            ));
        }
        tasks.push(PlannedTask::step(
            "disable password authentication",
            "root",
            format!(
                "unless {} already sets {PASSWORD_AUTH_KEYWORD} no",
                access.sshd_config
            ),
        ));
        stages.push(PlannedStage {
            stage: Stage::Access,
            host: host_label(access.host.as_ref()),
            tasks,
        });
    }

    if selection.runtime {
        stages.push(PlannedStage {
            stage: Stage::Runtime,
            host: host_label(cfg.runtime.host.as_ref()),
            tasks: runtime_tasks(cfg).iter().map(PlannedTask::from_task).collect(),
        });
    }

    stages
}
