//! `RemoteShell` over SSH or a local shell.
//!
//! Scripts travel on stdin to `bash -s`, so nothing a task renders ever
//! becomes part of the `ssh` argv.

use std::process::Output;
use std::time::Duration;

use anyhow::Result;

use crate::application::ports::{CommandRunner, RemoteShell};
use crate::domain::config::ExecutionConfig;
use crate::domain::host::{HostConfig, RunAs, launch_argv};

/// Shell on one configured host.
pub struct HostShell<'a, R> {
    runner: &'a R,
    host: HostConfig,
    task_timeout: Duration,
    probe_timeout: Duration,
}

impl<'a, R: CommandRunner> HostShell<'a, R> {
    #[must_use]
    pub fn new(runner: &'a R, host: HostConfig, execution: &ExecutionConfig) -> Self {
        Self {
            runner,
            host,
            task_timeout: Duration::from_secs(execution.task_timeout_secs),
            probe_timeout: Duration::from_secs(execution.probe_timeout_secs),
        }
    }

    async fn exec(&self, run_as: &RunAs, script: &str, timeout: Duration) -> Result<Output> {
        let launch = launch_argv(&self.host, run_as);
        tracing::debug!(
            host = %self.host.label(),
            run_as = %run_as,
            program = %launch.program,
            "opening shell"
        );
        self.runner
            .run_with_stdin(&launch.program, &launch.arg_refs(), script.as_bytes(), timeout)
            .await
    }
}

impl<R: CommandRunner> RemoteShell for HostShell<'_, R> {
    fn label(&self) -> String {
        self.host.label()
    }

    async fn run_script(&self, run_as: &RunAs, script: &str) -> Result<Output> {
        self.exec(run_as, script, self.task_timeout).await
    }

    async fn query(&self, run_as: &RunAs, script: &str) -> Result<Output> {
        self.exec(run_as, script, self.probe_timeout).await
    }
}
