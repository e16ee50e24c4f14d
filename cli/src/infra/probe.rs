//! `LoginProbe` that attempts a real key-only SSH login.

use std::path::Path;
use std::process::Output;
use std::time::Duration;

use anyhow::Result;

use crate::application::ports::{CommandRunner, LoginProbe};
use crate::domain::host::{Connection, HostConfig, login_probe_argv};

pub struct SshLoginProbe<'a, R> {
    runner: &'a R,
    host: HostConfig,
    timeout: Duration,
}

impl<'a, R: CommandRunner> SshLoginProbe<'a, R> {
    #[must_use]
    pub fn new(runner: &'a R, host: HostConfig, timeout: Duration) -> Self {
        Self {
            runner,
            host,
            timeout,
        }
    }
}

impl<R: CommandRunner> LoginProbe for SshLoginProbe<'_, R> {
    async fn probe(&self, account: &str, private_key: &Path) -> Result<Output> {
        let mut host = self.host.clone();
        if host.connection == Connection::Local {
            // A local target is still reached over sshd for the probe.
            "localhost".clone_into(&mut host.address);
        }
        let launch = login_probe_argv(&host, account, &private_key.display().to_string());
        tracing::info!(account, host = %host.address, "probing key login");
        self.runner
            .run_with_timeout(&launch.program, &launch.arg_refs(), self.timeout)
            .await
    }
}
