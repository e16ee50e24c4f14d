//! Application service — the three-stage provisioning pipeline.
//!
//! Stages run strictly in order and the first fatal error halts the run.
//! The public key produced by the credential stage is passed to the access
//! stage as a value.

use anyhow::{Context, Result};
use tracing::Instrument;

use crate::application::ports::{CommandRunner, LocalFs, LoginProbe, ProgressReporter, RemoteShell};
use crate::application::services::access::{AccessRequest, LoginCheck, provision_access};
use crate::application::services::credentials::ensure_key_pair;
use crate::application::services::runtime::provision_runtime;
use crate::domain::config::{ProvisionConfig, StageSelection};
use crate::domain::credentials::{KeyPair, expand_tilde};
use crate::domain::error::ConfigError;
use crate::domain::report::PipelineReport;
use crate::domain::runtime::runtime_tasks;

/// Ports the pipeline drives. Shells are `None` when their stage has no
/// host configured.
pub struct PipelinePorts<'a, C, F, S, P, R> {
    pub runner: &'a C,
    pub fs: &'a F,
    pub access_shell: Option<&'a S>,
    pub runtime_shell: Option<&'a S>,
    pub probe: &'a P,
    pub reporter: &'a R,
}

/// Per-run options.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub selection: StageSelection,
    pub login_check: LoginCheck,
    /// UTC timestamp for backups written during this run.
    pub stamp: String,
}

/// Resolve the configured key pair against the operator's home.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn key_pair(fs: &impl LocalFs, cfg: &ProvisionConfig) -> Result<KeyPair> {
    let home = fs.home_dir()?;
    let private = expand_tilde(std::path::Path::new(&cfg.credentials.private_key), &home);
    Ok(KeyPair::at(private, cfg.credentials.bits))
}

/// Run the selected stages in order.
///
/// The access stage always runs the credential stage first, since it needs
/// the public key.
///
/// # Errors
///
/// Returns the first fatal stage error; later stages do not run.
pub async fn run_pipeline<C, F, S, P, R>(
    ports: &PipelinePorts<'_, C, F, S, P, R>,
    cfg: &ProvisionConfig,
    options: &PipelineOptions,
) -> Result<PipelineReport>
where
    C: CommandRunner,
    F: LocalFs,
    S: RemoteShell,
    P: LoginProbe,
    R: ProgressReporter,
{
    let mut report = PipelineReport::default();
    let selection = options.selection;

    let mut key = None;
    let pair = key_pair(ports.fs, cfg)?;
    if selection.credentials || selection.access {
        let outcome = ensure_key_pair(
            ports.runner,
            ports.fs,
            &pair,
            &cfg.credentials.comment,
            ports.reporter,
        )
        .instrument(tracing::info_span!("stage", stage = "credentials"))
        .await
        .context("credential stage failed")?;
        report.public_key = Some(outcome.public_key.authorized_line());
        report.stages.push(outcome.report);
        key = Some(outcome.public_key);
    }

    if selection.access {
        let shell = ports.access_shell.ok_or(ConfigError::MissingHost {
            stage: "access",
            key: "access.host",
        })?;
        let Some(key) = key.as_ref() else {
            anyhow::bail!("access stage requires the credential stage");
        };
        let request = AccessRequest {
            cfg: &cfg.access,
            key,
            private_key: &pair.private,
            login_check: options.login_check,
            stamp: &options.stamp,
        };
        let stage = provision_access(shell, ports.probe, ports.reporter, &request)
            .instrument(tracing::info_span!("stage", stage = "access", host = %shell.label()))
            .await
            .context("access stage failed")?;
        report.stages.push(stage);
    }

    if selection.runtime {
        let shell = ports.runtime_shell.ok_or(ConfigError::MissingHost {
            stage: "runtime",
            key: "runtime.host",
        })?;
        let tasks = runtime_tasks(cfg);
        let stage = provision_runtime(shell, ports.reporter, &tasks)
            .instrument(tracing::info_span!("stage", stage = "runtime", host = %shell.label()))
            .await
            .context("runtime stage failed")?;
        report.stages.push(stage);
    }

    Ok(report)
}
