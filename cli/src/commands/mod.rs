//! Command implementations

pub mod access;
pub mod config;
pub mod credentials;
pub mod plan;
pub mod run;
pub mod runtime;
pub mod version;

use std::process::ExitCode;

use anyhow::Result;
use chrono::Utc;
use clap::Args;

use crate::app::AppContext;
use crate::application::ports::ConfigStore;
use crate::application::services::access::LoginCheck;
use crate::application::services::pipeline::{
    PipelineOptions, PipelinePorts, key_pair, run_pipeline,
};
use crate::domain::config::{ProvisionConfig, StageSelection, validate_config};
use crate::domain::error::AccessError;
use crate::domain::host::HostConfig;
use crate::domain::report::PipelineReport;
use crate::infra::probe::SshLoginProbe;
use crate::infra::shell::HostShell;

/// Account and branch overrides shared by the stage commands.
#[derive(Args, Debug, Clone, Default)]
pub struct Overrides {
    /// Account to provision (overrides `access.account.name`)
    #[arg(long)]
    pub account: Option<String>,

    /// Branch to deploy (overrides `deploy.branch`)
    #[arg(long)]
    pub branch: Option<String>,
}

impl Overrides {
    /// Apply to a loaded config. An account override names the one account
    /// used by every stage.
    pub fn apply(&self, cfg: &mut ProvisionConfig) {
        if let Some(account) = &self.account {
            cfg.access.account.name.clone_from(account);
            cfg.runtime.account = None;
        }
        if let Some(branch) = &self.branch {
            cfg.deploy.branch.clone_from(branch);
        }
    }
}

/// Load the config, apply overrides and validate it for `selection`.
///
/// # Errors
///
/// Returns an error if the config cannot be read or is invalid.
pub(crate) fn load_config(
    app: &AppContext,
    overrides: &Overrides,
    selection: StageSelection,
) -> Result<ProvisionConfig> {
    let mut cfg = app.config_store.load()?;
    overrides.apply(&mut cfg);
    validate_config(&cfg, selection)?;
    for warning in cfg.warnings() {
        tracing::warn!(%warning, "config");
        app.output.warn(&warning);
    }
    Ok(cfg)
}

/// Decide how key login is confirmed before sshd is tightened.
fn login_check(app: &AppContext, cfg: &ProvisionConfig, selection: StageSelection) -> Result<LoginCheck> {
    if !selection.access || cfg.access.verify_key_login {
        return Ok(LoginCheck::Probe);
    }
    let host = cfg
        .access
        .host
        .as_ref()
        .map_or_else(|| "the access host".to_string(), HostConfig::label);
    let proceed = app.non_interactive
        || app.confirm(
            &format!(
                "Disable password authentication on {host} without verifying key login?"
            ),
            false,
        )?;
    if !proceed {
        return Err(AccessError::PolicyDeclined.into());
    }
    Ok(LoginCheck::Waived)
}

/// Run the selected stages against the configured hosts.
///
/// # Errors
///
/// Returns the first fatal stage error.
pub(crate) async fn execute(
    app: &AppContext,
    cfg: &ProvisionConfig,
    selection: StageSelection,
) -> Result<PipelineReport> {
    let options = PipelineOptions {
        selection,
        login_check: login_check(app, cfg, selection)?,
        stamp: Utc::now().format("%Y%m%dT%H%M%SZ").to_string(),
    };

    let access_shell = cfg
        .access
        .host
        .clone()
        .map(|host| HostShell::new(&app.runner, host, &cfg.execution));
    let runtime_shell = cfg
        .runtime
        .host
        .clone()
        .map(|host| HostShell::new(&app.runner, host, &cfg.execution));
    let probe = SshLoginProbe::new(
        &app.runner,
        cfg.access.host.clone().unwrap_or_else(|| HostConfig::new("localhost")),
        std::time::Duration::from_secs(cfg.execution.probe_timeout_secs),
    );
    let reporter = app.reporter();

    let ports = PipelinePorts {
        runner: &app.runner,
        fs: &app.fs,
        access_shell: access_shell.as_ref(),
        runtime_shell: runtime_shell.as_ref(),
        probe: &probe,
        reporter: &reporter,
    };
    tracing::info!(
        credentials = selection.credentials,
        access = selection.access,
        runtime = selection.runtime,
        "starting run"
    );
    let report = run_pipeline(&ports, cfg, &options).await?;
    tracing::info!(stages = report.stages.len(), "run finished");
    Ok(report)
}

/// Run the stages and render the report.
///
/// # Errors
///
/// Returns the first fatal stage error.
pub(crate) async fn execute_and_render(
    app: &AppContext,
    overrides: &Overrides,
    selection: StageSelection,
) -> Result<ExitCode> {
    let cfg = load_config(app, overrides, selection)?;
    let report = execute(app, &cfg, selection).await?;
    app.renderer().render_report(&report)?;
    Ok(ExitCode::SUCCESS)
}

/// Resolved key pair for display purposes.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub(crate) fn public_key_path(app: &AppContext, cfg: &ProvisionConfig) -> Result<std::path::PathBuf> {
    Ok(key_pair(&app.fs, cfg)?.public)
}
