//! `rollout access` — credentials then access on the access host.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::commands::{Overrides, execute_and_render};
use crate::domain::config::StageSelection;

/// Arguments for the access command.
#[derive(Args)]
pub struct AccessArgs {
    /// Account to provision (overrides `access.account.name`)
    #[arg(long)]
    pub account: Option<String>,
}

/// Entry point for `rollout access`.
///
/// # Errors
///
/// Returns the first fatal error. A failed login probe leaves sshd_config
/// untouched.
pub async fn run(app: &AppContext, args: &AccessArgs) -> Result<ExitCode> {
    let overrides = Overrides {
        account: args.account.clone(),
        branch: None,
    };
    let selection = StageSelection {
        credentials: true,
        access: true,
        runtime: false,
    };
    execute_and_render(app, &overrides, selection).await
}
