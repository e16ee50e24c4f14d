//! `rollout plan` — list what a run would do, without contacting any host.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::ports::ConfigStore;
use crate::commands::Overrides;
use crate::domain::config::StageSelection;
use crate::domain::plan::plan;

/// Arguments for the plan command.
#[derive(Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub overrides: Overrides,
}

/// Entry point for `rollout plan`.
///
/// The config is not validated: a plan is useful while hosts are still
/// being filled in.
///
/// # Errors
///
/// Returns an error if the config file cannot be read.
pub fn run(app: &AppContext, args: &PlanArgs) -> Result<ExitCode> {
    let mut cfg = app.config_store.load()?;
    args.overrides.apply(&mut cfg);
    app.renderer().render_plan(&plan(&cfg, StageSelection::ALL))?;
    Ok(ExitCode::SUCCESS)
}
