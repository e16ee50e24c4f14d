//! `rollout run` — all three stages, in order.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::commands::{Overrides, execute_and_render};
use crate::domain::config::StageSelection;

/// Arguments for the run command.
#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub overrides: Overrides,
}

/// Entry point for `rollout run`.
///
/// # Errors
///
/// Returns the first fatal stage error; later stages do not run.
pub async fn run(app: &AppContext, args: &RunArgs) -> Result<ExitCode> {
    execute_and_render(app, &args.overrides, StageSelection::ALL).await
}
