//! `rollout runtime` — toolchain and deployment on the runtime host.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::commands::{Overrides, execute_and_render};
use crate::domain::config::StageSelection;

/// Arguments for the runtime command.
#[derive(Args)]
pub struct RuntimeArgs {
    #[command(flatten)]
    pub overrides: Overrides,
}

/// Entry point for `rollout runtime`.
///
/// # Errors
///
/// Returns the first required task failure.
pub async fn run(app: &AppContext, args: &RuntimeArgs) -> Result<ExitCode> {
    let selection = StageSelection {
        credentials: false,
        access: false,
        runtime: true,
    };
    execute_and_render(app, &args.overrides, selection).await
}
