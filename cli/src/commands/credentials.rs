//! `rollout credentials` — ensure the key pair and print its public key.

use std::process::ExitCode;

use anyhow::Result;

use crate::app::AppContext;
use crate::commands::{Overrides, execute, load_config, public_key_path};
use crate::domain::config::StageSelection;

const SELECTION: StageSelection = StageSelection {
    credentials: true,
    access: false,
    runtime: false,
};

/// Entry point for `rollout credentials`.
///
/// # Errors
///
/// Returns an error if the key pair cannot be created or read.
pub async fn run(app: &AppContext) -> Result<ExitCode> {
    let cfg = load_config(app, &Overrides::default(), SELECTION)?;
    let report = execute(app, &cfg, SELECTION).await?;
    let Some(key) = report.public_key.as_deref() else {
        anyhow::bail!("credential stage produced no public key");
    };
    app.renderer()
        .render_public_key(key, &public_key_path(app, &cfg)?)?;
    Ok(ExitCode::SUCCESS)
}
