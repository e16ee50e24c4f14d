//! Human-readable terminal renderer.

use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::OwoColorize as _;

use crate::domain::config::ProvisionConfig;
use crate::domain::plan::PlannedStage;
use crate::domain::report::{PipelineReport, StageReport};
use crate::domain::task::TaskOutcome;
use crate::output::OutputContext;

/// Renders domain types as human-readable terminal output using `OutputContext`.
pub struct HumanRenderer<'a> {
    ctx: &'a OutputContext,
}

impl<'a> HumanRenderer<'a> {
    /// Create a new `HumanRenderer` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    /// Render the end-of-run summary, one block per stage.
    pub fn render_report(&self, report: &PipelineReport) {
        if self.ctx.quiet {
            return;
        }
        println!();
        for stage in &report.stages {
            self.render_stage(stage);
        }
    }

    fn render_stage(&self, stage: &StageReport) {
        self.ctx.header(&format!("{} @ {}", stage.stage, stage.host));
        for record in &stage.tasks {
            let label = format!("{:<9}", record.outcome.label());
            let styled = match &record.outcome {
                TaskOutcome::Skipped => label.style(self.ctx.styles.dim).to_string(),
                TaskOutcome::Changed { .. } => label.style(self.ctx.styles.success).to_string(),
                TaskOutcome::Tolerated { .. } => label.style(self.ctx.styles.warning).to_string(),
            };
            println!("    {styled} {}", record.task);
            if let TaskOutcome::Tolerated { code, stderr } = &record.outcome {
                let detail = stderr.lines().last().unwrap_or_default();
                println!("              exit {code}: {detail}");
            }
        }
        self.ctx.kv(
            "Summary:",
            &format!(
                "{} changed, {} unchanged, {} tolerated",
                stage.changed(),
                stage.skipped(),
                stage.tolerated()
            ),
        );
        println!();
    }

    /// Render the configuration and where it was loaded from.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized.
    pub fn render_config(&self, config: &ProvisionConfig, path: &Path) -> Result<()> {
        let source = if path.exists() {
            path.display().to_string()
        } else {
            format!("{} (not found, showing defaults)", path.display())
        };
        self.ctx.kv("Config:", &source);
        println!();
        let yaml = serde_yaml::to_string(config).context("cannot serialize config")?;
        for line in yaml.lines() {
            println!("  {line}");
        }
        for warning in config.warnings() {
            self.ctx.warn(&warning);
        }
        Ok(())
    }

    /// Print the public key line. Never suppressed: it is the command's
    /// output, meant to be piped.
    pub fn render_public_key(&self, key: &str, path: &Path) {
        if !self.ctx.quiet {
            self.ctx.kv("Public key:", &path.display().to_string());
        }
        println!("{key}");
    }

    /// Render a dry-run plan.
    pub fn render_plan(&self, stages: &[PlannedStage]) {
        for stage in stages {
            println!(
                "  {}",
                format!("{} @ {}", stage.stage, stage.host).style(self.ctx.styles.header)
            );
            for (i, task) in stage.tasks.iter().enumerate() {
                let mode = if task.best_effort { " [best effort]" } else { "" };
                println!(
                    "    {:>2}. {} {}{}",
                    i + 1,
                    task.task,
                    format!("(as {}, {})", task.run_as, task.guard).style(self.ctx.styles.dim),
                    mode.style(self.ctx.styles.warning)
                );
            }
            println!();
        }
    }
}
