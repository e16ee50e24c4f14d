//! The reconciliation unit: a named action guarded by a desired-state check.
//!
//! A `Task` says "ensure R is in state S". Its `Guard` is evaluated first on
//! the target; when the guard already holds the action is skipped. Pure data
//! and script builders only: execution lives in
//! `application::services::reconcile`.

use serde::Serialize;

use crate::domain::host::RunAs;

/// Desired-state check evaluated before a task's action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Guard {
    /// No check; the action runs every time.
    Always,
    /// Skip when this path exists. A leading `~/` resolves against the
    /// principal's `$HOME`.
    UnlessExists(String),
    /// Skip when this shell snippet exits zero.
    UnlessSucceeds(String),
}

/// How a non-zero exit of the action is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecMode {
    /// Failure halts the run.
    Required,
    /// Failure is recorded and the run continues.
    BestEffort,
}

/// One step of a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub name: String,
    pub run_as: RunAs,
    pub guard: Guard,
    pub script: String,
    pub mode: ExecMode,
    /// Keep the action's stdout in the outcome (for reporting).
    pub capture: bool,
}

impl Task {
    /// A required, unguarded task.
    #[must_use]
    pub fn new(name: impl Into<String>, run_as: RunAs, script: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            run_as,
            guard: Guard::Always,
            script: script.into(),
            mode: ExecMode::Required,
            capture: false,
        }
    }

    #[must_use]
    pub fn guarded(mut self, guard: Guard) -> Self {
        self.guard = guard;
        self
    }

    #[must_use]
    pub fn best_effort(mut self) -> Self {
        self.mode = ExecMode::BestEffort;
        self
    }

    #[must_use]
    pub fn capture_output(mut self) -> Self {
        self.capture = true;
        self
    }
}

/// Result of reconciling one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum TaskOutcome {
    /// Guard held; nothing ran.
    Skipped,
    /// The action ran and succeeded.
    Changed {
        #[serde(skip_serializing_if = "Option::is_none")]
        output: Option<String>,
    },
    /// A best-effort action failed and was tolerated.
    Tolerated { code: i32, stderr: String },
}

impl TaskOutcome {
    /// Short label for human output.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Skipped => "ok",
            Self::Changed { .. } => "changed",
            Self::Tolerated { .. } => "tolerated",
        }
    }
}

/// Prelude of every action script.
pub const SCRIPT_PRELUDE: &str = "set -eo pipefail\n";

/// Render a path for a shell word, expanding a leading `~/` to `$HOME`.
#[must_use]
pub fn shell_path(path: &str) -> String {
    match path.strip_prefix("~/") {
        Some(rest) if rest.is_empty() => "\"$HOME\"".to_string(),
        Some(rest) => format!("\"$HOME\"/{}", quote(rest)),
        None if path == "~" => "\"$HOME\"".to_string(),
        None => quote(path),
    }
}

/// Shell-quote one word.
///
/// Input containing NUL bytes cannot be represented in a shell word and is
/// replaced with an empty word.
#[must_use]
pub fn quote(word: &str) -> String {
    shlex::try_quote(word).map_or_else(|_| "''".to_string(), |q| q.into_owned())
}

/// Script that exits zero when the guard holds, or `None` for `Guard::Always`.
#[must_use]
pub fn guard_script(guard: &Guard) -> Option<String> {
    match guard {
        Guard::Always => None,
        Guard::UnlessExists(path) => Some(format!("test -e {}\n", shell_path(path))),
        Guard::UnlessSucceeds(check) => Some(format!("{check}\n")),
    }
}

/// The action script with the fail-fast prelude applied.
#[must_use]
pub fn action_script(task: &Task) -> String {
    let mut script = String::from(SCRIPT_PRELUDE);
    script.push_str(&task.script);
    if !script.ends_with('\n') {
        script.push('\n');
    }
    script
}

/// Describe a guard for `rollout plan`.
#[must_use]
pub fn describe_guard(guard: &Guard) -> String {
    match guard {
        Guard::Always => "always".to_string(),
        Guard::UnlessExists(path) => format!("unless {path} exists"),
        Guard::UnlessSucceeds(check) => format!("unless `{}`", check.trim()),
    }
}
