//! Tests for the `reconcile` primitive: guard evaluation and failure modes.

#![allow(clippy::expect_used)]

use std::process::Output;

use rollout_cli::application::services::reconcile::reconcile;
use rollout_cli::domain::task::SCRIPT_PRELUDE;
use rollout_cli::domain::{Guard, RunAs, Task, TaskError, TaskOutcome};

use crate::helpers::{err_output, ok_output, signalled};
use crate::mocks::{Kind, NoopReporter, RecordingReporter, ScriptedShell};

fn build_task() -> Task {
    Task::new("build thing", RunAs::Root, "make install")
        .guarded(Guard::UnlessExists("/opt/thing/bin/thing".to_string()))
}

#[tokio::test]
async fn test_reconcile_guard_holds_skips_action() {
    let shell = ScriptedShell::new("web1").on_query("test -e /opt/thing/bin/thing", ok_output(b""));

    let outcome = reconcile(&shell, &build_task(), &NoopReporter)
        .await
        .expect("reconcile");

    assert_eq!(outcome, TaskOutcome::Skipped);
    assert!(shell.run_scripts().is_empty(), "action must not run");
}

#[tokio::test]
async fn test_reconcile_guard_fails_runs_action_with_prelude() {
    let shell = ScriptedShell::new("web1");

    let outcome = reconcile(&shell, &build_task(), &NoopReporter)
        .await
        .expect("reconcile");

    assert_eq!(outcome, TaskOutcome::Changed { output: None });
    let scripts = shell.run_scripts();
    assert_eq!(scripts.len(), 1);
    assert!(scripts[0].starts_with(SCRIPT_PRELUDE));
    assert!(scripts[0].contains("make install"));
}

#[tokio::test]
async fn test_reconcile_always_guard_never_queries() {
    let shell = ScriptedShell::new("web1");
    let task = Task::new("deploy", RunAs::Account("rpx".to_string()), "cap qa deploy");

    reconcile(&shell, &task, &NoopReporter).await.expect("reconcile");

    let calls = shell.calls();
    assert!(calls.iter().all(|c| c.kind == Kind::Run));
    assert_eq!(calls[0].run_as, RunAs::Account("rpx".to_string()));
}

#[tokio::test]
async fn test_reconcile_guard_runs_as_task_principal() {
    let shell = ScriptedShell::new("web1");
    let task = Task::new("install rvm", RunAs::Account("rpx".to_string()), "curl | bash")
        .guarded(Guard::UnlessExists("~/.rvm".to_string()));

    reconcile(&shell, &task, &NoopReporter).await.expect("reconcile");

    let query = shell
        .calls()
        .into_iter()
        .find(|c| c.kind == Kind::Query)
        .expect("guard query");
    assert_eq!(query.run_as, RunAs::Account("rpx".to_string()));
    assert_eq!(query.script, "test -e \"$HOME\"/.rvm\n");
}

#[tokio::test]
async fn test_reconcile_required_failure_is_fatal() {
    let shell = ScriptedShell::new("web1").on_run("make install", err_output(2, b"make: *** Error 2"));

    let err = reconcile(&shell, &build_task(), &NoopReporter)
        .await
        .expect_err("required failure");

    match err.downcast_ref::<TaskError>() {
        Some(TaskError::Failed {
            task,
            host,
            code,
            stderr,
        }) => {
            assert_eq!(task, "build thing");
            assert_eq!(host, "web1");
            assert_eq!(*code, 2);
            assert!(stderr.contains("Error 2"));
        }
        other => panic!("expected TaskError::Failed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_reconcile_best_effort_failure_is_tolerated() {
    let shell = ScriptedShell::new("web1").on_run("gpg", err_output(2, b"keyserver receive failed"));
    let reporter = RecordingReporter::default();
    let task = Task::new("import keys", RunAs::Account("rpx".to_string()), "gpg --recv-keys X")
        .best_effort();

    let outcome = reconcile(&shell, &task, &reporter).await.expect("tolerated");

    assert_eq!(
        outcome,
        TaskOutcome::Tolerated {
            code: 2,
            stderr: "keyserver receive failed".to_string()
        }
    );
    assert_eq!(reporter.warnings().len(), 1);
}

#[tokio::test]
async fn test_reconcile_captures_stdout_when_asked() {
    let shell = ScriptedShell::new("web1").on_run("ruby -v", ok_output(b"ruby 2.3.8p459\n"));
    let task = Task::new("verify ruby", RunAs::Account("rpx".to_string()), "ruby -v").capture_output();

    let outcome = reconcile(&shell, &task, &NoopReporter).await.expect("reconcile");

    assert_eq!(
        outcome,
        TaskOutcome::Changed {
            output: Some("ruby 2.3.8p459".to_string())
        }
    );
}

#[tokio::test]
async fn test_reconcile_killed_action_is_fatal_even_when_best_effort() {
    let killed = Output {
        status: signalled(9),
        stdout: Vec::new(),
        stderr: Vec::new(),
    };
    let shell = ScriptedShell::new("web1").on_run("gpg", killed);
    let task = Task::new("import keys", RunAs::Root, "gpg").best_effort();

    let err = reconcile(&shell, &task, &NoopReporter)
        .await
        .expect_err("terminated");

    assert!(matches!(
        err.downcast_ref::<TaskError>(),
        Some(TaskError::Terminated { .. })
    ));
}
