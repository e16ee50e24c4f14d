//! Tests for the access stage, in particular the ordering guarantee that sshd
//! is only tightened after key login has been proven.

#![allow(clippy::expect_used)]

use std::path::Path;

use rollout_cli::application::services::access::{
    AccessRequest, LoginCheck, SSHD_TASK, provision_access,
};
use rollout_cli::domain::access::PASSWORD_AUTH_KEYWORD;
use rollout_cli::domain::config::AccessConfig;
use rollout_cli::domain::task::SCRIPT_PRELUDE;
use rollout_cli::domain::{AccessError, PublicKey, RunAs, TaskOutcome};

use crate::helpers::{
    PASSWD_RPX, SSHD_CONFIG, count_active_directive, err_output, ok_output, public_key,
};
use crate::mocks::{CannedProbe, NoopReporter, RecordingReporter, ScriptedShell};

const STAMP: &str = "20261019T120000Z";
const PRIVATE: &str = "/home/operator/.ssh/id_rsa";

/// A fresh host: no account yet, empty authorized_keys, stock sshd_config.
fn fresh_host() -> ScriptedShell {
    ScriptedShell::new("10.0.0.5")
        .on_query("getent passwd", ok_output(PASSWD_RPX))
        .on_query("authorized_keys", ok_output(b""))
        .on_query("cat /etc/ssh/sshd_config", ok_output(SSHD_CONFIG.as_bytes()))
}

fn request<'a>(cfg: &'a AccessConfig, key: &'a PublicKey, check: LoginCheck) -> AccessRequest<'a> {
    AccessRequest {
        cfg,
        key,
        private_key: Path::new(PRIVATE),
        login_check: check,
        stamp: STAMP,
    }
}

/// The new sshd_config embedded in the hardening script.
fn installed_sshd_config(script: &str) -> String {
    let start = script.find("printf '%s' ").expect("printf") + "printf '%s' ".len();
    let end = script
        .find(" > /etc/ssh/sshd_config.rollout-tmp\n")
        .expect("staged redirect");
    let words = shlex::split(&script[start..end]).expect("quoted content");
    assert_eq!(words.len(), 1);
    words.into_iter().next().expect("content")
}

#[tokio::test]
async fn test_fresh_host_runs_all_steps_in_order() {
    let shell = fresh_host();
    let probe = CannedProbe::accepting();
    let cfg = AccessConfig::default();
    let key = public_key(1);

    let report = provision_access(&shell, &probe, &NoopReporter, &request(&cfg, &key, LoginCheck::Probe))
        .await
        .expect("access");

    let scripts = shell.run_scripts();
    let position = |needle: &str| {
        scripts
            .iter()
            .position(|s| s.contains(needle))
            .unwrap_or_else(|| panic!("no script contains {needle}"))
    };
    assert!(position("useradd -m -s /bin/bash -G sudo rpx") < position("usermod -a -G sudo rpx"));
    assert!(position("usermod") < position(">> /home/rpx/.ssh/authorized_keys"));
    assert!(position("authorized_keys") < position("visudo -cf"));
    assert!(position("visudo -cf") < position("sshd -t -f"));
    assert_eq!(probe.call_count(), 1);
    assert_eq!(
        probe.calls.lock().expect("lock")[0],
        ("rpx".to_string(), Path::new(PRIVATE).to_path_buf())
    );

    assert_eq!(report.tasks.len(), 5);
    assert_eq!(report.changed(), 5);
    assert_eq!(report.host, "10.0.0.5");
}

#[tokio::test]
async fn test_all_access_scripts_run_as_root() {
    let shell = fresh_host();
    let cfg = AccessConfig::default();
    let key = public_key(1);

    provision_access(&shell, &CannedProbe::accepting(), &NoopReporter, &request(&cfg, &key, LoginCheck::Probe))
        .await
        .expect("access");

    assert!(shell.calls().iter().all(|c| c.run_as == RunAs::Root));
    assert!(
        shell.run_scripts().iter().all(|s| s.starts_with(SCRIPT_PRELUDE)),
        "every write must stop at the first failing command"
    );
}

#[tokio::test]
async fn test_sshd_ends_with_exactly_one_directive_and_a_backup() {
    let shell = fresh_host();
    let cfg = AccessConfig::default();
    let key = public_key(1);

    let report = provision_access(&shell, &CannedProbe::accepting(), &NoopReporter, &request(&cfg, &key, LoginCheck::Probe))
        .await
        .expect("access");

    let script = shell
        .run_scripts()
        .into_iter()
        .find(|s| s.contains("sshd -t -f"))
        .expect("sshd script");
    let backup = "cp -p /etc/ssh/sshd_config /etc/ssh/sshd_config.20261019T120000Z.bak";
    let install = script.find("mv -f").expect("install");
    assert!(script.find(backup).expect("backup") < install, "backup precedes install");
    assert!(script.find("systemctl reload ssh").expect("reload") > install);

    let content = installed_sshd_config(&script);
    assert_eq!(count_active_directive(&content, PASSWORD_AUTH_KEYWORD), 1);
    assert!(content.contains("PasswordAuthentication no\n"));
    assert!(content.contains("Subsystem sftp"));
    assert_eq!(
        report.outcome(SSHD_TASK),
        Some(&TaskOutcome::Changed { output: None })
    );
}

#[tokio::test]
async fn test_failed_probe_leaves_sshd_untouched() {
    let shell = fresh_host();
    let probe = CannedProbe::rejecting("rpx@10.0.0.5: Permission denied (publickey).");
    let cfg = AccessConfig::default();
    let key = public_key(1);

    let err = provision_access(&shell, &probe, &NoopReporter, &request(&cfg, &key, LoginCheck::Probe))
        .await
        .expect_err("probe must fail the stage");

    match err.downcast_ref::<AccessError>() {
        Some(AccessError::KeyLoginUnverified { account, detail, .. }) => {
            assert_eq!(account, "rpx");
            assert!(detail.contains("Permission denied"));
        }
        other => panic!("expected KeyLoginUnverified, got {other:?}"),
    }
    assert!(!shell.ran("sshd_config"), "sshd_config must not be modified");
    assert!(
        shell.calls().iter().all(|c| !c.script.contains("cat /etc/ssh/sshd_config")),
        "sshd_config is not even read"
    );
    assert!(shell.ran("visudo -cf"), "earlier steps still ran");
}

#[tokio::test]
async fn test_waived_probe_warns_and_proceeds() {
    let shell = fresh_host();
    let probe = CannedProbe::rejecting("unused");
    let reporter = RecordingReporter::default();
    let cfg = AccessConfig::default();
    let key = public_key(1);

    provision_access(&shell, &probe, &reporter, &request(&cfg, &key, LoginCheck::Waived))
        .await
        .expect("waived");

    assert_eq!(probe.call_count(), 0);
    assert!(shell.ran("sshd -t -f"));
    assert!(reporter.warnings().iter().any(|w| w.contains("not verified")));
}

#[tokio::test]
async fn test_converged_host_only_rewrites_sudoers() {
    let key = public_key(1);
    let authorized = format!("ssh-rsa AAAAother a@b\n{}", key.authorized_line());
    let hardened = SSHD_CONFIG.replace("#PasswordAuthentication yes", "PasswordAuthentication no");
    let shell = ScriptedShell::new("10.0.0.5")
        .on_query("id -u rpx", ok_output(b""))
        .on_query("id -nG rpx", ok_output(b""))
        .on_query("getent passwd", ok_output(PASSWD_RPX))
        .on_query("authorized_keys", ok_output(authorized.as_bytes()))
        .on_query("cat /etc/ssh/sshd_config", ok_output(hardened.as_bytes()));
    let cfg = AccessConfig::default();

    let report = provision_access(&shell, &CannedProbe::accepting(), &NoopReporter, &request(&cfg, &key, LoginCheck::Probe))
        .await
        .expect("access");

    let scripts = shell.run_scripts();
    assert_eq!(scripts.len(), 1, "only sudoers is rewritten: {scripts:?}");
    assert!(scripts[0].contains("/etc/sudoers.d/rpx"));
    assert_eq!(report.skipped(), 4);
    assert_eq!(report.outcome(SSHD_TASK), Some(&TaskOutcome::Skipped));
}

#[tokio::test]
async fn test_hardened_sshd_with_commented_default_is_not_reloaded() {
    let key = public_key(1);
    let hardened = SSHD_CONFIG.replace(
        "#PasswordAuthentication yes\n",
        "#PasswordAuthentication yes\nPasswordAuthentication no\n",
    );
    let shell = ScriptedShell::new("10.0.0.5")
        .on_query("getent passwd", ok_output(PASSWD_RPX))
        .on_query("authorized_keys", ok_output(b""))
        .on_query("cat /etc/ssh/sshd_config", ok_output(hardened.as_bytes()));
    let cfg = AccessConfig::default();

    let report = provision_access(&shell, &CannedProbe::accepting(), &NoopReporter, &request(&cfg, &key, LoginCheck::Probe))
        .await
        .expect("access");

    assert_eq!(report.outcome(SSHD_TASK), Some(&TaskOutcome::Skipped));
    assert!(
        shell.run_scripts().iter().all(|s| !s.contains("sshd_config")),
        "sshd_config must not be touched"
    );
}

#[tokio::test]
async fn test_key_match_ignores_comment_and_options() {
    let key = public_key(1);
    let line = key.authorized_line();
    let material = line.split_whitespace().nth(1).expect("material");
    let authorized = format!("no-pty ssh-rsa {material} a-different-comment\n");
    let shell = ScriptedShell::new("10.0.0.5")
        .on_query("getent passwd", ok_output(PASSWD_RPX))
        .on_query("authorized_keys", ok_output(authorized.as_bytes()))
        .on_query("cat /etc/ssh/sshd_config", ok_output(SSHD_CONFIG.as_bytes()));
    let cfg = AccessConfig::default();

    provision_access(&shell, &CannedProbe::accepting(), &NoopReporter, &request(&cfg, &key, LoginCheck::Probe))
        .await
        .expect("access");

    assert!(!shell.ran(">> /home/rpx/.ssh/authorized_keys"));
}

#[tokio::test]
async fn test_missing_passwd_entry_is_fatal() {
    let shell = ScriptedShell::new("10.0.0.5").on_query("getent passwd", err_output(2, b""));
    let cfg = AccessConfig::default();
    let key = public_key(1);

    let err = provision_access(&shell, &CannedProbe::accepting(), &NoopReporter, &request(&cfg, &key, LoginCheck::Probe))
        .await
        .expect_err("no home");

    assert!(matches!(
        err.downcast_ref::<AccessError>(),
        Some(AccessError::NoHomeDirectory(name)) if name == "rpx"
    ));
}

#[tokio::test]
async fn test_sshd_validation_failure_is_fatal() {
    let shell = fresh_host().on_run("sshd -t -f", err_output(255, b"line 3: Bad configuration option"));
    let cfg = AccessConfig::default();
    let key = public_key(1);

    let err = provision_access(&shell, &CannedProbe::accepting(), &NoopReporter, &request(&cfg, &key, LoginCheck::Probe))
        .await
        .expect_err("invalid config");

    assert!(format!("{err:#}").contains("Bad configuration option"));
}

#[tokio::test]
async fn test_custom_account_flows_through_every_step() {
    let shell = ScriptedShell::new("10.0.0.5")
        .on_query("getent passwd", ok_output(b"deploy:x:1002:1002::/srv/deploy:/bin/bash\n"))
        .on_query("authorized_keys", ok_output(b""))
        .on_query("cat /etc/ssh/sshd_config", ok_output(SSHD_CONFIG.as_bytes()));
    let mut cfg = AccessConfig::default();
    cfg.account.name = "deploy".to_string();
    cfg.account.groups.clear();
    let key = public_key(1);
    let probe = CannedProbe::accepting();

    let report = provision_access(&shell, &probe, &NoopReporter, &request(&cfg, &key, LoginCheck::Probe))
        .await
        .expect("access");

    assert!(shell.ran("useradd -m -s /bin/bash deploy"));
    assert!(shell.ran(">> /srv/deploy/.ssh/authorized_keys"));
    assert!(shell.ran("/etc/sudoers.d/deploy"));
    assert!(!shell.ran("usermod"));
    assert_eq!(probe.calls.lock().expect("lock")[0].0, "deploy");
    assert_eq!(report.tasks.len(), 4);
}
