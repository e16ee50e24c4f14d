//! Runtime-stage task list: build dependencies, OpenSSL from source, RVM,
//! Ruby and the final deployment.
//!
//! Every step except the deployment carries a guard so a re-run converges
//! without repeating downloads or builds.

use crate::domain::config::{DeployConfig, ProvisionConfig, RuntimeConfig};
use crate::domain::host::RunAs;
use crate::domain::task::{Guard, Task, quote, shell_path};

/// Line that loads RVM into a non-interactive shell.
pub const RVM_SOURCE: &str = "source \"$HOME/.rvm/scripts/rvm\"";

/// Path of the OpenSSL binary whose presence marks a finished build.
#[must_use]
pub fn openssl_binary(runtime: &RuntimeConfig) -> String {
    format!("{}/bin/openssl", runtime.openssl.prefix.trim_end_matches('/'))
}

/// The deployment command line.
///
/// `deploy_command("qa", "master", "rpx")` is
/// `cap qa deploy BRANCH=master USERNAME=rpx`.
#[must_use]
pub fn deploy_command(stage: &str, branch: &str, account: &str) -> String {
    format!(
        "cap {} deploy BRANCH={} USERNAME={}",
        quote(stage),
        quote(branch),
        quote(account)
    )
}

fn packages_task(runtime: &RuntimeConfig) -> Task {
    let packages = runtime
        .packages
        .iter()
        .map(|p| quote(p))
        .collect::<Vec<_>>()
        .join(" ");
    Task::new(
        "install build dependencies",
        RunAs::Root,
        format!(
            "export DEBIAN_FRONTEND=noninteractive\n\
             apt-get update -q\n\
             apt-get install -y -q {packages}"
        ),
    )
    .guarded(Guard::UnlessSucceeds(format!(
        "dpkg -s {packages} >/dev/null 2>&1"
    )))
}

fn openssl_task(runtime: &RuntimeConfig) -> Task {
    let openssl = &runtime.openssl;
    let src_dir = quote(&openssl.src_dir);
    let tarball = quote(&format!("openssl-{}.tar.gz", openssl.version));
    let tree = quote(&format!("openssl-{}", openssl.version));
    let prefix = quote(&openssl.prefix);
    Task::new(
        format!("build openssl {}", openssl.version),
        RunAs::Root,
        format!(
            "mkdir -p {src_dir}\n\
             cd {src_dir}\n\
             curl -fsSL -o {tarball} {url}\n\
             tar -xzf {tarball}\n\
             cd {tree}\n\
             ./config --prefix={prefix} --openssldir={prefix} shared zlib\n\
             make\n\
             make install",
            url = quote(&openssl.url()),
        ),
    )
    .guarded(Guard::UnlessExists(openssl_binary(runtime)))
}

fn gnupg_home_task(account: &str) -> Task {
    Task::new(
        "prepare gnupg home",
        RunAs::Account(account.to_string()),
        "install -d -m 0700 \"$HOME/.gnupg\"",
    )
    .guarded(Guard::UnlessExists("~/.gnupg".to_string()))
}

/// Key import is allowed to fail: keys may already be present, or the
/// keyserver may be unreachable while the URLs still work.
fn trust_import_task(runtime: &RuntimeConfig, account: &str) -> Task {
    let rvm = &runtime.rvm;
    let mut lines = Vec::new();
    if !rvm.gpg_keys.is_empty() {
        let keys = rvm
            .gpg_keys
            .iter()
            .map(|k| quote(k))
            .collect::<Vec<_>>()
            .join(" ");
        lines.push(format!(
            "gpg --batch --keyserver {} --recv-keys {keys} || status=1",
            quote(&rvm.keyserver)
        ));
    }
    for url in &rvm.key_urls {
        lines.push(format!(
            "curl -fsSL {} | gpg --batch --import - || status=1",
            quote(url)
        ));
    }
    let script = format!("status=0\n{}\nexit $status", lines.join("\n"));
    let task =
        Task::new("import rvm signing keys", RunAs::Account(account.to_string()), script).best_effort();
    if rvm.gpg_keys.is_empty() {
        return task;
    }
    let keys = rvm
        .gpg_keys
        .iter()
        .map(|k| quote(k))
        .collect::<Vec<_>>()
        .join(" ");
    task.guarded(Guard::UnlessSucceeds(format!(
        "gpg --batch --list-keys {keys} >/dev/null 2>&1"
    )))
}

fn rvm_task(runtime: &RuntimeConfig, account: &str) -> Task {
    Task::new(
        "install rvm",
        RunAs::Account(account.to_string()),
        format!(
            "curl -fsSL {} | bash -s stable",
            quote(&runtime.rvm.installer_url)
        ),
    )
    .guarded(Guard::UnlessExists("~/.rvm".to_string()))
}

fn ruby_task(runtime: &RuntimeConfig, account: &str) -> Task {
    let version = &runtime.ruby_version;
    Task::new(
        format!("install ruby {version}"),
        RunAs::Account(account.to_string()),
        format!(
            "{RVM_SOURCE}\nrvm install {} --with-openssl-dir={}",
            quote(version),
            quote(&runtime.openssl.prefix)
        ),
    )
    .guarded(Guard::UnlessExists(format!("~/.rvm/rubies/ruby-{version}")))
}

fn default_ruby_task(runtime: &RuntimeConfig, account: &str) -> Task {
    Task::new(
        format!("set ruby {} as default", runtime.ruby_version),
        RunAs::Account(account.to_string()),
        format!(
            "{RVM_SOURCE}\nrvm use {} --default",
            quote(&runtime.ruby_version)
        ),
    )
    .guarded(Guard::UnlessSucceeds(format!(
        "{RVM_SOURCE} && rvm alias show default 2>/dev/null | grep -qx {}",
        quote(&format!("ruby-{}", runtime.ruby_version))
    )))
}

fn verify_ruby_task(account: &str) -> Task {
    Task::new(
        "verify ruby",
        RunAs::Account(account.to_string()),
        format!("{RVM_SOURCE}\nrvm use default >/dev/null\nruby -v"),
    )
    .capture_output()
}

fn bundler_task(runtime: &RuntimeConfig, account: &str) -> Task {
    let (install, check) = match &runtime.bundler_version {
        Some(v) => (
            format!("gem install bundler -v {}", quote(v)),
            format!("gem list -i bundler -v {}", quote(v)),
        ),
        None => (
            "gem install bundler".to_string(),
            "gem list -i bundler".to_string(),
        ),
    };
    Task::new(
        "install bundler",
        RunAs::Account(account.to_string()),
        format!("{RVM_SOURCE}\nrvm use default >/dev/null\n{install}"),
    )
    .guarded(Guard::UnlessSucceeds(format!(
        "{RVM_SOURCE} && rvm use default >/dev/null && {check} >/dev/null"
    )))
}

/// The deployment task. Deliberately unguarded: every run deploys.
#[must_use]
pub fn deploy_task(deploy: &DeployConfig, account: &str) -> Task {
    let cd = deploy
        .workdir
        .as_deref()
        .map(|dir| format!("cd {}\n", shell_path(dir)))
        .unwrap_or_default();
    Task::new(
        format!("deploy {} ({})", deploy.stage, deploy.branch),
        RunAs::Account(account.to_string()),
        format!(
            "{RVM_SOURCE}\nrvm use default >/dev/null\n{cd}{}",
            deploy_command(&deploy.stage, &deploy.branch, account)
        ),
    )
    .capture_output()
}

/// The full runtime-stage task list in execution order.
#[must_use]
pub fn runtime_tasks(cfg: &ProvisionConfig) -> Vec<Task> {
    let runtime = &cfg.runtime;
    let account = cfg.runtime_account();
    let mut tasks = Vec::new();
    if !runtime.packages.is_empty() {
        tasks.push(packages_task(runtime));
    }
    tasks.extend([
        openssl_task(runtime),
        gnupg_home_task(account),
        trust_import_task(runtime, account),
        rvm_task(runtime, account),
        ruby_task(runtime, account),
        default_ruby_task(runtime, account),
        verify_ruby_task(account),
        bundler_task(runtime, account),
        deploy_task(&cfg.deploy, account),
    ]);
    tasks
}
