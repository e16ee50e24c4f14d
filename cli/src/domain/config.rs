//! Domain types and validators for the provisioning configuration.
//!
//! Pure functions only: no I/O, no async, no filesystem access.

use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::credentials::MIN_KEY_BITS;
use crate::domain::error::ConfigError;
use crate::domain::host::HostConfig;

static ACCOUNT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z_][a-z0-9_-]{0,31}$").unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

static VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9A-Za-z][0-9A-Za-z._-]*$")
        .unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

// ── Config schema ────────────────────────────────────────────────────────────

/// Top-level configuration, usually `rollout.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProvisionConfig {
    pub credentials: CredentialsConfig,
    pub access: AccessConfig,
    pub runtime: RuntimeConfig,
    pub deploy: DeployConfig,
    pub execution: ExecutionConfig,
}

/// Control-node key pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Private key path; `~` expands to the operator's home.
    pub private_key: String,
    pub bits: u32,
    /// Comment embedded in the generated public key.
    pub comment: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            private_key: "~/.ssh/id_rsa".to_string(),
            bits: MIN_KEY_BITS,
            comment: "rollout".to_string(),
        }
    }
}

/// The provisioned operating-system account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AccountConfig {
    pub name: String,
    pub shell: String,
    pub groups: Vec<String>,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            name: "rpx".to_string(),
            shell: "/bin/bash".to_string(),
            groups: vec!["sudo".to_string()],
        }
    }
}

/// Access stage: account, key installation, sshd hardening.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    pub host: Option<HostConfig>,
    pub account: AccountConfig,
    /// Probe key-based login before disabling password authentication.
    pub verify_key_login: bool,
    pub sshd_config: String,
    pub reload_command: String,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            host: None,
            account: AccountConfig::default(),
            verify_key_login: true,
            sshd_config: "/etc/ssh/sshd_config".to_string(),
            reload_command: "systemctl reload ssh || systemctl reload sshd".to_string(),
        }
    }
}

/// Runtime stage: build dependencies, OpenSSL, RVM and Ruby.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub host: Option<HostConfig>,
    /// Account owning RVM; defaults to `access.account.name`.
    pub account: Option<String>,
    pub packages: Vec<String>,
    pub openssl: OpensslConfig,
    pub rvm: RvmConfig,
    pub ruby_version: String,
    /// Pin for `gem install bundler -v`.
    pub bundler_version: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            host: None,
            account: None,
            packages: [
                "build-essential",
                "curl",
                "git",
                "gnupg2",
                "libreadline-dev",
                "libyaml-dev",
                "libffi-dev",
                "zlib1g-dev",
                "autoconf",
                "bison",
                "libgdbm-dev",
                "libncurses5-dev",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            openssl: OpensslConfig::default(),
            rvm: RvmConfig::default(),
            ruby_version: "2.3.8".to_string(),
            bundler_version: Some("1.17.3".to_string()),
        }
    }
}

/// Custom OpenSSL build.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpensslConfig {
    pub version: String,
    /// Install prefix; also passed to Ruby as `--with-openssl-dir`.
    pub prefix: String,
    /// Source URL; `{version}` is substituted.
    pub source_url: String,
    pub src_dir: String,
}

impl Default for OpensslConfig {
    fn default() -> Self {
        Self {
            version: "1.0.2u".to_string(),
            prefix: "/usr/local/openssl-1.0.2u".to_string(),
            source_url: "https://www.openssl.org/source/old/1.0.2/openssl-{version}.tar.gz"
                .to_string(),
            src_dir: "/usr/local/src".to_string(),
        }
    }
}

impl OpensslConfig {
    /// Source tarball URL with the version substituted.
    #[must_use]
    pub fn url(&self) -> String {
        self.source_url.replace("{version}", &self.version)
    }
}

/// RVM installation and its trust material.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RvmConfig {
    pub keyserver: String,
    pub gpg_keys: Vec<String>,
    pub key_urls: Vec<String>,
    pub installer_url: String,
}

impl Default for RvmConfig {
    fn default() -> Self {
        Self {
            keyserver: "hkp://keyserver.ubuntu.com".to_string(),
            gpg_keys: vec![
                "409B6B1796C275462A1703113804BB82D39DC0E3".to_string(),
                "7D2BAF1CF37B13E2069D6956105BD0E739499BDB".to_string(),
            ],
            key_urls: vec![
                "https://rvm.io/mpapis.asc".to_string(),
                "https://rvm.io/pkuczynski.asc".to_string(),
            ],
            installer_url: "https://get.rvm.io".to_string(),
        }
    }
}

/// Final deployment invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Capistrano stage, e.g. `qa`.
    pub stage: String,
    pub branch: String,
    /// Application checkout to run `cap` from; the account's home if unset.
    pub workdir: Option<String>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            stage: "qa".to_string(),
            branch: "master".to_string(),
            workdir: None,
        }
    }
}

/// Process execution limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Upper bound for a single task script (builds included).
    pub task_timeout_secs: u64,
    /// Upper bound for guard checks, reads and the login probe.
    pub probe_timeout_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            task_timeout_secs: 3600,
            probe_timeout_secs: 30,
        }
    }
}

impl ProvisionConfig {
    /// Account that owns the runtime installation.
    #[must_use]
    pub fn runtime_account(&self) -> &str {
        self.runtime
            .account
            .as_deref()
            .unwrap_or(&self.access.account.name)
    }

    /// Warnings for settings that are legal but probably unintended.
    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.runtime_account() != self.access.account.name {
            warnings.push(format!(
                "runtime account '{}' differs from the credentialed account '{}'",
                self.runtime_account(),
                self.access.account.name
            ));
        }
        if !self.access.verify_key_login {
            warnings.push(
                "access.verify_key_login is off: password login is disabled without a key probe"
                    .to_string(),
            );
        }
        warnings
    }
}

// ── Validators ───────────────────────────────────────────────────────────────

/// Which stages a run will execute; determines which hosts are required.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSelection {
    pub credentials: bool,
    pub access: bool,
    pub runtime: bool,
}

impl StageSelection {
    pub const ALL: Self = Self {
        credentials: true,
        access: true,
        runtime: true,
    };
}

/// Validates an account name against the portable `useradd` rules.
///
/// # Errors
///
/// Returns an error if the name is not a valid account name.
pub fn validate_account_name(name: &str) -> Result<()> {
    if !ACCOUNT_NAME.is_match(name) {
        return Err(ConfigError::InvalidAccountName(name.to_string()).into());
    }
    Ok(())
}

fn invalid(key: &str, value: &str, hint: &str) -> anyhow::Error {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        hint: hint.to_string(),
    }
    .into()
}

/// Validates the configuration for the selected stages.
///
/// # Errors
///
/// Returns the first invalid setting found.
pub fn validate_config(cfg: &ProvisionConfig, selection: StageSelection) -> Result<()> {
    if selection.credentials {
        if cfg.credentials.bits < MIN_KEY_BITS {
            return Err(invalid(
                "credentials.bits",
                &cfg.credentials.bits.to_string(),
                "RSA keys must be at least 2048 bits",
            ));
        }
        if cfg.credentials.private_key.trim().is_empty() {
            return Err(invalid("credentials.private_key", "", "a key path is required"));
        }
    }

    if selection.access {
        validate_account_name(&cfg.access.account.name)?;
        let host = cfg.access.host.as_ref().ok_or(ConfigError::MissingHost {
            stage: "access",
            key: "access.host",
        })?;
        validate_host("access.host", host)?;
        if !cfg.access.sshd_config.starts_with('/') {
            return Err(invalid(
                "access.sshd_config",
                &cfg.access.sshd_config,
                "must be an absolute path",
            ));
        }
    }

    if selection.runtime {
        validate_account_name(cfg.runtime_account())?;
        let host = cfg.runtime.host.as_ref().ok_or(ConfigError::MissingHost {
            stage: "runtime",
            key: "runtime.host",
        })?;
        validate_host("runtime.host", host)?;
        for (key, value) in [
            ("runtime.openssl.version", cfg.runtime.openssl.version.as_str()),
            ("runtime.ruby_version", cfg.runtime.ruby_version.as_str()),
        ] {
            if !VERSION.is_match(value) {
                return Err(invalid(key, value, "expected a version such as 1.0.2u or 2.3.8"));
            }
        }
        if !cfg.runtime.openssl.prefix.starts_with('/') {
            return Err(invalid(
                "runtime.openssl.prefix",
                &cfg.runtime.openssl.prefix,
                "must be an absolute path",
            ));
        }
        if cfg.deploy.branch.trim().is_empty() || cfg.deploy.stage.trim().is_empty() {
            return Err(invalid(
                "deploy",
                &format!("{}/{}", cfg.deploy.stage, cfg.deploy.branch),
                "deploy.stage and deploy.branch must be set",
            ));
        }
    }

    if cfg.execution.task_timeout_secs == 0 || cfg.execution.probe_timeout_secs == 0 {
        return Err(invalid("execution", "0", "timeouts must be positive"));
    }
    Ok(())
}

fn validate_host(key: &str, host: &HostConfig) -> Result<()> {
    if host.address.trim().is_empty() {
        return Err(invalid(&format!("{key}.address"), "", "a hostname or IP is required"));
    }
    if host.port == 0 {
        return Err(invalid(&format!("{key}.port"), "0", "port must be 1-65535"));
    }
    validate_account_name(&host.user)
        .map_err(|_| invalid(&format!("{key}.user"), &host.user, "not a valid login name"))
}

// ── Unit tests ───────────────────────────────────────────────────────────────
