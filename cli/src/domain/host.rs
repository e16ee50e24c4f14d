//! Host connection parameters and the argv used to reach a shell on them.
//!
//! Pure functions only: the script itself is always piped on stdin, so the
//! argv built here never contains user-controlled shell text.

use serde::{Deserialize, Serialize};

/// How a target host is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Connection {
    /// Over `ssh` (default).
    #[default]
    Ssh,
    /// Directly on the machine running `rollout`.
    Local,
}

/// A target host as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Hostname or IP address.
    pub address: String,
    /// SSH port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Remote login user used by `rollout` itself.
    #[serde(default = "default_login_user")]
    pub user: String,
    /// Identity file passed to `ssh -i`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<String>,
    /// Transport.
    #[serde(default)]
    pub connection: Connection,
    /// Elevate with `sudo -n`. Disable only when logging in as root.
    #[serde(default = "default_true")]
    pub sudo: bool,
}

impl HostConfig {
    /// Build a host entry with default port, user and transport.
    #[must_use]
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            port: default_port(),
            user: default_login_user(),
            identity_file: None,
            connection: Connection::Ssh,
            sudo: true,
        }
    }

    /// `user@address`, the form `ssh` expects.
    #[must_use]
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.address)
    }

    /// Label used in logs and reports.
    #[must_use]
    pub fn label(&self) -> String {
        match self.connection {
            Connection::Ssh => self.address.clone(),
            Connection::Local => "local".to_string(),
        }
    }
}

fn default_port() -> u16 {
    22
}

fn default_login_user() -> String {
    "root".to_string()
}

fn default_true() -> bool {
    true
}

/// The identity a task runs as on its host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "name")]
pub enum RunAs {
    /// Superuser.
    Root,
    /// A named, non-root account; runs in a login shell so profile
    /// scripts (e.g. version managers) are loaded.
    Account(String),
}

impl std::fmt::Display for RunAs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Root => f.write_str("root"),
            Self::Account(name) => f.write_str(name),
        }
    }
}

/// Program and arguments that start a shell reading its script from stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    pub program: String,
    pub args: Vec<String>,
}

impl Launch {
    /// Borrowed view of the arguments, for `CommandRunner` calls.
    #[must_use]
    pub fn arg_refs(&self) -> Vec<&str> {
        self.args.iter().map(String::as_str).collect()
    }
}

/// Words of the command that starts the shell on the target itself.
fn shell_words(host: &HostConfig, run_as: &RunAs) -> Vec<String> {
    let words: &[&str] = match (run_as, host.sudo) {
        (RunAs::Root, true) => &["sudo", "-n", "bash", "-s"],
        (RunAs::Root, false) => &["bash", "-s"],
        (RunAs::Account(name), true) => {
            return ["sudo", "-n", "-H", "-u", name.as_str(), "bash", "-l", "-s"]
                .iter()
                .map(ToString::to_string)
                .collect();
        }
        (RunAs::Account(_), false) => &["bash", "-l", "-s"],
    };
    words.iter().map(ToString::to_string).collect()
}

/// Build the argv that opens a shell on `host` as `run_as`.
///
/// For SSH hosts the remote words are joined into the single command string
/// `ssh` forwards; account names are validated upstream so no quoting is
/// needed there.
#[must_use]
pub fn launch_argv(host: &HostConfig, run_as: &RunAs) -> Launch {
    let words = shell_words(host, run_as);
    match host.connection {
        Connection::Local => {
            let mut words = words.into_iter();
            let program = words.next().unwrap_or_else(|| "bash".to_string());
            Launch {
                program,
                args: words.collect(),
            }
        }
        Connection::Ssh => {
            let mut args = vec![
                "-p".to_string(),
                host.port.to_string(),
                "-o".to_string(),
                "BatchMode=yes".to_string(),
                "-o".to_string(),
                "StrictHostKeyChecking=accept-new".to_string(),
            ];
            if let Some(identity) = &host.identity_file {
                args.push("-i".to_string());
                args.push(identity.clone());
            }
            args.push(host.destination());
            args.push("--".to_string());
            args.push(words.join(" "));
            Launch {
                program: "ssh".to_string(),
                args,
            }
        }
    }
}

/// Build the argv for a non-interactive key-only login probe.
///
/// Succeeds only when `account` can log in to `host` with `private_key`
/// and no password fallback.
#[must_use]
pub fn login_probe_argv(host: &HostConfig, account: &str, private_key: &str) -> Launch {
    Launch {
        program: "ssh".to_string(),
        args: vec![
            "-p".to_string(),
            host.port.to_string(),
            "-i".to_string(),
            private_key.to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "PasswordAuthentication=no".to_string(),
            "-o".to_string(),
            "IdentitiesOnly=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-o".to_string(),
            "ConnectTimeout=10".to_string(),
            format!("{account}@{}", host.address),
            "--".to_string(),
            "true".to_string(),
        ],
    }
}
