//! `rollout config` — show, initialise and locate the configuration file.

use std::process::ExitCode;

use anyhow::Result;
use clap::Subcommand;

use crate::app::AppContext;
use crate::application::ports::ConfigStore;

/// Config subcommands.
#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,
    /// Write a commented starter config
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the resolved config file path
    Path,
}

/// Run the config command.
///
/// # Errors
///
/// Returns an error if the config cannot be read or written.
pub fn run(app: &AppContext, cmd: ConfigCommand) -> Result<ExitCode> {
    match cmd {
        ConfigCommand::Show => show_config(app),
        ConfigCommand::Init { force } => init_config(app, force),
        ConfigCommand::Path => {
            let path = app.config_store.path()?;
            if app.is_json() {
                println!("{}", serde_json::json!({ "path": path.display().to_string() }));
            } else {
                println!("{}", path.display());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn show_config(app: &AppContext) -> Result<ExitCode> {
    let config = app.config_store.load()?;
    let path = app.config_store.path()?;
    app.renderer().render_config(&config, &path)?;
    Ok(ExitCode::SUCCESS)
}

fn init_config(app: &AppContext, force: bool) -> Result<ExitCode> {
    let path = app.config_store.path()?;
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists. Use --force to overwrite.",
            path.display()
        );
    }
    app.config_store.save_raw(STARTER_CONFIG)?;
    app.output.success(&format!("Wrote {}", path.display()));
    app.output
        .info("Set access.host and runtime.host, then run: rollout plan");
    Ok(ExitCode::SUCCESS)
}

/// Starter configuration written by `rollout config init`.
pub const STARTER_CONFIG: &str = r#"# rollout configuration
#
# Every key is optional; the values below are the defaults.

credentials:
  # Control-node key pair. Never overwritten once it exists.
  private_key: ~/.ssh/id_rsa
  bits: 2048
  comment: rollout

access:
  # Host on which the account is created and sshd is hardened.
  # host:
  #   address: 203.0.113.10
  #   port: 22
  #   user: root
  #   identity_file: ~/.ssh/bootstrap
  #   connection: ssh      # or: local
  #   sudo: true
  account:
    name: rpx
    shell: /bin/bash
    groups: [sudo]
  # Probe key login before disabling PasswordAuthentication.
  verify_key_login: true
  sshd_config: /etc/ssh/sshd_config
  reload_command: systemctl reload ssh || systemctl reload sshd

runtime:
  # host:
  #   address: 203.0.113.10
  # Account owning RVM; defaults to access.account.name.
  # account: rpx
  openssl:
    version: 1.0.2u
    prefix: /usr/local/openssl-1.0.2u
    source_url: https://www.openssl.org/source/old/1.0.2/openssl-{version}.tar.gz
    src_dir: /usr/local/src
  rvm:
    keyserver: hkp://keyserver.ubuntu.com
    gpg_keys:
      - 409B6B1796C275462A1703113804BB82D39DC0E3
      - 7D2BAF1CF37B13E2069D6956105BD0E739499BDB
    key_urls:
      - https://rvm.io/mpapis.asc
      - https://rvm.io/pkuczynski.asc
    installer_url: https://get.rvm.io
  ruby_version: 2.3.8
  bundler_version: 1.17.3

deploy:
  stage: qa
  branch: master
  # Application checkout to run cap from.
  # workdir: ~/app

execution:
  task_timeout_secs: 3600
  probe_timeout_secs: 30
"#;
