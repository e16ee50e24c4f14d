//! Domain layer — pure provisioning logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod access;
pub mod config;
pub mod credentials;
pub mod error;
pub mod host;
pub mod plan;
pub mod report;
pub mod runtime;
pub mod task;

pub use config::{ProvisionConfig, StageSelection, validate_account_name, validate_config};
pub use credentials::{KeyPair, PublicKey};
pub use error::{AccessError, ConfigError, CredentialError, TaskError};
pub use host::{HostConfig, RunAs};
pub use plan::{PlannedStage, PlannedTask, plan};
pub use report::{PipelineReport, Stage, StageReport, TaskRecord};
pub use task::{ExecMode, Guard, Task, TaskOutcome};
