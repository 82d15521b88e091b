//! upgrade-test library crate
//!
//! Drives end-to-end upgrade tests of an operator managed by the cluster's
//! lifecycle manager: publish a bundle version, subscribe and approve its
//! install plan, wait for the installed version, then hand off to an
//! external test command before moving to the next version of the path.
//!
//! - `client`: generic cluster resource access
//! - `config`: the YAML run configuration
//! - `controller`: the lifecycle reconciler
//! - `exec`: external command execution
//! - `operator`: installation backends
//! - `orchestrator`: path and version sequencing
//! - `resources`: lifecycle resource kinds, manifests and status accessors
//! - `retry`: bounded exponential backoff
//! - `source`: git checkout and build of version sources

pub mod client;
pub mod config;
pub mod controller;
pub mod exec;
pub mod operator;
pub mod orchestrator;
pub mod resources;
pub mod retry;
pub mod source;

pub use client::{KubeResourceClient, ResourceClient};
pub use config::Config;
pub use controller::{Error, Result};
pub use exec::{CommandRunner, ShellRunner};
pub use operator::{OperatorBackend, build_backend};
pub use orchestrator::{RunReport, UpgradeRunner};
