//! Operator lifecycle reconciler.
//!
//! Contains the reconciler, the per-installation state machine, bounded
//! polling and error handling.
//!
//! - `bundle`: artifact, artifact version and catalog visibility
//! - `subscription`: subscription, install plan and CSV

pub mod bundle;
pub mod context;
pub mod error;
pub mod install_state_machine;
pub mod poll;
pub mod reconciler;
pub mod subscription;

pub use bundle::BundleInstall;
pub use context::Context;
pub use error::{Error, Result};
pub use install_state_machine::{InstallEvent, InstallPhase, InstallTracker};
pub use poll::{PollSettings, await_condition};
pub use reconciler::LifecycleReconciler;
