//! Lifecycle resource kinds, manifest builders and status accessors.

pub mod kinds;
pub mod manifests;
pub mod status;

pub use kinds::{ResourceKind, resource_label};
