//! Operator installation backends.
//!
//! The orchestrator installs each version through an [`OperatorBackend`]
//! selected once from `operatorConfig.type`:
//!
//! - `operatorhub`: publishes the bundle and drives the lifecycle resources
//!   through the reconciler
//! - `local`: runs a deploy command in the workspace

pub mod local;
pub mod operatorhub;

use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio_util::sync::CancellationToken;

use crate::client::ResourceClient;
use crate::config::{Config, OperatorType, Version};
use crate::controller::error::{Error, Result};
use crate::controller::{Context, LifecycleReconciler};
use crate::exec::CommandRunner;

pub use local::LocalBackend;
pub use operatorhub::OperatorHubBackend;

/// Installs one version of the operator under test.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait OperatorBackend: Send + Sync {
    /// Install `version` and return once it is running.
    async fn install_version(&self, version: &Version) -> Result<()>;

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}

/// Build the backend selected by the configuration.
///
/// The operatorhub backend needs a resource client; the local one does not.
pub fn build_backend(
    config: &Config,
    client: Option<Arc<dyn ResourceClient>>,
    runner: Arc<dyn CommandRunner>,
    cancel: CancellationToken,
) -> Result<Arc<dyn OperatorBackend>> {
    let op = &config.operator_config;
    match op.kind {
        OperatorType::OperatorHub => {
            let client = client.ok_or_else(|| {
                Error::Configuration("the operatorhub backend requires cluster access".into())
            })?;
            let reconciler = LifecycleReconciler::new(Context::new(client, op, cancel));
            Ok(Arc::new(OperatorHubBackend::new(reconciler)))
        }
        OperatorType::Local => Ok(Arc::new(LocalBackend::new(
            runner,
            op.workspace.clone(),
            op.command.clone(),
        ))),
    }
}
