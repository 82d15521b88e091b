//! Lifecycle-manager backend.

use async_trait::async_trait;
use tracing::info;

use crate::config::Version;
use crate::controller::LifecycleReconciler;
use crate::controller::error::{Result, ResultExt};

use super::OperatorBackend;

/// Installs versions by publishing bundles and subscribing through the
/// lifecycle manager.
#[derive(Debug, Clone)]
pub struct OperatorHubBackend {
    reconciler: LifecycleReconciler,
}

impl OperatorHubBackend {
    pub fn new(reconciler: LifecycleReconciler) -> Self {
        Self { reconciler }
    }
}

#[async_trait]
impl OperatorBackend for OperatorHubBackend {
    async fn install_version(&self, version: &Version) -> Result<()> {
        let bundle = version
            .bundle_reference()
            .with_context(|| format!("version {}", version.name))?;
        let installed = self.reconciler.install(&bundle, version.channel()).await?;
        info!(
            version = %version.name,
            operator = %installed.operator_name,
            csv = %installed.version_id,
            "Version installed"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "operatorhub"
    }
}
