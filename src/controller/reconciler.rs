//! Operator lifecycle reconciler.
//!
//! Drives one version installation from bundle tag to running operator:
//! publish the bundle version, confirm catalog visibility, then subscribe,
//! approve and wait for the CSV. Each installation gets its own
//! [`InstallTracker`].

use std::time::Instant;

use tracing::{error, info, instrument};

use crate::config::BundleReference;

use super::bundle::{self, BundleInstall};
use super::context::Context;
use super::error::Result;
use super::install_state_machine::InstallTracker;
use super::subscription;

/// Reconciles lifecycle resources for one operator.
#[derive(Debug, Clone)]
pub struct LifecycleReconciler {
    ctx: Context,
}

impl LifecycleReconciler {
    /// Create a reconciler over `ctx`.
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Publish `bundle` and return the operator name and installable version id.
    pub async fn install_bundle_version(
        &self,
        bundle: &BundleReference,
        tracker: &mut InstallTracker,
    ) -> Result<BundleInstall> {
        bundle::install_bundle_version(&self.ctx, bundle, tracker).await
    }

    /// Subscribe to `version_id` on `channel` and wait until it is installed.
    pub async fn install_subscription(
        &self,
        operator_name: &str,
        version_id: &str,
        channel: &str,
        tracker: &mut InstallTracker,
    ) -> Result<()> {
        subscription::install_subscription(&self.ctx, operator_name, version_id, channel, tracker)
            .await
    }

    /// Fully install `bundle` from `channel`.
    #[instrument(skip(self, bundle), fields(tag = %bundle.tag()))]
    pub async fn install(&self, bundle: &BundleReference, channel: &str) -> Result<BundleInstall> {
        let start_time = Instant::now();
        let mut tracker = InstallTracker::new(bundle.tag());

        let result: Result<BundleInstall> = async {
            let installed = self.install_bundle_version(bundle, &mut tracker).await?;
            self.install_subscription(
                &installed.operator_name,
                &installed.version_id,
                channel,
                &mut tracker,
            )
            .await?;
            Ok(installed)
        }
        .await;

        let elapsed_ms = start_time.elapsed().as_millis() as u64;
        match &result {
            Ok(installed) => info!(
                operator = %installed.operator_name,
                version = %installed.version_id,
                phase = %tracker.phase(),
                elapsed_ms,
                "Installation complete"
            ),
            Err(e) => error!(
                error = %e,
                category = e.category(),
                phase = %tracker.phase(),
                elapsed_ms,
                "Installation failed"
            ),
        }
        result
    }
}
