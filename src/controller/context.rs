//! Shared context for the lifecycle reconciler.
//!
//! Every value the reconciler needs is carried here explicitly and fixed at
//! construction: the resource client, namespaces, names, poll bounds, the
//! subscription retry policy and the run's cancellation token.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::client::ResourceClient;
use crate::config::OperatorConfig;
use crate::retry::RetryConfig;

use super::poll::PollSettings;

/// Shared context for the reconciler
#[derive(Clone)]
pub struct Context {
    /// Cluster resource client
    pub client: Arc<dyn ResourceClient>,
    /// Namespace holding artifacts and catalog sources
    pub system_namespace: String,
    /// Namespace the operator is installed into
    pub operator_namespace: String,
    /// Configured operator name, used when the bundle version does not report one
    pub operator_name: String,
    /// Artifact (bundle descriptor) name
    pub artifact_name: String,
    /// Catalog source subscriptions install from
    pub catalog_source: String,
    /// Interval and bound for every wait
    pub poll: PollSettings,
    /// Subscription creation retry policy
    pub subscription_retry: RetryConfig,
    /// Cancellation for the whole run
    pub cancel: CancellationToken,
}

impl Context {
    /// Build a context from the operator configuration.
    pub fn new(
        client: Arc<dyn ResourceClient>,
        config: &OperatorConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            system_namespace: config.system_namespace.clone(),
            operator_namespace: config.namespace.clone(),
            operator_name: config.name.clone(),
            artifact_name: config.artifact_name(),
            catalog_source: config.catalog_source.clone(),
            poll: PollSettings {
                interval: config.interval,
                timeout: config.timeout,
            },
            subscription_retry: RetryConfig {
                max_attempts: config.subscription_retries,
                initial_delay: config.subscription_retry_delay,
                ..RetryConfig::subscription_create()
            },
            cancel,
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("system_namespace", &self.system_namespace)
            .field("operator_namespace", &self.operator_namespace)
            .field("operator_name", &self.operator_name)
            .field("artifact_name", &self.artifact_name)
            .field("catalog_source", &self.catalog_source)
            .field("poll", &self.poll)
            .finish_non_exhaustive()
    }
}
