//! Cluster resource client.
//!
//! The reconciler talks to the cluster only through [`ResourceClient`], a
//! generic get/create/update/delete/patch surface keyed by [`ResourceKind`],
//! namespace and name. Payloads are freeform `DynamicObject`s.
//!
//! - `kubeconfig`: credential resolution (flag, `KUBECONFIG`, home, in-cluster)
//! - [`KubeResourceClient`]: the real implementation on top of `kube::Client`

pub mod kubeconfig;

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
#[cfg(test)]
use mockall::automock;
use serde_json::Value;
use tracing::debug;

use crate::controller::error::Result;
use crate::resources::ResourceKind;

pub use kubeconfig::{KubeconfigSource, connect, resolve};

/// Generic access to the lifecycle resources.
///
/// `namespace` is ignored for cluster-scoped kinds.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Fetch an object; `Ok(None)` when it does not exist.
    async fn get(&self, kind: ResourceKind, namespace: &str, name: &str)
    -> Result<Option<DynamicObject>>;

    /// Create an object.
    async fn create(
        &self,
        kind: ResourceKind,
        namespace: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject>;

    /// Replace an existing object.
    async fn update(
        &self,
        kind: ResourceKind,
        namespace: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject>;

    /// Delete an object; `Ok(false)` when it was already absent.
    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<bool>;

    /// Apply a JSON merge patch.
    async fn patch(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<DynamicObject>;
}

/// [`ResourceClient`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeResourceClient {
    client: Client,
}

impl KubeResourceClient {
    /// Wrap an existing client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, kind: ResourceKind, namespace: &str) -> Api<DynamicObject> {
        let ar = kind.api_resource();
        if kind.is_namespaced() {
            Api::namespaced_with(self.client.clone(), namespace, &ar)
        } else {
            Api::all_with(self.client.clone(), &ar)
        }
    }
}

#[async_trait]
impl ResourceClient for KubeResourceClient {
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>> {
        Ok(self.api(kind, namespace).get_opt(name).await?)
    }

    async fn create(
        &self,
        kind: ResourceKind,
        namespace: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject> {
        debug!(kind = %kind, namespace = %namespace, name = %obj.name_any(), "Creating resource");
        Ok(self
            .api(kind, namespace)
            .create(&PostParams::default(), obj)
            .await?)
    }

    async fn update(
        &self,
        kind: ResourceKind,
        namespace: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject> {
        let name = obj.name_any();
        debug!(kind = %kind, namespace = %namespace, name = %name, "Updating resource");
        Ok(self
            .api(kind, namespace)
            .replace(&name, &PostParams::default(), obj)
            .await?)
    }

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<bool> {
        match self
            .api(kind, namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => {
                debug!(kind = %kind, namespace = %namespace, name = %name, "Deleted resource");
                Ok(true)
            }
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn patch(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<DynamicObject> {
        debug!(kind = %kind, namespace = %namespace, name = %name, "Patching resource");
        Ok(self
            .api(kind, namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await?)
    }
}
