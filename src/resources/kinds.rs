//! Resource kinds driven during an operator installation.
//!
//! Every kind is addressed through `kube::api::DynamicObject`; this module maps
//! each kind to the group/version/plural the API server expects.

use kube::core::{ApiResource, GroupVersionKind};

/// Group for artifact (bundle descriptor) resources.
pub const ARTIFACT_GROUP: &str = "app.alauda.io";

/// Group for OLM operator resources.
pub const OLM_GROUP: &str = "operators.coreos.com";

/// Group for OLM package manifests.
pub const PACKAGES_GROUP: &str = "packages.operators.coreos.com";

/// Cluster resource kinds used by the lifecycle reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    /// Bundle descriptor: where bundle images live and how tags are selected.
    Artifact,
    /// One requested tag of a bundle descriptor.
    ArtifactVersion,
    /// OLM install subscription.
    Subscription,
    /// OLM-generated install plan.
    InstallPlan,
    /// Installed service version (CSV).
    ClusterServiceVersion,
    /// Read-only catalog record listing channel entries.
    PackageManifest,
    /// Core namespace (cluster scoped).
    Namespace,
}

impl ResourceKind {
    /// All kinds, in installation order.
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::Artifact,
        ResourceKind::ArtifactVersion,
        ResourceKind::PackageManifest,
        ResourceKind::Namespace,
        ResourceKind::Subscription,
        ResourceKind::InstallPlan,
        ResourceKind::ClusterServiceVersion,
    ];

    /// API group of the kind ("" for core).
    pub fn group(&self) -> &'static str {
        match self {
            ResourceKind::Artifact | ResourceKind::ArtifactVersion => ARTIFACT_GROUP,
            ResourceKind::Subscription
            | ResourceKind::InstallPlan
            | ResourceKind::ClusterServiceVersion => OLM_GROUP,
            ResourceKind::PackageManifest => PACKAGES_GROUP,
            ResourceKind::Namespace => "",
        }
    }

    /// API version of the kind.
    pub fn version(&self) -> &'static str {
        match self {
            ResourceKind::PackageManifest | ResourceKind::Namespace => "v1",
            _ => "v1alpha1",
        }
    }

    /// Kind name as it appears in manifests.
    pub fn kind(&self) -> &'static str {
        match self {
            ResourceKind::Artifact => "Artifact",
            ResourceKind::ArtifactVersion => "ArtifactVersion",
            ResourceKind::Subscription => "Subscription",
            ResourceKind::InstallPlan => "InstallPlan",
            ResourceKind::ClusterServiceVersion => "ClusterServiceVersion",
            ResourceKind::PackageManifest => "PackageManifest",
            ResourceKind::Namespace => "Namespace",
        }
    }

    /// Plural resource name used in API paths.
    pub fn plural(&self) -> &'static str {
        match self {
            ResourceKind::Artifact => "artifacts",
            ResourceKind::ArtifactVersion => "artifactversions",
            ResourceKind::Subscription => "subscriptions",
            ResourceKind::InstallPlan => "installplans",
            ResourceKind::ClusterServiceVersion => "clusterserviceversions",
            ResourceKind::PackageManifest => "packagemanifests",
            ResourceKind::Namespace => "namespaces",
        }
    }

    /// Full `apiVersion` string ("group/version", or "version" for core).
    pub fn api_version(&self) -> String {
        if self.group().is_empty() {
            self.version().to_string()
        } else {
            format!("{}/{}", self.group(), self.version())
        }
    }

    /// Whether objects of this kind live inside a namespace.
    pub fn is_namespaced(&self) -> bool {
        !matches!(self, ResourceKind::Namespace)
    }

    /// The dynamic API resource descriptor for this kind.
    pub fn api_resource(&self) -> ApiResource {
        let gvk = GroupVersionKind::gvk(self.group(), self.version(), self.kind());
        ApiResource::from_gvk_with_plural(&gvk, self.plural())
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind())
    }
}

/// Human-readable label for a resource, used in logs and error messages.
pub fn resource_label(kind: ResourceKind, namespace: &str, name: &str) -> String {
    if kind.is_namespaced() {
        format!("{} {}/{}", kind, namespace, name)
    } else {
        format!("{} {}", kind, name)
    }
}
