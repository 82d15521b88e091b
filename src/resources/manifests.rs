//! Manifest builders for the lifecycle resources this tool creates.
//!
//! Provides functions for creating artifacts, artifact versions, subscriptions
//! and namespaces with the labels and owner references the lifecycle manager
//! expects.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;
use kube::api::DynamicObject;
use serde_json::{Value, json};
use std::collections::BTreeMap;

use super::kinds::ResourceKind;

/// Label linking an artifact version to its artifact.
pub const ARTIFACT_VERSION_LABEL: &str = "cpaas.io/artifact-version";

/// Label naming the library an artifact belongs to.
pub const LIBRARY_LABEL: &str = "cpaas.io/library";

/// Library label value for artifacts provisioned by this tool.
pub const CUSTOM_LIBRARY: &str = "custom";

/// Library label value for artifacts provisioned by the platform.
pub const PLATFORM_LIBRARY: &str = "platform";

const ARTIFACT_ANNOTATION: &str = "kubectl-artifact";

fn labels<const N: usize>(pairs: [(&str, &str); N]) -> BTreeMap<String, String> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Owner reference pointing at `owner`.
///
/// Only set at creation; garbage collection of children is the cluster's job.
pub fn owner_reference(owner: &DynamicObject) -> OwnerReference {
    let (api_version, kind) = owner
        .types
        .as_ref()
        .map(|t| (t.api_version.clone(), t.kind.clone()))
        .unwrap_or_else(|| {
            (
                ResourceKind::Artifact.api_version(),
                ResourceKind::Artifact.kind().to_string(),
            )
        });
    OwnerReference {
        api_version,
        kind,
        name: owner.name_any(),
        uid: owner.uid().unwrap_or_default(),
        controller: None,
        block_owner_deletion: None,
    }
}

/// Name of the artifact version requesting `tag` of `artifact`.
pub fn artifact_version_name(artifact: &str, tag: &str) -> String {
    format!("{}.{}", artifact, tag)
}

/// Artifact (bundle descriptor) declaring where bundle images are hosted.
pub fn artifact(name: &str, namespace: &str, registry: &str, repository: &str) -> DynamicObject {
    let mut obj = DynamicObject::new(name, &ResourceKind::Artifact.api_resource())
        .within(namespace)
        .data(json!({
            "spec": {
                "artifactVersionSelector": {
                    "matchLabels": { ARTIFACT_VERSION_LABEL: name }
                },
                "description": "test operator bundle image",
                "displayName": "test operator",
                "present": true,
                "registry": registry,
                "repository": repository,
                "type": "bundle",
            }
        }));
    obj.metadata.labels = Some(labels([
        ("cpaas.io/builtin", "false"),
        (LIBRARY_LABEL, CUSTOM_LIBRARY),
        ("cpaas.io/present", "true"),
        ("cpaas.io/type", "bundle"),
    ]));
    obj
}

/// Artifact version requesting that `tag` be made present, owned by `artifact`.
pub fn artifact_version(artifact: &DynamicObject, tag: &str, library: &str) -> DynamicObject {
    let artifact_name = artifact.name_any();
    let name = artifact_version_name(&artifact_name, tag);
    let mut obj = DynamicObject::new(&name, &ResourceKind::ArtifactVersion.api_resource()).data(
        json!({
            "spec": {
                "present": true,
                "tag": tag,
            }
        }),
    );
    obj.metadata.namespace = artifact.namespace();
    obj.metadata.labels = Some(labels([
        (ARTIFACT_VERSION_LABEL, artifact_name.as_str()),
        (LIBRARY_LABEL, library),
    ]));
    obj.metadata.annotations = Some(labels([(ARTIFACT_ANNOTATION, "kubectl-artifact")]));
    obj.metadata.owner_references = Some(vec![owner_reference(artifact)]);
    obj
}

/// Parameters of an install subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest<'a> {
    /// Operator package name, also used as the subscription name
    pub operator: &'a str,
    /// Target namespace
    pub namespace: &'a str,
    /// Channel to subscribe on
    pub channel: &'a str,
    /// Installable version id (CSV name) to start from
    pub starting_csv: &'a str,
    /// Catalog source name
    pub source: &'a str,
    /// Namespace of the catalog source
    pub source_namespace: &'a str,
}

/// Install subscription with manual install-plan approval.
pub fn subscription(req: &SubscriptionRequest<'_>) -> DynamicObject {
    let mut obj = DynamicObject::new(req.operator, &ResourceKind::Subscription.api_resource())
        .within(req.namespace)
        .data(json!({
            "spec": {
                "channel": req.channel,
                "installPlanApproval": "Manual",
                "name": req.operator,
                "source": req.source,
                "sourceNamespace": req.source_namespace,
                "startingCSV": req.starting_csv,
            }
        }));
    obj.metadata.labels = Some(labels([("catalog", req.source)]));
    obj
}

/// Core namespace object.
pub fn namespace(name: &str) -> DynamicObject {
    DynamicObject::new(name, &ResourceKind::Namespace.api_resource())
}

/// Merge patch approving an install plan.
pub fn approve_patch() -> Value {
    json!({ "spec": { "approved": true } })
}
