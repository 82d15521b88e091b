//! Accessors for the status fields the lifecycle manager publishes.
//!
//! Objects are freeform documents; every accessor tolerates missing or
//! mistyped fields by returning `None`.

use kube::api::DynamicObject;
use serde_json::Value;

/// Artifact version phase meaning the requested tag is available.
pub const PHASE_PRESENT: &str = "Present";

/// CSV phase meaning the operator is fully running.
pub const PHASE_SUCCEEDED: &str = "Succeeded";

fn non_empty_str<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// `status.phase`
pub fn phase(obj: &DynamicObject) -> Option<&str> {
    non_empty_str(&obj.data, "/status/phase")
}

/// `status.version` of an artifact version: the installable version id (CSV name).
pub fn installed_version(obj: &DynamicObject) -> Option<&str> {
    non_empty_str(&obj.data, "/status/version")
}

/// `status.name` of an artifact version: the operator's registered name.
pub fn operator_name(obj: &DynamicObject) -> Option<&str> {
    non_empty_str(&obj.data, "/status/name")
}

/// Install plan referenced by a subscription.
///
/// Prefers `status.installplan.name`, falling back to `status.installPlanRef.name`.
pub fn install_plan_name(obj: &DynamicObject) -> Option<&str> {
    non_empty_str(&obj.data, "/status/installplan/name")
        .or_else(|| non_empty_str(&obj.data, "/status/installPlanRef/name"))
}

/// Whether an install plan has `spec.approved == true`.
pub fn install_plan_approved(obj: &DynamicObject) -> bool {
    obj.data
        .pointer("/spec/approved")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Whether any channel entry of a package manifest names `version_id`.
pub fn package_manifest_offers(obj: &DynamicObject, version_id: &str) -> bool {
    obj.data
        .pointer("/status/channels")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|channel| channel.get("entries").and_then(Value::as_array))
        .flatten()
        .filter_map(|entry| entry.get("name").and_then(Value::as_str))
        .any(|name| name.contains(version_id))
}

/// `spec.registry` and `spec.repository` of an artifact.
pub fn artifact_location(obj: &DynamicObject) -> (Option<&str>, Option<&str>) {
    (
        obj.data.pointer("/spec/registry").and_then(Value::as_str),
        obj.data.pointer("/spec/repository").and_then(Value::as_str),
    )
}
