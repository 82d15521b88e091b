//! Bundle publication: artifact, artifact version and catalog visibility.
//!
//! Makes one bundle tag present through the artifact (bundle descriptor),
//! waits for the lifecycle manager to resolve it to an installable version,
//! and confirms the catalog offers that version before anything subscribes
//! to it.

use kube::api::DynamicObject;
use tracing::{info, instrument, warn};

use crate::config::{BundleReference, ImageReference};
use crate::resources::manifests::{self, CUSTOM_LIBRARY, PLATFORM_LIBRARY};
use crate::resources::{ResourceKind, resource_label, status};

use super::context::Context;
use super::error::{Error, Result, ResultExt};
use super::install_state_machine::{InstallEvent, InstallTracker, InstallTransitionContext};
use super::poll::await_condition;

/// Result of publishing a bundle version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleInstall {
    /// Operator package name
    pub operator_name: String,
    /// Installable version id (CSV name)
    pub version_id: String,
}

/// Create the artifact for `image`, or update its registry/repository in place
/// when they drifted.
#[instrument(skip(ctx), fields(artifact = %ctx.artifact_name))]
pub async fn ensure_artifact(ctx: &Context, image: &ImageReference) -> Result<DynamicObject> {
    let ns = &ctx.system_namespace;
    let name = &ctx.artifact_name;
    let label = resource_label(ResourceKind::Artifact, ns, name);

    match ctx
        .client
        .get(ResourceKind::Artifact, ns, name)
        .await
        .with_context(|| format!("getting {}", label))?
    {
        Some(mut existing) => {
            let (registry, repository) = status::artifact_location(&existing);
            if registry == Some(image.registry.as_str())
                && repository == Some(image.repository.as_str())
            {
                return Ok(existing);
            }

            info!(
                registry = %image.registry,
                repository = %image.repository,
                "Artifact location drifted, updating"
            );
            let spec = existing
                .data
                .as_object_mut()
                .map(|data| data.entry("spec").or_insert_with(|| serde_json::json!({})))
                .and_then(|spec| spec.as_object_mut())
                .ok_or_else(|| {
                    Error::ProtocolViolation(format!("{} has a malformed spec", label))
                })?;
            spec.insert("registry".into(), image.registry.clone().into());
            spec.insert("repository".into(), image.repository.clone().into());
            ctx.client
                .update(ResourceKind::Artifact, ns, &existing)
                .await
                .with_context(|| format!("updating {}", label))
        }
        None => {
            info!(registry = %image.registry, repository = %image.repository, "Creating artifact");
            let artifact = manifests::artifact(name, ns, &image.registry, &image.repository);
            ctx.client
                .create(ResourceKind::Artifact, ns, &artifact)
                .await
                .with_context(|| format!("creating {}", label))
        }
    }
}

/// Delete `kind/name` if present and wait until a get confirms it is gone.
pub async fn delete_and_confirm(
    ctx: &Context,
    kind: ResourceKind,
    namespace: &str,
    name: &str,
) -> Result<()> {
    let label = resource_label(kind, namespace, name);
    let existed = ctx
        .client
        .delete(kind, namespace, name)
        .await
        .with_context(|| format!("deleting {}", label))?;
    if existed {
        info!(resource = %label, "Deleted, waiting until gone");
    }

    let label = label.as_str();
    await_condition(&format!("deletion of {}", label), &ctx.poll, &ctx.cancel, move || async move {
        let current = ctx
            .client
            .get(kind, namespace, name)
            .await
            .with_context(|| format!("getting {}", label))?;
        Ok(current.is_none().then_some(()))
    })
    .await
}

/// Publish `bundle` and return the operator name and installable version id.
///
/// Tags of a pre-provisioned artifact reuse an existing artifact version. Bundle
/// images provision the artifact and always recreate the artifact version so
/// the lifecycle manager re-evaluates presence.
#[instrument(skip(ctx, bundle, tracker), fields(tag = %bundle.tag()))]
pub async fn install_bundle_version(
    ctx: &Context,
    bundle: &BundleReference,
    tracker: &mut InstallTracker,
) -> Result<BundleInstall> {
    let result = publish(ctx, bundle, tracker).await;
    if let Err(e) = &result {
        tracker.fail(&e.to_string());
    }
    result
}

async fn publish(
    ctx: &Context,
    bundle: &BundleReference,
    tracker: &mut InstallTracker,
) -> Result<BundleInstall> {
    let ns = ctx.system_namespace.as_str();
    let tag = bundle.tag();

    let (artifact, library, recreate) = match bundle {
        BundleReference::Tag(_) => {
            let artifact = ctx
                .client
                .get(ResourceKind::Artifact, ns, &ctx.artifact_name)
                .await
                .with_context(|| {
                    format!(
                        "getting {}",
                        resource_label(ResourceKind::Artifact, ns, &ctx.artifact_name)
                    )
                })?
                .ok_or_else(|| {
                    Error::Configuration(format!(
                        "{} does not exist",
                        resource_label(ResourceKind::Artifact, ns, &ctx.artifact_name)
                    ))
                })?;
            (artifact, PLATFORM_LIBRARY, false)
        }
        BundleReference::Image(image) => (ensure_artifact(ctx, image).await?, CUSTOM_LIBRARY, true),
    };

    let av_name = manifests::artifact_version_name(&ctx.artifact_name, tag);
    let av_label = resource_label(ResourceKind::ArtifactVersion, ns, &av_name);

    if recreate {
        delete_and_confirm(ctx, ResourceKind::ArtifactVersion, ns, &av_name).await?;
    }

    let existing = ctx
        .client
        .get(ResourceKind::ArtifactVersion, ns, &av_name)
        .await
        .with_context(|| format!("getting {}", av_label))?;
    if existing.is_some() {
        info!(resource = %av_label, "Reusing existing artifact version");
    } else {
        info!(resource = %av_label, "Creating artifact version");
        let av = manifests::artifact_version(&artifact, tag, library);
        ctx.client
            .create(ResourceKind::ArtifactVersion, ns, &av)
            .await
            .with_context(|| format!("creating {}", av_label))?;
    }

    let (av_name, av_label) = (av_name.as_str(), av_label.as_str());
    let present = await_condition(av_label, &ctx.poll, &ctx.cancel, move || async move {
        let current = ctx
            .client
            .get(ResourceKind::ArtifactVersion, ns, av_name)
            .await
            .with_context(|| format!("getting {}", av_label))?;
        Ok(current.filter(|av| status::phase(av) == Some(status::PHASE_PRESENT)))
    })
    .await?;

    let version_id = status::installed_version(&present)
        .ok_or_else(|| {
            Error::ProtocolViolation(format!(
                "{} is {} but has no status.version",
                av_label,
                status::PHASE_PRESENT
            ))
        })?
        .to_string();
    let operator_name = match status::operator_name(&present) {
        Some(name) => name.to_string(),
        None => {
            warn!(resource = %av_label, fallback = %ctx.operator_name, "No status.name, using configured operator name");
            ctx.operator_name.clone()
        }
    };
    tracker.advance(
        InstallEvent::BundlePresent,
        &InstallTransitionContext::with_version(&version_id),
    )?;

    let pm_label = resource_label(ResourceKind::PackageManifest, ns, &operator_name);
    let (pm_label, operator, version) = (pm_label.as_str(), operator_name.as_str(), version_id.as_str());
    await_condition(
        &format!("{} offering {}", pm_label, version),
        &ctx.poll,
        &ctx.cancel,
        move || async move {
            let pm = ctx
                .client
                .get(ResourceKind::PackageManifest, ns, operator)
                .await
                .with_context(|| format!("getting {}", pm_label))?;
            Ok(pm
                .filter(|pm| status::package_manifest_offers(pm, version))
                .map(|_| ()))
        },
    )
    .await?;
    tracker.advance(InstallEvent::CatalogEntryFound, &InstallTransitionContext::default())?;

    info!(operator = %operator_name, version = %version_id, "Bundle version published");
    Ok(BundleInstall {
        operator_name,
        version_id,
    })
}
