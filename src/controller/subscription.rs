//! Subscription, install plan and CSV handling.
//!
//! Replaces any stale subscription/CSV for the operator, subscribes with manual
//! approval, approves the generated install plan and waits for the CSV to
//! succeed.

use tracing::{info, instrument};

use crate::resources::manifests::{self, SubscriptionRequest};
use crate::resources::{ResourceKind, resource_label, status};
use crate::retry::retry_with_backoff;

use super::bundle::delete_and_confirm;
use super::context::Context;
use super::error::{Error, Result, ResultExt};
use super::install_state_machine::{InstallEvent, InstallTracker, InstallTransitionContext};
use super::poll::await_condition;

/// Install `version_id` of `operator_name` from `channel`.
#[instrument(skip(ctx, tracker), fields(namespace = %ctx.operator_namespace))]
pub async fn install_subscription(
    ctx: &Context,
    operator_name: &str,
    version_id: &str,
    channel: &str,
    tracker: &mut InstallTracker,
) -> Result<()> {
    let result = subscribe(ctx, operator_name, version_id, channel, tracker).await;
    if let Err(e) = &result {
        tracker.fail(&e.to_string());
    }
    result
}

/// Ensure `name` exists, tolerating a concurrent create.
pub async fn ensure_namespace(ctx: &Context, name: &str) -> Result<()> {
    let label = resource_label(ResourceKind::Namespace, name, name);
    match ctx
        .client
        .create(ResourceKind::Namespace, name, &manifests::namespace(name))
        .await
    {
        Ok(_) => {
            info!(namespace = %name, "Created namespace");
            Ok(())
        }
        Err(e) if e.is_already_exists() => Ok(()),
        Err(e) => Err(e.context(format!("creating {}", label))),
    }
}

async fn subscribe(
    ctx: &Context,
    operator_name: &str,
    version_id: &str,
    channel: &str,
    tracker: &mut InstallTracker,
) -> Result<()> {
    let ns = ctx.operator_namespace.as_str();
    if version_id.is_empty() {
        return Err(Error::Configuration(format!(
            "no installable version for operator {}",
            operator_name
        )));
    }

    delete_and_confirm(ctx, ResourceKind::Subscription, ns, operator_name).await?;
    delete_and_confirm(ctx, ResourceKind::ClusterServiceVersion, ns, version_id).await?;

    ensure_namespace(ctx, ns).await?;

    let sub_label = resource_label(ResourceKind::Subscription, ns, operator_name);
    let subscription = manifests::subscription(&SubscriptionRequest {
        operator: operator_name,
        namespace: ns,
        channel,
        starting_csv: version_id,
        source: &ctx.catalog_source,
        source_namespace: &ctx.system_namespace,
    });
    info!(resource = %sub_label, channel = %channel, csv = %version_id, "Creating subscription");
    let subscription = &subscription;
    retry_with_backoff(
        &ctx.subscription_retry,
        &format!("creating {}", sub_label),
        &ctx.cancel,
        move || async move {
            ctx.client
                .create(ResourceKind::Subscription, ns, subscription)
                .await
        },
    )
    .await?;
    tracker.advance(InstallEvent::SubscriptionCreated, &InstallTransitionContext::default())?;

    let sub_label = sub_label.as_str();
    let plan_name = await_condition(
        &format!("install plan of {}", sub_label),
        &ctx.poll,
        &ctx.cancel,
        move || async move {
            let sub = ctx
                .client
                .get(ResourceKind::Subscription, ns, operator_name)
                .await
                .with_context(|| format!("getting {}", sub_label))?;
            Ok(sub
                .as_ref()
                .and_then(status::install_plan_name)
                .map(str::to_string))
        },
    )
    .await?;
    tracker.advance(
        InstallEvent::InstallPlanGenerated,
        &InstallTransitionContext::with_install_plan(&plan_name),
    )?;

    let plan_label = resource_label(ResourceKind::InstallPlan, ns, &plan_name);
    let plan = ctx
        .client
        .get(ResourceKind::InstallPlan, ns, &plan_name)
        .await
        .with_context(|| format!("getting {}", plan_label))?
        .ok_or_else(|| {
            Error::ProtocolViolation(format!(
                "{} references {} which does not exist",
                sub_label, plan_label
            ))
        })?;
    if status::install_plan_approved(&plan) {
        info!(resource = %plan_label, "Install plan already approved");
    } else {
        info!(resource = %plan_label, "Approving install plan");
        ctx.client
            .patch(ResourceKind::InstallPlan, ns, &plan_name, &manifests::approve_patch())
            .await
            .with_context(|| format!("approving {}", plan_label))?;
    }
    tracker.advance(InstallEvent::InstallPlanApproved, &InstallTransitionContext::default())?;

    let csv_label = resource_label(ResourceKind::ClusterServiceVersion, ns, version_id);
    let csv_label = csv_label.as_str();
    await_condition(csv_label, &ctx.poll, &ctx.cancel, move || async move {
        let csv = ctx
            .client
            .get(ResourceKind::ClusterServiceVersion, ns, version_id)
            .await
            .with_context(|| format!("getting {}", csv_label))?;
        Ok(csv
            .filter(|csv| status::phase(csv) == Some(status::PHASE_SUCCEEDED))
            .map(|_| ()))
    })
    .await?;
    tracker.advance(InstallEvent::CsvSucceeded, &InstallTransitionContext::default())?;

    info!(operator = %operator_name, csv = %version_id, "Operator installed");
    Ok(())
}
