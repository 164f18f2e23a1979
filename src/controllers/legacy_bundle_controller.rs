//! Legacy Adapter (C9), driven by a second controller watching the legacy
//! `Bundle` kind and shadow-projecting it onto a `ClusterBundle` of the
//! same name.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use kube::api::{Patch, PatchParams};
use kube::runtime::{
    controller::{Action, Controller},
    watcher::Config as WatcherConfig,
};
use kube::{Api, ResourceExt};
use tracing::{error, info, instrument};

use crate::constants::{LEGACY_ADAPTER_FIELD_MANAGER, MIGRATED_ANNOTATION};
use crate::controllers::Context;
use crate::convert;
use crate::crd::{Bundle, ClusterBundle, Condition};
use crate::error::Error;
use crate::metrics::prometheus::{RECONCILE_DURATION, RECONCILIATIONS, RECONCILIATION_ERRORS};

const REQUEUE_ON_ERROR: Duration = Duration::from_secs(30);
const REQUEUE_AFTER_SUCCESS: Duration = Duration::from_secs(300);

/// Run the legacy `Bundle` adapter controller
pub async fn run(ctx: Arc<Context>) {
    let client = ctx.client.clone();
    let bundles: Api<Bundle> = Api::all(client);

    info!("Starting legacy Bundle adapter controller");

    Controller::new(bundles, WatcherConfig::default().any_semantic())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok(o) => info!("Reconciled {:?}", o),
                Err(e) => error!("Reconcile failed: {:?}", e),
            }
        })
        .await;

    info!("Legacy Bundle adapter controller stopped");
}

#[instrument(skip(bundle, ctx), fields(name = %bundle.name_any()))]
async fn reconcile(bundle: Arc<Bundle>, ctx: Arc<Context>) -> Result<Action, Error> {
    let start = std::time::Instant::now();
    let name = bundle.name_any();

    RECONCILIATIONS.with_label_values(&["Bundle"]).inc();

    let result = apply(&bundle, &ctx).await;

    let duration = start.elapsed().as_secs_f64();
    RECONCILE_DURATION.with_label_values(&["Bundle"]).observe(duration);

    match &result {
        Ok(_) => info!("Successfully reconciled legacy Bundle {} in {:.2}s", name, duration),
        Err(e) => {
            RECONCILIATION_ERRORS.with_label_values(&["Bundle"]).inc();
            error!("Failed to reconcile legacy Bundle {}: {:?}", name, e);
        }
    }

    result
}

/// Project a legacy `Bundle` onto a `ClusterBundle` of the same name, or
/// release ownership once the paired `ClusterBundle` has been migrated.
async fn apply(bundle: &Bundle, ctx: &Context) -> Result<Action, Error> {
    let name = bundle.name_any();
    let uid = bundle.uid().unwrap_or_default();
    let cluster_bundles: Api<ClusterBundle> = Api::all(ctx.client.clone());

    let paired = cluster_bundles.get_opt(&name).await?;

    let migrated = paired.as_ref().is_some_and(|cb| {
        cb.metadata
            .annotations
            .as_ref()
            .is_some_and(|a| a.contains_key(MIGRATED_ANNOTATION))
    });

    if migrated {
        release_ownership(&cluster_bundles, &name).await?;
        patch_legacy_status(
            bundle,
            ctx,
            Condition {
                type_: "Migrated".to_string(),
                status: "True".to_string(),
                last_transition_time: Utc::now(),
                reason: Some("UserManaged".to_string()),
                message: Some(format!(
                    "ClusterBundle/{} carries {} and is now user-managed; the legacy adapter released ownership",
                    name, MIGRATED_ANNOTATION
                )),
            },
        )
        .await?;
        return Ok(Action::requeue(REQUEUE_AFTER_SUCCESS));
    }

    let converted = match convert::legacy_to_current(&bundle.spec) {
        Ok(spec) => spec,
        Err(e) => {
            patch_legacy_status(bundle, ctx, Condition::synced_false(e.synced_false_reason(), e.to_string())).await?;
            return Ok(Action::requeue(REQUEUE_ON_ERROR));
        }
    };

    let mut desired = ClusterBundle::new(&name, converted);
    desired.metadata.owner_references = Some(vec![k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference {
        api_version: "trust-manager.io/v1alpha1".to_string(),
        kind: "Bundle".to_string(),
        name: name.clone(),
        uid: uid.clone(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }]);

    let patch_params = PatchParams::apply(LEGACY_ADAPTER_FIELD_MANAGER).force();
    cluster_bundles
        .patch(&name, &patch_params, &Patch::Apply(&desired))
        .await?;

    patch_legacy_status(
        bundle,
        ctx,
        Condition {
            type_: "Deprecated".to_string(),
            status: "True".to_string(),
            last_transition_time: Utc::now(),
            reason: Some("LegacySchema".to_string()),
            message: Some(
                "this Bundle uses the deprecated legacy schema; it is projected onto a ClusterBundle, \
                 migrate to ClusterBundle directly and annotate this Bundle to stop the projection"
                    .to_string(),
            ),
        },
    )
    .await?;

    Ok(Action::requeue(REQUEUE_AFTER_SUCCESS))
}

/// Release every field this controller owns on the paired `ClusterBundle`
/// via an empty server-side apply patch. The object itself is left alone:
/// it is now user-managed.
async fn release_ownership(api: &Api<ClusterBundle>, name: &str) -> Result<(), Error> {
    let patch_params = PatchParams::apply(LEGACY_ADAPTER_FIELD_MANAGER).force();
    let empty = serde_json::json!({
        "apiVersion": "trust-manager.io/v1alpha1",
        "kind": "ClusterBundle",
        "metadata": { "name": name },
    });
    api.patch(name, &patch_params, &Patch::Apply(&empty)).await?;
    Ok(())
}

async fn patch_legacy_status(bundle: &Bundle, ctx: &Context, condition: Condition) -> Result<(), Error> {
    let name = bundle.name_any();
    let api: Api<Bundle> = Api::all(ctx.client.clone());

    let mut conditions = bundle.status.clone().unwrap_or_default().conditions;
    Condition::upsert(&mut conditions, condition);

    let status = serde_json::json!({
        "status": {
            "conditions": conditions,
        }
    });

    api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&status))
        .await?;
    Ok(())
}

fn error_policy(bundle: Arc<Bundle>, err: &Error, _ctx: Arc<Context>) -> Action {
    let name = bundle.name_any();
    error!("Reconciliation error for legacy Bundle {}: {:?}", name, err);
    match err {
        Error::Conflict(_) | Error::Transient(_) => Action::requeue(Duration::from_secs(15)),
        _ => Action::requeue(REQUEUE_ON_ERROR),
    }
}
