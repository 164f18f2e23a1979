//! Reconciler Loop (C7) for the current `ClusterBundle` schema

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::api::{Patch, PatchParams};
use kube::runtime::{
    controller::{Action, Controller},
    finalizer::{finalizer, Event},
    watcher::Config as WatcherConfig,
};
use kube::{Api, ResourceExt};
use tracing::{error, info, instrument};

use crate::assembler::BundleAssembler;
use crate::constants::FINALIZER;
use crate::controllers::{apply_namespace_allow_list, Context};
use crate::crd::{BundleTarget, ClusterBundle, Condition, KeyValueTarget};
use crate::error::{reason, Error};
use crate::fanout::{namespaces_to_clean_up, NamespaceFanout};
use crate::metrics::prometheus::{RECONCILE_DURATION, RECONCILIATIONS, RECONCILIATION_ERRORS};
use crate::sync::{DesiredTarget, TargetObjectKind, TargetSynchronizer};

const REQUEUE_ON_ERROR: Duration = Duration::from_secs(30);
const REQUEUE_AFTER_SUCCESS: Duration = Duration::from_secs(300);

/// Run the `ClusterBundle` controller
pub async fn run(ctx: Arc<Context>) {
    let client = ctx.client.clone();
    let bundles: Api<ClusterBundle> = Api::all(client);

    info!("Starting ClusterBundle controller");

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

    info!("ClusterBundle controller stopped");
}

#[instrument(skip(bundle, ctx), fields(name = %bundle.name_any()))]
async fn reconcile(bundle: Arc<ClusterBundle>, ctx: Arc<Context>) -> Result<Action, Error> {
    let start = std::time::Instant::now();
    let name = bundle.name_any();

    RECONCILIATIONS.with_label_values(&["ClusterBundle"]).inc();

    let bundles: Api<ClusterBundle> = Api::all(ctx.client.clone());

    let result = finalizer(&bundles, FINALIZER, bundle, |event| async {
        match event {
            Event::Apply(bundle) => apply(&bundle, &ctx).await,
            Event::Cleanup(bundle) => cleanup(&bundle, &ctx).await,
        }
    })
    .await;

    let duration = start.elapsed().as_secs_f64();
    RECONCILE_DURATION.with_label_values(&["ClusterBundle"]).observe(duration);

    match &result {
        Ok(_) => info!("Successfully reconciled ClusterBundle {} in {:.2}s", name, duration),
        Err(e) => {
            RECONCILIATION_ERRORS.with_label_values(&["ClusterBundle"]).inc();
            error!("Failed to reconcile ClusterBundle {}: {:?}", name, e);
        }
    }

    Ok(result?)
}

/// Apply desired state: assemble the pool, fan out to every selected
/// namespace for every configured target kind, clean up targets that fell
/// out of the selector or were dropped from the spec, then patch status.
async fn apply(bundle: &ClusterBundle, ctx: &Context) -> Result<Action, Error> {
    let name = bundle.name_any();
    let uid = bundle.uid().unwrap_or_default();

    if let Err(e) = bundle.spec.validate() {
        patch_status(bundle, ctx, Condition::synced_false(e.synced_false_reason(), e.to_string()), None).await?;
        return Ok(Action::requeue(REQUEUE_ON_ERROR));
    }

    if bundle.spec.target.secret.is_some() && !ctx.secret_targets_enabled {
        patch_status(
            bundle,
            ctx,
            Condition::synced_false(
                reason::SECRET_TARGETS_DISABLED,
                "target.secret is set but secret targets are disabled by configuration",
            ),
            None,
        )
        .await?;
        return Ok(Action::requeue(REQUEUE_ON_ERROR));
    }

    let assembler = BundleAssembler::new(
        ctx.client.clone(),
        ctx.trust_namespace.clone(),
        ctx.default_ca.clone(),
        ctx.filter_expired,
        ctx.filter_non_ca,
    );
    let (pool, default_ca_version) = match assembler.assemble(&bundle.spec).await {
        Ok(v) => v,
        Err(e) => {
            patch_status(bundle, ctx, Condition::synced_false(e.synced_false_reason(), e.to_string()), None).await?;
            return Ok(Action::requeue(REQUEUE_ON_ERROR));
        }
    };

    let fanout = NamespaceFanout::new(ctx.client.clone());
    let selected = apply_namespace_allow_list(
        fanout.selected_namespaces(&bundle.spec.target.namespace_selector).await?,
        &ctx.target_namespaces,
    );

    let synchronizer = TargetSynchronizer::new(ctx.client.clone());
    let mut first_error: Option<Error> = None;

    for (kind, target) in configured_targets(&bundle.spec.target) {
        for namespace in &selected {
            let desired = DesiredTarget {
                bundle_name: name.clone(),
                bundle_uid: uid.clone(),
                namespace: namespace.clone(),
                kind,
                target,
            };
            if let Err(e) = synchronizer.apply(&desired, &pool).await {
                first_error.get_or_insert(e);
            }
        }

        match fanout.existing_target_namespaces(&name, kind).await {
            Ok(existing) => {
                for namespace in namespaces_to_clean_up(&selected, &existing) {
                    if let Err(e) = synchronizer.cleanup(&name, &namespace, kind).await {
                        first_error.get_or_insert(e);
                    }
                }
            }
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    for kind in [TargetObjectKind::ConfigMap, TargetObjectKind::Secret] {
        if target_of_kind(&bundle.spec.target, kind).is_some() {
            continue;
        }
        match fanout.existing_target_namespaces(&name, kind).await {
            Ok(existing) => {
                for namespace in existing {
                    if let Err(e) = synchronizer.cleanup(&name, &namespace, kind).await {
                        first_error.get_or_insert(e);
                    }
                }
            }
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    let condition = match &first_error {
        None => Condition::synced_true(),
        Some(e) => Condition::synced_false(e.synced_false_reason(), e.to_string()),
    };
    patch_status(bundle, ctx, condition, default_ca_version).await?;

    Ok(Action::requeue(REQUEUE_AFTER_SUCCESS))
}

/// Release every target object this bundle owns before the finalizer is removed
async fn cleanup(bundle: &ClusterBundle, ctx: &Context) -> Result<Action, Error> {
    let name = bundle.name_any();
    let fanout = NamespaceFanout::new(ctx.client.clone());
    let synchronizer = TargetSynchronizer::new(ctx.client.clone());

    for kind in [TargetObjectKind::ConfigMap, TargetObjectKind::Secret] {
        let existing = fanout.existing_target_namespaces(&name, kind).await?;
        for namespace in existing {
            synchronizer.cleanup(&name, &namespace, kind).await?;
        }
    }

    Ok(Action::await_change())
}

fn configured_targets(target: &BundleTarget) -> Vec<(TargetObjectKind, &KeyValueTarget)> {
    let mut out = Vec::new();
    if let Some(cm) = &target.config_map {
        out.push((TargetObjectKind::ConfigMap, cm));
    }
    if let Some(secret) = &target.secret {
        out.push((TargetObjectKind::Secret, secret));
    }
    out
}

fn target_of_kind(target: &BundleTarget, kind: TargetObjectKind) -> Option<&KeyValueTarget> {
    match kind {
        TargetObjectKind::ConfigMap => target.config_map.as_ref(),
        TargetObjectKind::Secret => target.secret.as_ref(),
    }
}

async fn patch_status(
    bundle: &ClusterBundle,
    ctx: &Context,
    condition: Condition,
    default_ca_version: Option<String>,
) -> Result<(), Error> {
    let name = bundle.name_any();
    let api: Api<ClusterBundle> = Api::all(ctx.client.clone());

    let mut conditions = bundle.status.clone().unwrap_or_default().conditions;
    Condition::upsert(&mut conditions, condition);

    let status = serde_json::json!({
        "status": {
            "conditions": conditions,
            "defaultCAVersion": default_ca_version,
            "observedGeneration": bundle.metadata.generation,
        }
    });

    api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&status))
        .await?;
    Ok(())
}

fn error_policy(bundle: Arc<ClusterBundle>, err: &Error, _ctx: Arc<Context>) -> Action {
    let name = bundle.name_any();
    error!("Reconciliation error for ClusterBundle {}: {:?}", name, err);
    match err {
        Error::Conflict(_) | Error::Transient(_) => Action::requeue(Duration::from_secs(15)),
        _ => Action::requeue(REQUEUE_ON_ERROR),
    }
}
