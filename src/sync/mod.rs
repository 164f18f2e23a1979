//! Target Synchronizer (C5)
//!
//! Applies a `CertificatePool` to a single `(kind, namespace, name)` target
//! object via server-side apply, gated by the canonical hash `H` so that a
//! reconcile with no real change is a no-op against the API server.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use k8s_openapi::ByteString;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use sha2::{Digest, Sha256};

use crate::constants::{BUNDLE_HASH_KEY, BUNDLE_LABEL_KEY, FIELD_MANAGER, LEGACY_CSA_FIELD_MANAGER};
use crate::crd::{KeyValueTarget, TargetFormat};
use crate::encoders;
use crate::error::Result;
use crate::pool::CertificatePool;

/// Which Kubernetes kind a target materializes as
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetObjectKind {
    ConfigMap,
    Secret,
}

/// Everything needed to materialize one target object
pub struct DesiredTarget<'a> {
    pub bundle_name: String,
    pub bundle_uid: String,
    pub namespace: String,
    pub kind: TargetObjectKind,
    pub target: &'a KeyValueTarget,
}

/// Applies desired state for a single target and reports whether a write
/// was made, using server-side apply under the reserved field manager.
pub struct TargetSynchronizer {
    client: Client,
}

impl TargetSynchronizer {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Compute the desired payload, compare against drift signals on the
    /// existing object, and apply only when drift is detected. Returns
    /// `true` when a write occurred.
    pub async fn apply(&self, desired: &DesiredTarget<'_>, pool: &CertificatePool) -> Result<bool> {
        let pem = pool.pem()?;
        let mut text_entries: BTreeMap<String, String> = BTreeMap::new();
        let mut binary_entries: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        let mut hash_material = Vec::new();
        hash_material.extend_from_slice(pem.as_bytes());

        for entry in &desired.target.data {
            match entry.format {
                TargetFormat::Pem => {
                    text_entries.insert(entry.key.clone(), pem.clone());
                }
                TargetFormat::Pkcs12 => {
                    let params = entry.pkcs12.as_ref();
                    let password = params.and_then(|p| p.password.clone()).unwrap_or_default();
                    let profile = params
                        .map(|p| p.profile)
                        .unwrap_or(crate::crd::Pkcs12Profile::LegacyDES);
                    let bytes = encoders::encode_pkcs12(pool, &password, profile)?;
                    binary_entries.insert(entry.key.clone(), bytes);
                    hash_material.extend_from_slice(password.as_bytes());
                }
            }
        }

        for (k, v) in &desired.target.annotations {
            hash_material.extend_from_slice(k.as_bytes());
            hash_material.extend_from_slice(v.as_bytes());
        }
        for (k, v) in &desired.target.labels {
            hash_material.extend_from_slice(k.as_bytes());
            hash_material.extend_from_slice(v.as_bytes());
        }
        let hash = hex::encode(Sha256::digest(&hash_material));

        let expected_keys: BTreeSet<String> = desired
            .target
            .data
            .iter()
            .map(|e| e.key.clone())
            .collect();

        let name = desired.bundle_name.clone();
        let drifted = match desired.kind {
            TargetObjectKind::ConfigMap => {
                let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &desired.namespace);
                match api.get_opt(&name).await? {
                    None => true,
                    Some(existing) => {
                        !matches_no_drift(&existing.metadata, desired, &hash, &expected_keys, true)
                    }
                }
            }
            TargetObjectKind::Secret => {
                let api: Api<Secret> = Api::namespaced(self.client.clone(), &desired.namespace);
                match api.get_opt(&name).await? {
                    None => true,
                    Some(existing) => {
                        !matches_no_drift(&existing.metadata, desired, &hash, &expected_keys, false)
                    }
                }
            }
        };

        if !drifted {
            return Ok(false);
        }

        let metadata = build_metadata(desired, &hash);
        let patch_params = PatchParams::apply(FIELD_MANAGER).force();

        match desired.kind {
            TargetObjectKind::ConfigMap => {
                let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &desired.namespace);
                let object = ConfigMap {
                    metadata,
                    data: Some(text_entries),
                    binary_data: if binary_entries.is_empty() {
                        None
                    } else {
                        Some(
                            binary_entries
                                .into_iter()
                                .map(|(k, v)| (k, ByteString(v)))
                                .collect(),
                        )
                    },
                    ..Default::default()
                };
                api.patch(&name, &patch_params, &Patch::Apply(&object)).await?;
            }
            TargetObjectKind::Secret => {
                let api: Api<Secret> = Api::namespaced(self.client.clone(), &desired.namespace);
                let mut data: BTreeMap<String, ByteString> = text_entries
                    .into_iter()
                    .map(|(k, v)| (k, ByteString(v.into_bytes())))
                    .collect();
                data.extend(binary_entries.into_iter().map(|(k, v)| (k, ByteString(v))));
                let object = Secret {
                    metadata,
                    data: Some(data),
                    ..Default::default()
                };
                api.patch(&name, &patch_params, &Patch::Apply(&object)).await?;
            }
        }

        Ok(true)
    }

    /// Release ownership of a target that should no longer exist: an
    /// empty-field apply patch, followed by deletion if nothing remains.
    pub async fn cleanup(&self, bundle_name: &str, namespace: &str, kind: TargetObjectKind) -> Result<()> {
        let patch_params = PatchParams::apply(FIELD_MANAGER).force();
        match kind {
            TargetObjectKind::ConfigMap => {
                let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
                let empty = ConfigMap {
                    metadata: ObjectMeta {
                        name: Some(bundle_name.to_string()),
                        namespace: Some(namespace.to_string()),
                        ..Default::default()
                    },
                    ..Default::default()
                };
                api.patch(bundle_name, &patch_params, &Patch::Apply(&empty)).await?;
                if let Some(existing) = api.get_opt(bundle_name).await? {
                    let empty_data = existing.data.as_ref().map_or(true, |d| d.is_empty());
                    let empty_binary = existing.binary_data.as_ref().map_or(true, |d| d.is_empty());
                    if empty_data && empty_binary {
                        delete_ignoring_not_found(&api, bundle_name).await?;
                    }
                }
            }
            TargetObjectKind::Secret => {
                let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
                let empty = Secret {
                    metadata: ObjectMeta {
                        name: Some(bundle_name.to_string()),
                        namespace: Some(namespace.to_string()),
                        ..Default::default()
                    },
                    ..Default::default()
                };
                api.patch(bundle_name, &patch_params, &Patch::Apply(&empty)).await?;
                if let Some(existing) = api.get_opt(bundle_name).await? {
                    let empty_data = existing.data.as_ref().map_or(true, |d| d.is_empty());
                    if empty_data {
                        delete_ignoring_not_found(&api, bundle_name).await?;
                    }
                }
            }
        }
        Ok(())
    }
}

async fn delete_ignoring_not_found<K>(api: &Api<K>, name: &str) -> Result<()>
where
    K: Clone + std::fmt::Debug + serde::de::DeserializeOwned,
{
    match api.delete(name, &Default::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn build_metadata(desired: &DesiredTarget<'_>, hash: &str) -> ObjectMeta {
    let mut annotations = desired.target.annotations.clone();
    annotations.insert(BUNDLE_HASH_KEY.to_string(), hash.to_string());
    let mut labels = desired.target.labels.clone();
    labels.insert(BUNDLE_LABEL_KEY.to_string(), desired.bundle_name.clone());

    ObjectMeta {
        name: Some(desired.bundle_name.clone()),
        namespace: Some(desired.namespace.clone()),
        annotations: Some(annotations),
        labels: Some(labels),
        owner_references: Some(vec![OwnerReference {
            api_version: "trust-manager.io/v1alpha1".to_string(),
            kind: "ClusterBundle".to_string(),
            name: desired.bundle_name.clone(),
            uid: desired.bundle_uid.clone(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }]),
        ..Default::default()
    }
}

fn matches_no_drift(
    meta: &ObjectMeta,
    desired: &DesiredTarget<'_>,
    hash: &str,
    expected_keys: &BTreeSet<String>,
    is_configmap: bool,
) -> bool {
    let owned = meta
        .owner_references
        .as_ref()
        .is_some_and(|refs| {
            refs.iter().any(|r| {
                r.controller == Some(true)
                    && r.block_owner_deletion == Some(true)
                    && r.uid == desired.bundle_uid
            })
        });
    if !owned {
        return false;
    }

    let label_ok = meta
        .labels
        .as_ref()
        .and_then(|l| l.get(BUNDLE_LABEL_KEY))
        .is_some_and(|v| v == &desired.bundle_name);
    if !label_ok {
        return false;
    }

    let hash_ok = meta
        .annotations
        .as_ref()
        .and_then(|a| a.get(BUNDLE_HASH_KEY))
        .is_some_and(|v| v == hash);
    if !hash_ok {
        return false;
    }

    if legacy_csa_migration_required(meta) {
        return false;
    }

    let subtree = if is_configmap {
        managed_keys_union(meta, FIELD_MANAGER, &["data", "binaryData"])
    } else {
        managed_keys_union(meta, FIELD_MANAGER, &["data"])
    };

    match subtree {
        Some(actual) => &actual == expected_keys,
        None => false,
    }
}

/// Union of direct children managed by `field_manager` across each named
/// subtree (`data`, and `binaryData` for ConfigMap)
fn managed_keys_union(meta: &ObjectMeta, field_manager: &str, subtrees: &[&str]) -> Option<BTreeSet<String>> {
    let entry = meta
        .managed_fields
        .as_ref()?
        .iter()
        .find(|e| e.manager.as_deref() == Some(field_manager))?;
    let fields = entry.fields_v1.as_ref()?;
    let root = &fields.0;

    let mut union = BTreeSet::new();
    for subtree in subtrees {
        if let Some(node) = root.get(format!("f:{}", subtree)) {
            if let Some(obj) = node.as_object() {
                union.extend(
                    obj.keys()
                        .filter(|k| k.starts_with("f:"))
                        .map(|k| k[2..].to_string()),
                );
            }
        }
    }
    Some(union)
}

/// Any managed-fields entry still owned by the pre-SSA field manager with
/// an `Update` operation signals that ownership has not yet migrated
fn legacy_csa_migration_required(meta: &ObjectMeta) -> bool {
    meta.managed_fields.as_ref().is_some_and(|entries| {
        entries
            .iter()
            .any(|e| e.manager.as_deref() == Some(LEGACY_CSA_FIELD_MANAGER) && e.operation.as_deref() == Some("Update"))
    })
}
