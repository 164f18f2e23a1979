//! Controller implementations for watching and reconciling resources

pub mod cluster_bundle_controller;
pub mod legacy_bundle_controller;

use std::collections::BTreeSet;
use std::sync::Arc;

use kube::Client;

use crate::config::Config;
use crate::defaultca::DefaultCaPackage;

/// Shared, immutable context handed to every reconcile invocation
pub struct Context {
    pub client: Client,
    pub trust_namespace: String,
    pub default_ca: Option<Arc<DefaultCaPackage>>,
    pub secret_targets_enabled: bool,
    pub filter_expired: bool,
    pub filter_non_ca: bool,
    pub target_namespaces: Option<Vec<String>>,
}

impl Context {
    /// Build the shared context from process configuration, loading the
    /// default-CA package eagerly if one is configured. A configured path
    /// that fails to load aborts startup rather than silently disabling
    /// the System provider.
    pub fn new(config: &Config, client: Client) -> anyhow::Result<Arc<Self>> {
        let default_ca = config
            .default_package_location
            .as_ref()
            .map(|path| DefaultCaPackage::load(path))
            .transpose()
            .map_err(|e| anyhow::anyhow!("failed to load default-CA package: {}", e))?
            .map(Arc::new);

        Ok(Arc::new(Self {
            client,
            trust_namespace: config.trust_namespace.clone(),
            default_ca,
            secret_targets_enabled: config.secret_targets_enabled,
            filter_expired: config.filter_expired,
            filter_non_ca: config.filter_non_ca,
            target_namespaces: config.target_namespaces.clone(),
        }))
    }
}

/// Restrict `namespaces` to the configured allow-list, if any is set.
pub(crate) fn apply_namespace_allow_list(
    namespaces: BTreeSet<String>,
    allow_list: &Option<Vec<String>>,
) -> BTreeSet<String> {
    match allow_list {
        None => namespaces,
        Some(allowed) => namespaces.into_iter().filter(|ns| allowed.contains(ns)).collect(),
    }
}
