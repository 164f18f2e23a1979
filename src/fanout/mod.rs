//! Namespace Fan-out Controller (C6)
//!
//! Computes the effective target set for a `ClusterBundle`: the cross
//! product of namespaces matching `target.namespaceSelector` and the
//! configured target kinds. Also enumerates existing labeled target
//! objects cluster-wide, independent of the current selector, so the
//! reconciler loop (C7) can detect namespaces that left the selector or
//! target kinds dropped from the spec and hand them to C5 for cleanup.

use std::collections::BTreeSet;

use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::{Api, ListParams};
use kube::{Client, ResourceExt};

use crate::constants::BUNDLE_LABEL_KEY;
use crate::error::Result;
use crate::selector;
use crate::sync::TargetObjectKind;

pub struct NamespaceFanout {
    client: Client,
}

impl NamespaceFanout {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Namespaces whose labels satisfy `selector`, sorted for a
    /// deterministic fan-out order within one reconcile.
    pub async fn selected_namespaces(&self, selector: &LabelSelector) -> Result<BTreeSet<String>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await?;
        let names = list
            .items
            .into_iter()
            .filter(|ns| {
                let labels = ns.metadata.labels.clone().unwrap_or_default();
                selector::matches(selector, &labels)
            })
            .map(|ns| ns.name_any())
            .collect();
        Ok(names)
    }

    /// Namespaces that currently hold an object labeled
    /// `<bundle-label>=bundle_name` of the given kind, regardless of
    /// whether the namespace still matches the selector.
    pub async fn existing_target_namespaces(
        &self,
        bundle_name: &str,
        kind: TargetObjectKind,
    ) -> Result<BTreeSet<String>> {
        let lp = ListParams::default().labels(&format!("{}={}", BUNDLE_LABEL_KEY, bundle_name));
        let namespaces = match kind {
            TargetObjectKind::ConfigMap => {
                let api: Api<ConfigMap> = Api::all(self.client.clone());
                api.list(&lp)
                    .await?
                    .items
                    .into_iter()
                    .filter_map(|o| o.metadata.namespace)
                    .collect()
            }
            TargetObjectKind::Secret => {
                let api: Api<Secret> = Api::all(self.client.clone());
                api.list(&lp)
                    .await?
                    .items
                    .into_iter()
                    .filter_map(|o| o.metadata.namespace)
                    .collect()
            }
        };
        Ok(namespaces)
    }
}

/// Namespaces holding a labeled object that no longer belong to the
/// selected set: these are the cleanup candidates for one target kind.
pub fn namespaces_to_clean_up(
    selected: &BTreeSet<String>,
    existing: &BTreeSet<String>,
) -> BTreeSet<String> {
    existing.difference(selected).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn cleanup_is_existing_minus_selected() {
        let selected = set(&["ns-a", "ns-b"]);
        let existing = set(&["ns-a", "ns-c"]);
        assert_eq!(namespaces_to_clean_up(&selected, &existing), set(&["ns-c"]));
    }

    #[test]
    fn no_cleanup_when_existing_is_subset_of_selected() {
        let selected = set(&["ns-a", "ns-b"]);
        let existing = set(&["ns-a"]);
        assert!(namespaces_to_clean_up(&selected, &existing).is_empty());
    }

    #[test]
    fn cleanup_everything_when_selector_now_matches_nothing() {
        let selected = set(&[]);
        let existing = set(&["ns-a", "ns-b"]);
        assert_eq!(namespaces_to_clean_up(&selected, &existing), existing);
    }
}
