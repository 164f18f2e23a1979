//! `Bundle` — the legacy schema
//!
//! Superseded by `ClusterBundle` but kept so the schema-conversion layer
//! (C8) and the legacy adapter (C9) have a concrete legacy type to convert
//! from/to and shadow. See `crate::convert` for the bidirectional mapping.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crd::cluster_bundle::Pkcs12Profile;
use crate::crd::conditions::Condition;
use crate::error::{Error, Result};

/// `Bundle` custom resource (legacy schema)
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "trust-manager.io",
    version = "v1alpha1",
    kind = "Bundle",
    plural = "bundles",
    singular = "bundle",
    scope = "Cluster",
    status = "BundleStatus",
    printcolumn = r#"{"name": "Synced", "type": "string", "jsonPath": ".status.conditions[?(@.type==\"Synced\")].status"}"#,
    printcolumn = r#"{"name": "Deprecated", "type": "string", "jsonPath": ".status.conditions[?(@.type==\"Deprecated\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BundleSpec {
    /// Per-source entries; each sets exactly one of `configMap`, `secret`,
    /// `inline`, or `useDefaultCAs`
    #[serde(default)]
    pub sources: Vec<LegacyBundleSource>,

    /// Target templates
    pub target: LegacyBundleTarget,
}

/// One legacy source entry
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LegacyBundleSource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_map: Option<LegacySourceRef>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<LegacySourceRef>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_default_cas: Option<bool>,
}

impl LegacyBundleSource {
    pub fn validate(&self) -> Result<()> {
        let set = [
            self.config_map.is_some(),
            self.secret.is_some(),
            self.inline.is_some(),
            self.use_default_cas.unwrap_or(false),
        ]
        .into_iter()
        .filter(|v| *v)
        .count();
        if set != 1 {
            return Err(Error::Validation(
                "legacy bundle source must set exactly one of configMap, secret, inline, useDefaultCAs"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Legacy named source reference (no selector support)
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LegacySourceRef {
    pub name: String,
    pub key: String,
    /// When true, every key in the object is included (equivalent to the
    /// current schema's `*` wildcard)
    #[serde(default)]
    pub include_all_keys: bool,
}

/// Legacy per-namespace target configuration
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LegacyBundleTarget {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_map: Option<LegacyKeyValueTarget>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<LegacyKeyValueTarget>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_formats: Option<LegacyAdditionalFormats>,

    /// A nil selector means "all namespaces"; historical behavior preserved
    /// per the current schema's Open Question decision
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace_selector: Option<LegacyNamespaceSelector>,
}

/// Legacy PEM-only key-value target
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LegacyKeyValueTarget {
    pub key: String,
}

/// Legacy additional binary formats, each with its own key/password
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LegacyAdditionalFormats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jks: Option<LegacyJks>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pkcs12: Option<LegacyPkcs12>,
}

/// Legacy JKS-compatible request
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LegacyJks {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Legacy PKCS#12 request
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LegacyPkcs12 {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<Pkcs12Profile>,
}

/// Legacy, `matchLabels`-only namespace selector
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LegacyNamespaceSelector {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
}

/// `Bundle` status (legacy)
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BundleStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_ca_version: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_source_requires_exactly_one_variant() {
        let mut s = LegacyBundleSource::default();
        assert!(s.validate().is_err());
        s.inline = Some("pem".to_string());
        assert!(s.validate().is_ok());
        s.use_default_cas = Some(true);
        assert!(s.validate().is_err());
    }
}
