//! `ClusterBundle` — the current schema
//!
//! A cluster-scoped custom resource declaring a set of certificate sources,
//! an optional default-CA package source, optional inline PEM data, and one
//! or more per-namespace targets.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::constants::RESERVED_DOMAIN;
use crate::crd::conditions::Condition;
use crate::error::{Error, Result};

/// `ClusterBundle` custom resource
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "trust-manager.io",
    version = "v1alpha1",
    kind = "ClusterBundle",
    plural = "clusterbundles",
    singular = "clusterbundle",
    shortname = "cbundle",
    scope = "Cluster",
    status = "ClusterBundleStatus",
    printcolumn = r#"{"name": "Synced", "type": "string", "jsonPath": ".status.conditions[?(@.type==\"Synced\")].status"}"#,
    printcolumn = r#"{"name": "DefaultCAVersion", "type": "string", "jsonPath": ".status.defaultCAVersion"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterBundleSpec {
    /// Ordered sequence of certificate sources
    #[serde(default)]
    pub sources: Vec<SourceRef>,

    /// Inline PEM data, concatenated into the pool alongside other sources
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_cas: Option<String>,

    /// Default CA package source
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_cas: Option<DefaultCAs>,

    /// Per-namespace target objects
    pub target: BundleTarget,
}

impl ClusterBundleSpec {
    /// Structural validation: source-ref shape, target metadata, and the
    /// `configMap`/`secret` presence rule. Whether the declared sources
    /// actually yield a non-empty pool is a runtime concern checked by the
    /// bundle assembler (C4).
    pub fn validate(&self) -> Result<()> {
        for source in &self.sources {
            source.validate()?;
        }
        self.target.validate()?;
        if self.sources.is_empty() && self.inline_cas.is_none() && self.default_cas.is_none() {
            return Err(Error::Validation(
                "bundle must declare at least one of sources, inlineCAs, or defaultCAs"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// A single source contributing certificate bytes to the pool
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    /// Source object kind
    pub kind: SourceKind,

    /// Exact object name; mutually exclusive with `selector`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Label predicate selecting zero or more objects; mutually exclusive
    /// with `name`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<LabelSelector>,

    /// Exact key or wildcard pattern (`*` matches all) selecting data entries
    pub key: String,
}

impl SourceRef {
    /// Enforce the `name` XOR `selector` invariant
    pub fn validate(&self) -> Result<()> {
        match (&self.name, &self.selector) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            (Some(_), Some(_)) => Err(Error::Validation(
                "sourceRef must set exactly one of name or selector, not both".to_string(),
            )),
            (None, None) => Err(Error::Validation(
                "sourceRef must set exactly one of name or selector".to_string(),
            )),
        }
    }
}

/// Source object kind
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum SourceKind {
    ConfigMap,
    Secret,
}

/// Default CA package configuration
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DefaultCAs {
    /// Default CA provider
    pub provider: DefaultCAsProvider,
}

/// Default CA provider selection
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum DefaultCAsProvider {
    System,
    Disabled,
}

/// Per-namespace target configuration
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BundleTarget {
    /// ConfigMap target template
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_map: Option<KeyValueTarget>,

    /// Secret target template
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<KeyValueTarget>,

    /// Label predicate over namespaces; an empty selector (no
    /// `matchLabels`/`matchExpressions`) matches every namespace
    pub namespace_selector: LabelSelector,
}

impl BundleTarget {
    /// At least one of `configMap`/`secret` must be set
    pub fn validate(&self) -> Result<()> {
        if self.config_map.is_none() && self.secret.is_none() {
            return Err(Error::Validation(
                "target must set at least one of configMap or secret".to_string(),
            ));
        }
        if let Some(cm) = &self.config_map {
            cm.validate()?;
        }
        if let Some(secret) = &self.secret {
            secret.validate()?;
        }
        Ok(())
    }
}

/// A template for materialized ConfigMap/Secret data, plus metadata to copy
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeyValueTarget {
    /// Ordered list of keys to materialize
    pub data: Vec<TargetKeyValue>,

    /// Annotations copied onto the materialized object (reserved domain
    /// keys are rejected)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// Labels copied onto the materialized object (reserved domain keys are
    /// rejected)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl KeyValueTarget {
    pub fn validate(&self) -> Result<()> {
        for (k, _) in self.annotations.iter().chain(self.labels.iter()) {
            if k.starts_with(RESERVED_DOMAIN) {
                return Err(Error::Validation(format!(
                    "target metadata key '{}' uses the reserved domain '{}'",
                    k, RESERVED_DOMAIN
                )));
            }
        }
        for entry in &self.data {
            entry.validate()?;
        }
        Ok(())
    }

    /// The PEM entry among `data`, if any (required by the legacy schema
    /// during reverse conversion)
    pub fn pem_entry(&self) -> Option<&TargetKeyValue> {
        self.data.iter().find(|d| d.format == TargetFormat::Pem)
    }
}

/// A single key to materialize, and its format
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TargetKeyValue {
    /// Key under which the value is written
    pub key: String,

    /// Encoding format
    pub format: TargetFormat,

    /// PKCS#12 parameters; only valid when `format = PKCS12`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pkcs12: Option<Pkcs12Params>,
}

impl TargetKeyValue {
    pub fn validate(&self) -> Result<()> {
        match (self.format, &self.pkcs12) {
            (TargetFormat::Pkcs12, _) | (TargetFormat::Pem, None) => Ok(()),
            (TargetFormat::Pem, Some(_)) => Err(Error::Validation(format!(
                "key '{}' sets pkcs12 parameters but format is PEM",
                self.key
            ))),
        }
    }
}

/// Encoding format for a materialized key
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum TargetFormat {
    #[serde(rename = "PEM")]
    Pem,
    #[serde(rename = "PKCS12")]
    Pkcs12,
}

/// PKCS#12 encoding parameters
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pkcs12Params {
    /// Password; an absent value is treated as an empty password, which
    /// `openssl` still MACs (it has no way to fully disable the MAC)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Algorithm profile
    #[serde(default = "default_pkcs12_profile")]
    pub profile: Pkcs12Profile,
}

// The current schema's default is LegacyDES; the legacy schema's default
// (LegacyRC2) is applied explicitly in `convert`.
fn default_pkcs12_profile() -> Pkcs12Profile {
    Pkcs12Profile::LegacyDES
}

/// PKCS#12 algorithm profile
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum Pkcs12Profile {
    LegacyRC2,
    LegacyDES,
    Modern2023,
}

/// `ClusterBundle` status, owned exclusively by the controller
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterBundleStatus {
    /// Status conditions keyed by `type`; `Synced` is the sole required type
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Opaque identifier of the default CA package, present only when the
    /// System provider was used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_ca_version: Option<String>,

    /// Last spec generation this status reflects
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl ClusterBundleStatus {
    pub fn synced(&self) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == "Synced")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(key: &str, format: TargetFormat, pkcs12: Option<Pkcs12Params>) -> KeyValueTarget {
        KeyValueTarget {
            data: vec![TargetKeyValue {
                key: key.to_string(),
                format,
                pkcs12,
            }],
            annotations: BTreeMap::new(),
            labels: BTreeMap::new(),
        }
    }

    #[test]
    fn source_ref_requires_exactly_one_of_name_or_selector() {
        let mut r = SourceRef {
            kind: SourceKind::ConfigMap,
            name: None,
            selector: None,
            key: "*".to_string(),
        };
        assert!(r.validate().is_err());
        r.name = Some("cm".to_string());
        assert!(r.validate().is_ok());
        r.selector = Some(LabelSelector::default());
        assert!(r.validate().is_err());
    }

    #[test]
    fn pkcs12_params_only_valid_with_pkcs12_format() {
        let bad = target(
            "t",
            TargetFormat::Pem,
            Some(Pkcs12Params {
                password: None,
                profile: Pkcs12Profile::Modern2023,
            }),
        );
        assert!(bad.validate().is_err());

        let good = target(
            "t.p12",
            TargetFormat::Pkcs12,
            Some(Pkcs12Params {
                password: None,
                profile: Pkcs12Profile::Modern2023,
            }),
        );
        assert!(good.validate().is_ok());
    }

    #[test]
    fn reserved_metadata_domain_is_rejected() {
        let mut t = target("t", TargetFormat::Pem, None);
        t.annotations
            .insert("trust-manager.io/hash".to_string(), "x".to_string());
        assert!(t.validate().is_err());
    }

    #[test]
    fn target_requires_configmap_or_secret() {
        let bt = BundleTarget {
            config_map: None,
            secret: None,
            namespace_selector: LabelSelector::default(),
        };
        assert!(bt.validate().is_err());
    }

    #[test]
    fn spec_requires_at_least_one_source_kind() {
        let spec = ClusterBundleSpec {
            sources: vec![],
            inline_cas: None,
            default_cas: None,
            target: BundleTarget {
                config_map: Some(target("t", TargetFormat::Pem, None)),
                secret: None,
                namespace_selector: LabelSelector::default(),
            },
        };
        assert!(spec.validate().is_err());
    }
}
