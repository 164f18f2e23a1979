//! Integration tests for legacy/current schema conversion
//!
//! These tests exercise `convert::legacy_to_current` and
//! `convert::current_to_legacy` end to end over realistically assembled
//! specs, verifying round-trip equivalence where the schemas overlap and
//! the documented lossy/rejecting behavior where they don't.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use trust_manager::convert::{current_to_legacy, legacy_to_current};
use trust_manager::crd::{
    BundleSpec, BundleTarget, ClusterBundleSpec, DefaultCAs, DefaultCAsProvider, KeyValueTarget,
    LegacyAdditionalFormats, LegacyBundleSource, LegacyBundleTarget, LegacyKeyValueTarget,
    LegacyNamespaceSelector, LegacyPkcs12, LegacySourceRef, Pkcs12Profile, SourceKind, SourceRef,
    TargetFormat, TargetKeyValue,
};

// ============================================================================
// Test Helpers
// ============================================================================

fn legacy_configmap_source(name: &str, key: &str) -> LegacyBundleSource {
    LegacyBundleSource {
        config_map: Some(LegacySourceRef {
            name: name.to_string(),
            key: key.to_string(),
            include_all_keys: false,
        }),
        ..Default::default()
    }
}

fn legacy_bundle(sources: Vec<LegacyBundleSource>, target: LegacyBundleTarget) -> BundleSpec {
    BundleSpec { sources, target }
}

fn current_source(kind: SourceKind, name: &str, key: &str) -> SourceRef {
    SourceRef {
        kind,
        name: Some(name.to_string()),
        selector: None,
        key: key.to_string(),
    }
}

fn current_pem_target(key: &str) -> KeyValueTarget {
    KeyValueTarget {
        data: vec![TargetKeyValue {
            key: key.to_string(),
            format: TargetFormat::Pem,
            pkcs12: None,
        }],
        annotations: BTreeMap::new(),
        labels: BTreeMap::new(),
    }
}

// ============================================================================
// Legacy to Current
// ============================================================================

#[test]
fn legacy_bundle_with_named_source_converts_to_current_source_ref() {
    let bundle = legacy_bundle(
        vec![legacy_configmap_source("ca-bundle", "ca.crt")],
        LegacyBundleTarget {
            config_map: Some(LegacyKeyValueTarget {
                key: "ca.crt".to_string(),
            }),
            secret: None,
            additional_formats: None,
            namespace_selector: None,
        },
    );

    let current = legacy_to_current(&bundle).unwrap();
    assert_eq!(current.sources.len(), 1);
    assert_eq!(current.sources[0].kind, SourceKind::ConfigMap);
    assert_eq!(current.sources[0].name.as_deref(), Some("ca-bundle"));
    assert_eq!(current.sources[0].key, "ca.crt");
}

#[test]
fn legacy_use_default_cas_converts_to_system_provider() {
    let bundle = legacy_bundle(
        vec![LegacyBundleSource {
            use_default_cas: Some(true),
            ..Default::default()
        }],
        LegacyBundleTarget {
            config_map: Some(LegacyKeyValueTarget {
                key: "ca.crt".to_string(),
            }),
            secret: None,
            additional_formats: None,
            namespace_selector: None,
        },
    );

    let current = legacy_to_current(&bundle).unwrap();
    assert!(current.sources.is_empty());
    assert_eq!(
        current.default_cas.unwrap().provider,
        DefaultCAsProvider::System
    );
}

#[test]
fn legacy_nil_namespace_selector_converts_to_empty_selector() {
    let bundle = legacy_bundle(
        vec![legacy_configmap_source("ca-bundle", "ca.crt")],
        LegacyBundleTarget {
            config_map: Some(LegacyKeyValueTarget {
                key: "ca.crt".to_string(),
            }),
            secret: None,
            additional_formats: None,
            namespace_selector: None,
        },
    );

    let current = legacy_to_current(&bundle).unwrap();
    assert_eq!(current.target.namespace_selector, LabelSelector::default());
}

#[test]
fn legacy_match_labels_selector_carries_over() {
    let mut match_labels = BTreeMap::new();
    match_labels.insert("env".to_string(), "prod".to_string());

    let bundle = legacy_bundle(
        vec![legacy_configmap_source("ca-bundle", "ca.crt")],
        LegacyBundleTarget {
            config_map: Some(LegacyKeyValueTarget {
                key: "ca.crt".to_string(),
            }),
            secret: None,
            additional_formats: None,
            namespace_selector: Some(LegacyNamespaceSelector { match_labels }),
        },
    );

    let current = legacy_to_current(&bundle).unwrap();
    let labels = current.target.namespace_selector.match_labels.unwrap();
    assert_eq!(labels.get("env").map(String::as_str), Some("prod"));
}

// ============================================================================
// Current to Legacy
// ============================================================================

#[test]
fn current_spec_with_selector_source_rejects_reverse_conversion() {
    let current = ClusterBundleSpec {
        sources: vec![SourceRef {
            kind: SourceKind::ConfigMap,
            name: None,
            selector: Some(LabelSelector::default()),
            key: "*".to_string(),
        }],
        inline_cas: None,
        default_cas: None,
        target: BundleTarget {
            config_map: Some(current_pem_target("ca.crt")),
            secret: None,
            namespace_selector: LabelSelector::default(),
        },
    };

    let result = current_to_legacy(&current);
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .to_lowercase()
        .contains("selector"));
}

#[test]
fn current_spec_with_match_expressions_rejects_reverse_conversion() {
    let current = ClusterBundleSpec {
        sources: vec![current_source(SourceKind::ConfigMap, "ca-bundle", "ca.crt")],
        inline_cas: None,
        default_cas: None,
        target: BundleTarget {
            config_map: Some(current_pem_target("ca.crt")),
            secret: None,
            namespace_selector: LabelSelector {
                match_labels: None,
                match_expressions: Some(vec![]),
            },
        },
    };

    let result = current_to_legacy(&current);
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .to_lowercase()
        .contains("matchexpressions"));
}

#[test]
fn current_default_cas_system_provider_converts_to_legacy_use_default_cas() {
    let current = ClusterBundleSpec {
        sources: vec![],
        inline_cas: None,
        default_cas: Some(DefaultCAs {
            provider: DefaultCAsProvider::System,
        }),
        target: BundleTarget {
            config_map: Some(current_pem_target("ca.crt")),
            secret: None,
            namespace_selector: LabelSelector::default(),
        },
    };

    let legacy = current_to_legacy(&current).unwrap();
    assert_eq!(legacy.sources.len(), 1);
    assert_eq!(legacy.sources[0].use_default_cas, Some(true));
}

#[test]
fn current_default_cas_disabled_provider_yields_no_legacy_source() {
    let current = ClusterBundleSpec {
        sources: vec![],
        inline_cas: None,
        default_cas: Some(DefaultCAs {
            provider: DefaultCAsProvider::Disabled,
        }),
        target: BundleTarget {
            config_map: Some(current_pem_target("ca.crt")),
            secret: None,
            namespace_selector: LabelSelector::default(),
        },
    };

    let legacy = current_to_legacy(&current).unwrap();
    assert!(legacy.sources.is_empty());
}

// ============================================================================
// Round-trip Equivalence
// ============================================================================

#[test]
fn named_source_round_trips_through_both_conversions() {
    let original = legacy_bundle(
        vec![legacy_configmap_source("ca-bundle", "ca.crt")],
        LegacyBundleTarget {
            config_map: Some(LegacyKeyValueTarget {
                key: "ca.crt".to_string(),
            }),
            secret: None,
            additional_formats: None,
            namespace_selector: None,
        },
    );

    let current = legacy_to_current(&original).unwrap();
    let back = current_to_legacy(&current).unwrap();

    assert_eq!(back.sources.len(), 1);
    let cm = back.sources[0].config_map.as_ref().unwrap();
    assert_eq!(cm.name, "ca-bundle");
    assert_eq!(cm.key, "ca.crt");
    assert!(!cm.include_all_keys);
}

#[test]
fn pkcs12_additional_format_round_trips_with_explicit_profile() {
    let original = legacy_bundle(
        vec![legacy_configmap_source("ca-bundle", "ca.crt")],
        LegacyBundleTarget {
            config_map: Some(LegacyKeyValueTarget {
                key: "ca.crt".to_string(),
            }),
            secret: None,
            additional_formats: Some(LegacyAdditionalFormats {
                jks: None,
                pkcs12: Some(LegacyPkcs12 {
                    key: "truststore.p12".to_string(),
                    password: Some("changeit".to_string()),
                    profile: Some(Pkcs12Profile::Modern2023),
                }),
            }),
            namespace_selector: None,
        },
    );

    let current = legacy_to_current(&original).unwrap();
    let back = current_to_legacy(&current).unwrap();

    let formats = back.target.additional_formats.unwrap();
    let pkcs12 = formats.pkcs12.unwrap();
    assert_eq!(pkcs12.key, "truststore.p12");
    assert_eq!(pkcs12.password.as_deref(), Some("changeit"));
    assert_eq!(pkcs12.profile, Some(Pkcs12Profile::Modern2023));
    assert!(formats.jks.is_none());
}

#[test]
fn match_labels_namespace_selector_round_trips() {
    let mut match_labels = BTreeMap::new();
    match_labels.insert("team".to_string(), "platform".to_string());

    let original = legacy_bundle(
        vec![legacy_configmap_source("ca-bundle", "ca.crt")],
        LegacyBundleTarget {
            config_map: Some(LegacyKeyValueTarget {
                key: "ca.crt".to_string(),
            }),
            secret: None,
            additional_formats: None,
            namespace_selector: Some(LegacyNamespaceSelector {
                match_labels: match_labels.clone(),
            }),
        },
    );

    let current = legacy_to_current(&original).unwrap();
    let back = current_to_legacy(&current).unwrap();

    assert_eq!(
        back.target.namespace_selector.unwrap().match_labels,
        match_labels
    );
}
