//! Schema Conversion (C8)
//!
//! Pure, bidirectional mapping between the legacy `BundleSpec` and the
//! current `ClusterBundleSpec`, driven by the legacy adapter (C9). A
//! round trip is equivalent, not necessarily byte-identical: legacy
//! inline sources collapse into one current `inlineCAs` string by
//! concatenation, and the reverse direction cannot split that back into
//! the original entries.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

use crate::constants::JKS_KEY_ANNOTATION;
use crate::crd::{
    BundleSpec, BundleTarget, ClusterBundleSpec, DefaultCAs, DefaultCAsProvider, KeyValueTarget,
    LegacyAdditionalFormats, LegacyBundleSource, LegacyBundleTarget, LegacyJks,
    LegacyKeyValueTarget, LegacyNamespaceSelector, LegacyPkcs12, LegacySourceRef, Pkcs12Params,
    Pkcs12Profile, SourceKind, SourceRef, TargetFormat, TargetKeyValue,
};
use crate::error::{Error, Result};

/// The legacy schema's implicit PKCS#12 profile default, applied when a
/// legacy `jks`/`pkcs12` block omits `profile` (the current schema
/// defaults to `LegacyDES` instead; see `cluster_bundle::default_pkcs12_profile`).
const LEGACY_DEFAULT_PROFILE: Pkcs12Profile = Pkcs12Profile::LegacyRC2;

/// Convert a legacy `BundleSpec` into the current `ClusterBundleSpec` shape.
pub fn legacy_to_current(bundle: &BundleSpec) -> Result<ClusterBundleSpec> {
    let mut sources = Vec::new();
    let mut inline_parts = Vec::new();
    let mut use_default_cas = false;

    for source in &bundle.sources {
        source.validate()?;
        if let Some(cm) = &source.config_map {
            sources.push(SourceRef {
                kind: SourceKind::ConfigMap,
                name: Some(cm.name.clone()),
                selector: None,
                key: legacy_key(cm),
            });
        } else if let Some(secret) = &source.secret {
            sources.push(SourceRef {
                kind: SourceKind::Secret,
                name: Some(secret.name.clone()),
                selector: None,
                key: legacy_key(secret),
            });
        } else if let Some(inline) = &source.inline {
            inline_parts.push(inline.clone());
        } else if source.use_default_cas.unwrap_or(false) {
            use_default_cas = true;
        }
    }

    let inline_cas = if inline_parts.is_empty() {
        None
    } else {
        Some(inline_parts.concat())
    };

    let default_cas = use_default_cas.then_some(DefaultCAs {
        provider: DefaultCAsProvider::System,
    });

    let target = legacy_target_to_current(&bundle.target)?;

    Ok(ClusterBundleSpec {
        sources,
        inline_cas,
        default_cas,
        target,
    })
}

fn legacy_key(r: &LegacySourceRef) -> String {
    if r.include_all_keys {
        "*".to_string()
    } else {
        r.key.clone()
    }
}

fn legacy_target_to_current(target: &LegacyBundleTarget) -> Result<BundleTarget> {
    let config_map = target
        .config_map
        .as_ref()
        .map(|t| key_value_target_with_additional(&t.key, target.additional_formats.as_ref()))
        .transpose()?;
    let secret = target
        .secret
        .as_ref()
        .map(|t| key_value_target_with_additional(&t.key, target.additional_formats.as_ref()))
        .transpose()?;

    let namespace_selector = match &target.namespace_selector {
        None => LabelSelector::default(),
        Some(sel) => LabelSelector {
            match_labels: (!sel.match_labels.is_empty()).then(|| sel.match_labels.clone()),
            match_expressions: None,
        },
    };

    Ok(BundleTarget {
        config_map,
        secret,
        namespace_selector,
    })
}

fn key_value_target_with_additional(
    pem_key: &str,
    additional: Option<&LegacyAdditionalFormats>,
) -> Result<KeyValueTarget> {
    let mut data = vec![TargetKeyValue {
        key: pem_key.to_string(),
        format: TargetFormat::Pem,
        pkcs12: None,
    }];
    let mut annotations = BTreeMap::new();

    if let Some(additional) = additional {
        if let Some(pkcs12) = &additional.pkcs12 {
            data.push(TargetKeyValue {
                key: pkcs12.key.clone(),
                format: TargetFormat::Pkcs12,
                pkcs12: Some(Pkcs12Params {
                    password: pkcs12.password.clone(),
                    profile: pkcs12.profile.unwrap_or(LEGACY_DEFAULT_PROFILE),
                }),
            });
        }
        if let Some(jks) = &additional.jks {
            annotations.insert(JKS_KEY_ANNOTATION.to_string(), jks.key.clone());
            data.push(TargetKeyValue {
                key: jks.key.clone(),
                format: TargetFormat::Pkcs12,
                pkcs12: Some(Pkcs12Params {
                    password: jks.password.clone(),
                    profile: LEGACY_DEFAULT_PROFILE,
                }),
            });
        }
    }

    Ok(KeyValueTarget {
        data,
        annotations,
        labels: BTreeMap::new(),
    })
}

/// Convert a current `ClusterBundleSpec` into the legacy `BundleSpec` shape.
pub fn current_to_legacy(spec: &ClusterBundleSpec) -> Result<BundleSpec> {
    let mut sources = Vec::new();

    for source in &spec.sources {
        if source.selector.is_some() {
            return Err(Error::Validation(
                "legacy schema has no selector-based sources; cannot convert a sourceRef that uses selector".to_string(),
            ));
        }
        let name = source
            .name
            .clone()
            .ok_or_else(|| Error::Validation("sourceRef missing name".to_string()))?;
        let legacy_ref = LegacySourceRef {
            name,
            key: if source.key == "*" {
                String::new()
            } else {
                source.key.clone()
            },
            include_all_keys: source.key == "*",
        };
        sources.push(match source.kind {
            SourceKind::ConfigMap => LegacyBundleSource {
                config_map: Some(legacy_ref),
                ..Default::default()
            },
            SourceKind::Secret => LegacyBundleSource {
                secret: Some(legacy_ref),
                ..Default::default()
            },
        });
    }

    if let Some(inline) = &spec.inline_cas {
        sources.push(LegacyBundleSource {
            inline: Some(inline.clone()),
            ..Default::default()
        });
    }

    if let Some(default_cas) = &spec.default_cas {
        if default_cas.provider == DefaultCAsProvider::System {
            sources.push(LegacyBundleSource {
                use_default_cas: Some(true),
                ..Default::default()
            });
        }
    }

    let target = current_target_to_legacy(&spec.target)?;

    Ok(BundleSpec { sources, target })
}

fn current_target_to_legacy(target: &BundleTarget) -> Result<LegacyBundleTarget> {
    let config_map = target.config_map.as_ref().and_then(legacy_pem_key_value);
    let secret = target.secret.as_ref().and_then(legacy_pem_key_value);

    let additional_formats = target
        .config_map
        .as_ref()
        .or(target.secret.as_ref())
        .map(legacy_additional_formats)
        .transpose()?
        .flatten();

    if target.namespace_selector.match_expressions.is_some() {
        return Err(Error::Validation(
            "legacy namespaceSelector supports matchLabels only; matchExpressions cannot be represented".to_string(),
        ));
    }
    let namespace_selector = target
        .namespace_selector
        .match_labels
        .clone()
        .map(|match_labels| LegacyNamespaceSelector { match_labels });

    Ok(LegacyBundleTarget {
        config_map,
        secret,
        additional_formats,
        namespace_selector,
    })
}

/// The legacy schema requires a PEM entry; a current target with none has
/// no legacy representation and is omitted from the legacy target entirely.
fn legacy_pem_key_value(t: &KeyValueTarget) -> Option<LegacyKeyValueTarget> {
    t.pem_entry().map(|entry| LegacyKeyValueTarget {
        key: entry.key.clone(),
    })
}

fn legacy_additional_formats(t: &KeyValueTarget) -> Result<Option<LegacyAdditionalFormats>> {
    let jks_key = t.annotations.get(JKS_KEY_ANNOTATION).cloned();
    let mut jks = None;
    let mut pkcs12 = None;

    for entry in &t.data {
        if entry.format != TargetFormat::Pkcs12 {
            continue;
        }
        let params = entry.pkcs12.as_ref();
        if jks_key.as_deref() == Some(entry.key.as_str()) {
            jks = Some(LegacyJks {
                key: entry.key.clone(),
                password: params.and_then(|p| p.password.clone()),
            });
        } else {
            pkcs12 = Some(LegacyPkcs12 {
                key: entry.key.clone(),
                password: params.and_then(|p| p.password.clone()),
                profile: params.map(|p| p.profile),
            });
        }
    }

    Ok((jks.is_some() || pkcs12.is_some()).then_some(LegacyAdditionalFormats { jks, pkcs12 }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::LegacyBundleTarget;

    fn legacy_source(config_map: Option<LegacySourceRef>, inline: Option<&str>) -> LegacyBundleSource {
        LegacyBundleSource {
            config_map,
            inline: inline.map(|s| s.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn inline_sources_collapse_by_concatenation() {
        let bundle = BundleSpec {
            sources: vec![
                legacy_source(None, Some("AAA\n")),
                legacy_source(None, Some("BBB\n")),
            ],
            target: LegacyBundleTarget {
                config_map: Some(LegacyKeyValueTarget { key: "ca.crt".to_string() }),
                secret: None,
                additional_formats: None,
                namespace_selector: None,
            },
        };
        let current = legacy_to_current(&bundle).unwrap();
        assert_eq!(current.inline_cas.as_deref(), Some("AAA\nBBB\n"));
    }

    #[test]
    fn include_all_keys_translates_to_wildcard() {
        let bundle = BundleSpec {
            sources: vec![legacy_source(
                Some(LegacySourceRef {
                    name: "cm".to_string(),
                    key: "ignored".to_string(),
                    include_all_keys: true,
                }),
                None,
            )],
            target: LegacyBundleTarget {
                config_map: Some(LegacyKeyValueTarget { key: "ca.crt".to_string() }),
                secret: None,
                additional_formats: None,
                namespace_selector: None,
            },
        };
        let current = legacy_to_current(&bundle).unwrap();
        assert_eq!(current.sources[0].key, "*");
    }

    #[test]
    fn jks_round_trips_through_the_reserved_annotation() {
        let bundle = BundleSpec {
            sources: vec![legacy_source(None, Some("AAA\n"))],
            target: LegacyBundleTarget {
                config_map: Some(LegacyKeyValueTarget { key: "ca.crt".to_string() }),
                secret: None,
                additional_formats: Some(LegacyAdditionalFormats {
                    jks: Some(LegacyJks {
                        key: "truststore.jks".to_string(),
                        password: Some("changeit".to_string()),
                    }),
                    pkcs12: None,
                }),
                namespace_selector: None,
            },
        };
        let current = legacy_to_current(&bundle).unwrap();
        let cm = current.target.config_map.as_ref().unwrap();
        assert_eq!(
            cm.annotations.get(JKS_KEY_ANNOTATION).map(String::as_str),
            Some("truststore.jks")
        );

        let back = current_to_legacy(&current).unwrap();
        let formats = back.target.additional_formats.unwrap();
        assert_eq!(formats.jks.unwrap().key, "truststore.jks");
        assert!(formats.pkcs12.is_none());
    }

    #[test]
    fn target_without_pem_entry_is_omitted_on_reverse_conversion() {
        let current = ClusterBundleSpec {
            sources: vec![],
            inline_cas: Some("AAA\n".to_string()),
            default_cas: None,
            target: BundleTarget {
                config_map: Some(KeyValueTarget {
                    data: vec![TargetKeyValue {
                        key: "truststore.p12".to_string(),
                        format: TargetFormat::Pkcs12,
                        pkcs12: Some(Pkcs12Params {
                            password: None,
                            profile: Pkcs12Profile::Modern2023,
                        }),
                    }],
                    annotations: BTreeMap::new(),
                    labels: BTreeMap::new(),
                }),
                secret: None,
                namespace_selector: LabelSelector::default(),
            },
        };
        let legacy = current_to_legacy(&current).unwrap();
        assert!(legacy.target.config_map.is_none());
    }

    #[test]
    fn profile_defaults_diverge_between_schemas() {
        let bundle = BundleSpec {
            sources: vec![legacy_source(None, Some("AAA\n"))],
            target: LegacyBundleTarget {
                config_map: Some(LegacyKeyValueTarget { key: "ca.crt".to_string() }),
                secret: None,
                additional_formats: Some(LegacyAdditionalFormats {
                    jks: None,
                    pkcs12: Some(LegacyPkcs12 {
                        key: "truststore.p12".to_string(),
                        password: None,
                        profile: None,
                    }),
                }),
                namespace_selector: None,
            },
        };
        let current = legacy_to_current(&bundle).unwrap();
        let entry = current
            .target
            .config_map
            .as_ref()
            .unwrap()
            .data
            .iter()
            .find(|e| e.key == "truststore.p12")
            .unwrap();
        assert_eq!(entry.pkcs12.as_ref().unwrap().profile, Pkcs12Profile::LegacyRC2);
    }
}
