//! Bundle Assembler (C4)
//!
//! Resolves a `ClusterBundleSpec` into a `CertificatePool` by fetching
//! ConfigMap/Secret sources from the trust namespace, adding inline PEM,
//! and layering in the default-CA package when requested. Deterministic
//! and failure-surfaced: every step either contributes bytes or returns a
//! classified error the reconciler can turn into a `Synced=False` reason.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::{Api, ListParams};
use kube::Client;
use tracing::debug;

use crate::crd::{ClusterBundleSpec, DefaultCAsProvider, SourceKind, SourceRef};
use crate::defaultca::DefaultCaPackage;
use crate::error::{Error, Result};
use crate::pool::CertificatePool;
use crate::selector;

/// Resolves sources against the cluster and assembles a `CertificatePool`
pub struct BundleAssembler {
    client: Client,
    trust_namespace: String,
    default_ca: Option<Arc<DefaultCaPackage>>,
    filter_expired: bool,
    filter_non_ca: bool,
}

impl BundleAssembler {
    pub fn new(
        client: Client,
        trust_namespace: String,
        default_ca: Option<Arc<DefaultCaPackage>>,
        filter_expired: bool,
        filter_non_ca: bool,
    ) -> Self {
        Self {
            client,
            trust_namespace,
            default_ca,
            filter_expired,
            filter_non_ca,
        }
    }

    /// Resolve `spec`'s sources, inline data, and default-CA reference into
    /// a pool. Returns the pool plus the default-CA version string, if the
    /// System provider was used.
    pub async fn assemble(&self, spec: &ClusterBundleSpec) -> Result<(CertificatePool, Option<String>)> {
        let mut pool = CertificatePool::new(self.filter_expired, self.filter_non_ca);

        for source in &spec.sources {
            self.resolve_source(source, &mut pool).await?;
        }

        if let Some(inline) = &spec.inline_cas {
            pool.add_from_pem(inline.as_bytes())?;
        }

        let default_ca_version = if let Some(default_cas) = &spec.default_cas {
            match default_cas.provider {
                DefaultCAsProvider::System => {
                    let package = self
                        .default_ca
                        .as_ref()
                        .ok_or(Error::DefaultCaUnavailable)?;
                    pool.add_from_pem(package.bundle_pem().as_bytes())?;
                    Some(package.string_id())
                }
                DefaultCAsProvider::Disabled => None,
            }
        } else {
            None
        };

        if pool.is_empty() {
            return Err(Error::NotFound("no valid certificates".to_string()));
        }

        Ok((pool, default_ca_version))
    }

    async fn resolve_source(&self, source: &SourceRef, pool: &mut CertificatePool) -> Result<()> {
        match source.kind {
            SourceKind::ConfigMap => {
                let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.trust_namespace);
                let objects = self
                    .resolve_objects(source, &api, |cm| cm.metadata.labels.clone().unwrap_or_default())
                    .await?;
                for cm in &objects {
                    add_matching(pool, source, configmap_entries(cm)?)?;
                }
            }
            SourceKind::Secret => {
                let api: Api<Secret> = Api::namespaced(self.client.clone(), &self.trust_namespace);
                let objects = self
                    .resolve_objects(source, &api, |s| s.metadata.labels.clone().unwrap_or_default())
                    .await?;
                let key_is_wildcard = source.key == "*";
                for secret in &objects {
                    add_matching(pool, source, secret_entries(secret, key_is_wildcard)?)?;
                }
            }
        }
        Ok(())
    }

    /// Fetch by exact name, or list+filter by selector within the trust
    /// namespace. An empty selector match is not an error.
    async fn resolve_objects<K, FLabels>(
        &self,
        source: &SourceRef,
        api: &Api<K>,
        labels_of: FLabels,
    ) -> Result<Vec<K>>
    where
        K: Clone + std::fmt::Debug + serde::de::DeserializeOwned,
        FLabels: Fn(&K) -> BTreeMap<String, String>,
    {
        if let Some(name) = &source.name {
            let object = api.get(name).await?;
            return Ok(vec![object]);
        }
        if let Some(sel) = &source.selector {
            let list = api.list(&ListParams::default()).await?;
            let matched: Vec<K> = list
                .items
                .into_iter()
                .filter(|obj| selector::matches(sel, &labels_of(obj)))
                .collect();
            if matched.is_empty() {
                debug!("source selector matched no objects in trust namespace, continuing");
            }
            return Ok(matched);
        }
        Err(Error::Validation(
            "sourceRef must set exactly one of name or selector".to_string(),
        ))
    }
}

fn add_matching(pool: &mut CertificatePool, source: &SourceRef, mut entries: Vec<(String, Vec<u8>)>) -> Result<()> {
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    let mut matched_any = false;
    for (key, bytes) in entries {
        if key_matches(&source.key, &key) {
            matched_any = true;
            pool.add_from_pem(&bytes)?;
        }
    }
    if !matched_any {
        return Err(Error::NotFound(format!(
            "no data entry matched key pattern '{}'",
            source.key
        )));
    }
    Ok(())
}

/// `*` matches everything; otherwise `*` anywhere in the pattern is a
/// wildcard segment matched via simple split-and-contains
fn key_matches(pattern: &str, key: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if !pattern.contains('*') {
        return pattern == key;
    }
    let mut rest = key;
    let segments: Vec<&str> = pattern.split('*').collect();
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        match rest.find(segment) {
            Some(idx) => {
                if i == 0 && idx != 0 {
                    return false;
                }
                rest = &rest[idx + segment.len()..];
            }
            None => return false,
        }
    }
    if let Some(last) = segments.last() {
        if !last.is_empty() && !key.ends_with(last) {
            return false;
        }
    }
    true
}

fn configmap_entries(cm: &ConfigMap) -> Result<Vec<(String, Vec<u8>)>> {
    let mut out = Vec::new();
    if let Some(data) = &cm.data {
        out.extend(data.iter().map(|(k, v)| (k.clone(), v.as_bytes().to_vec())));
    }
    if let Some(binary) = &cm.binary_data {
        out.extend(binary.iter().map(|(k, v)| (k.clone(), v.0.clone())));
    }
    Ok(out)
}

fn secret_entries(secret: &Secret, key_is_wildcard: bool) -> Result<Vec<(String, Vec<u8>)>> {
    let is_tls = secret.type_.as_deref() == Some("kubernetes.io/tls");
    if is_tls && key_is_wildcard {
        return Err(Error::InvalidSecret(
            "wildcard key pattern cannot be applied to a kubernetes.io/tls secret (would leak the private key)"
                .to_string(),
        ));
    }
    let mut out = Vec::new();
    if let Some(data) = &secret.data {
        out.extend(data.iter().map(|(k, v)| (k.clone(), v.0.clone())));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_pattern_matches_only_exact_key() {
        assert!(key_matches("ca.crt", "ca.crt"));
        assert!(!key_matches("ca.crt", "ca.crt.bak"));
    }

    #[test]
    fn full_wildcard_matches_anything() {
        assert!(key_matches("*", "anything"));
    }

    #[test]
    fn prefix_and_suffix_wildcards() {
        assert!(key_matches("ca-*", "ca-bundle"));
        assert!(!key_matches("ca-*", "other-bundle"));
        assert!(key_matches("*.crt", "tls.crt"));
        assert!(!key_matches("*.crt", "tls.key"));
    }

    #[test]
    fn wildcard_in_the_middle() {
        assert!(key_matches("ca-*-bundle", "ca-root-bundle"));
        assert!(!key_matches("ca-*-bundle", "ca-root"));
    }

    #[test]
    fn tls_secret_with_wildcard_key_is_rejected() {
        let mut secret = Secret::default();
        secret.type_ = Some("kubernetes.io/tls".to_string());
        assert!(secret_entries(&secret, true).is_err());
        assert!(secret_entries(&secret, false).is_ok());
    }
}
