//! Custom Resource Definitions for trust-manager

pub mod bundle_legacy;
pub mod cluster_bundle;
pub mod conditions;

pub use bundle_legacy::{
    Bundle, BundleSpec, BundleStatus, LegacyAdditionalFormats, LegacyBundleSource,
    LegacyBundleTarget, LegacyJks, LegacyKeyValueTarget, LegacyNamespaceSelector, LegacyPkcs12,
    LegacySourceRef,
};
pub use cluster_bundle::{
    BundleTarget, ClusterBundle, ClusterBundleSpec, ClusterBundleStatus, DefaultCAs,
    DefaultCAsProvider, KeyValueTarget, Pkcs12Params, Pkcs12Profile, SourceKind, SourceRef,
    TargetFormat, TargetKeyValue,
};
pub use conditions::Condition;

use kube::CustomResourceExt;

/// Generate CRD YAML manifests for all custom resources
pub fn generate_crds() -> Vec<String> {
    vec![
        serde_yaml::to_string(&ClusterBundle::crd()).unwrap(),
        serde_yaml::to_string(&Bundle::crd()).unwrap(),
    ]
}
