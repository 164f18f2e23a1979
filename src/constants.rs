//! Reserved keys and process-wide constants
//!
//! These values must stay invariant across releases: the field manager name
//! gates server-side apply ownership, and the annotation/label keys are part
//! of the on-wire contract between this controller and materialized objects.

/// Reserved annotation/label domain; user-supplied metadata may not use it
pub const RESERVED_DOMAIN: &str = "trust-manager.io/";

/// Label placed on every materialized target object, value = bundle name
pub const BUNDLE_LABEL_KEY: &str = "trust-manager.io/bundle";

/// Annotation carrying the canonical hash `H` on every materialized object
pub const BUNDLE_HASH_KEY: &str = "trust-manager.io/hash";

/// Annotation on a `ClusterBundle` preserving the legacy JKS key during
/// schema conversion, so a reverse conversion can re-materialize JKS
pub const JKS_KEY_ANNOTATION: &str = "trust-manager.io/original-jks-key";

/// Annotation signalling a `ClusterBundle` is user-managed post-migration
pub const MIGRATED_ANNOTATION: &str = "trust-manager.io/migrated";

/// Field manager name used for every server-side apply write
pub const FIELD_MANAGER: &str = "trust-manager";

/// Field manager used by the legacy-to-current projection controller
pub const LEGACY_ADAPTER_FIELD_MANAGER: &str = "trust-manager-legacy-adapter";

/// Field manager used by releases prior to the SSA migration; any fields
/// still owned by this manager are transferred to `FIELD_MANAGER` on first
/// touch
pub const LEGACY_CSA_FIELD_MANAGER: &str = "trust-manager-controller";

/// Finalizer placed on `ClusterBundle` while target objects are managed
pub const FINALIZER: &str = "trust-manager.io/target-cleanup";
