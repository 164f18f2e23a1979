//! Process-wide configuration, read once at startup
//!
//! CLI flag parsing is treated as an external collaborator (see the project
//! README's scope notes); configuration is read directly from the
//! environment, mirroring how the teacher operator keeps its tracing setup
//! free of a CLI framework.

use std::env;

/// Process-wide configuration for the controller
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace where source ConfigMaps/Secrets live
    pub trust_namespace: String,
    /// Filesystem path to the default-CA manifest; `None` disables the
    /// System provider
    pub default_package_location: Option<String>,
    /// Allows Secret targets when true; ConfigMap-only otherwise
    pub secret_targets_enabled: bool,
    /// Drop certificates whose `NotAfter < now` during assembly
    pub filter_expired: bool,
    /// Drop certificates whose basic-constraints CA flag is false
    pub filter_non_ca: bool,
    /// Optional allow-list restricting materialization to these namespaces
    pub target_namespaces: Option<Vec<String>>,
    /// Port the Prometheus/health HTTP server listens on
    pub metrics_port: u16,
}

impl Config {
    /// Build configuration from environment variables, applying the same
    /// defaults the CRD schema applies to unset optional spec fields.
    pub fn from_env() -> Self {
        Self {
            trust_namespace: env::var("TRUST_NAMESPACE").unwrap_or_else(|_| "cert-manager".into()),
            default_package_location: env::var("DEFAULT_PACKAGE_LOCATION").ok(),
            secret_targets_enabled: env_bool("SECRET_TARGETS_ENABLED", false),
            filter_expired: env_bool("FILTER_EXPIRED", true),
            filter_non_ca: env_bool("FILTER_NON_CA", false),
            target_namespaces: env::var("TARGET_NAMESPACES").ok().map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            }),
            metrics_port: env::var("METRICS_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_bool_accepts_common_truthy_values() {
        assert!(env_bool("__TM_TEST_UNSET_KEY_A", false) == false);
        // SAFETY: test-only, single-threaded access to a process-unique key
        std::env::set_var("__TM_TEST_BOOL", "true");
        assert!(env_bool("__TM_TEST_BOOL", false));
        std::env::set_var("__TM_TEST_BOOL", "0");
        assert!(!env_bool("__TM_TEST_BOOL", true));
        std::env::remove_var("__TM_TEST_BOOL");
    }
}
