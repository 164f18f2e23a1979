//! Default-CA Package Loader (C3)
//!
//! Loads a versioned PEM package from the filesystem once at startup. The
//! package is process-wide immutable state: the controller never reloads
//! it, and a `ClusterBundle` referencing `defaultCAs.provider = System`
//! without a configured path fails reconciliation rather than falling back
//! to an empty pool.

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
struct DefaultCaManifest {
    name: String,
    version: String,
    bundle: String,
}

/// A loaded, content-addressed default-CA package
#[derive(Debug, Clone)]
pub struct DefaultCaPackage {
    name: String,
    version: String,
    bundle_pem: String,
    hash: String,
}

impl DefaultCaPackage {
    /// Parse `{name, version, bundle}` YAML from `path`. The whole file is
    /// read and parsed eagerly; any failure here should abort startup.
    pub fn load(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Transient(format!("reading default-CA manifest {}: {}", path, e)))?;
        let manifest: DefaultCaManifest = serde_yaml::from_str(&raw)
            .map_err(|e| Error::Transient(format!("parsing default-CA manifest {}: {}", path, e)))?;

        let hash = hex::encode(Sha256::digest(manifest.bundle.as_bytes()));
        Ok(Self {
            name: manifest.name,
            version: manifest.version,
            bundle_pem: manifest.bundle,
            hash: hash[..12.min(hash.len())].to_string(),
        })
    }

    pub fn bundle_pem(&self) -> &str {
        &self.bundle_pem
    }

    /// Content-addressed identifier: `name:version:hash`, truncated to a
    /// 12-character hash prefix for readability in `status.defaultCAVersion`
    pub fn string_id(&self) -> String {
        format!("{}:{}:{}", self.name, self.version, self.hash)
    }
}
