//! Trust-store Encoders (C2)
//!
//! Encodes a `CertificatePool` into the binary trust-store formats
//! requested by a target: PKCS#12 directly, and a JKS-compatible archive
//! via the same PKCS#12 machinery (the JVM's `PKCS12KeyStore` provider
//! reads either format identically, which is what "JKS-compatible" means
//! here — this does not emit the legacy proprietary JKS binary format).

use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::stack::Stack;
use openssl::x509::X509;
use sha2::{Digest, Sha256};

use crate::crd::Pkcs12Profile;
use crate::error::{Error, Result};
use crate::pool::CertificatePool;

/// Certificate and key digest/cipher algorithm pair for a PKCS#12 profile
struct Pkcs12Algorithms {
    cert_algorithm: Nid,
    key_algorithm: Nid,
}

fn algorithms_for(profile: Pkcs12Profile) -> Pkcs12Algorithms {
    match profile {
        Pkcs12Profile::LegacyRC2 => Pkcs12Algorithms {
            cert_algorithm: Nid::PBE_WITHSHA1AND40BITRC2_CBC,
            key_algorithm: Nid::PBE_WITHSHA1AND3_KEY_TRIPLEDES_CBC,
        },
        Pkcs12Profile::LegacyDES => Pkcs12Algorithms {
            cert_algorithm: Nid::PBE_WITHSHA1AND3_KEY_TRIPLEDES_CBC,
            key_algorithm: Nid::PBE_WITHSHA1AND3_KEY_TRIPLEDES_CBC,
        },
        Pkcs12Profile::Modern2023 => Pkcs12Algorithms {
            cert_algorithm: Nid::AES_256_CBC,
            key_algorithm: Nid::AES_256_CBC,
        },
    }
}

/// Build a trust-only PKCS#12 archive (no private key, no end-entity
/// certificate) containing every certificate in `pool`, in pool order.
///
/// A empty `password` is accepted: the `openssl` crate's `Pkcs12Builder`
/// has no way to pass a NULL password to `PKCS12_create` and fully disable
/// the MAC, so an empty password is used verbatim rather than omitted. See
/// DESIGN.md for this Open Question decision.
///
/// The returned bytes are not byte-stable across calls: OpenSSL generates a
/// fresh random PBE salt per cert bag and a fresh random MAC salt inside
/// `PKCS12_create2` on every invocation, and the `openssl` crate exposes no
/// builder option to fix either. Two archives built from the same pool,
/// password, and profile decode to the same certificates but never compare
/// equal as bytes. The canonical hash in `sync` (C5) is deliberately built
/// over the source PEM and declared passwords rather than these bytes, so
/// this does not defeat the no-op-reconcile invariant; see DESIGN.md.
pub fn encode_pkcs12(pool: &CertificatePool, password: &str, profile: Pkcs12Profile) -> Result<Vec<u8>> {
    if pool.is_empty() {
        return Err(Error::Encode(
            "cannot encode an empty certificate pool to PKCS#12".to_string(),
        ));
    }

    let algorithms = algorithms_for(profile);
    let mut ca_stack = Stack::<X509>::new()
        .map_err(|e| Error::Encode(format!("failed to allocate certificate stack: {}", e)))?;
    for cert in pool.certificates() {
        ca_stack
            .push(cert.clone())
            .map_err(|e| Error::Encode(format!("failed to stack certificate: {}", e)))?;
    }

    let mut builder = Pkcs12::builder();
    builder
        .ca(ca_stack)
        .cert_algorithm(algorithms.cert_algorithm)
        .key_algorithm(algorithms.key_algorithm);

    let pkcs12 = builder
        .build2(password)
        .map_err(|e| Error::Encode(format!("failed to build PKCS#12 archive: {}", e)))?;
    pkcs12
        .to_der()
        .map_err(|e| Error::Encode(format!("failed to DER-encode PKCS#12 archive: {}", e)))
}

/// JKS-compatible trust store: a PKCS#12 archive built with the legacy RC2
/// profile, which every modern JVM's `PKCS12` `KeyStore` provider accepts
/// in place of a `.jks` file.
pub fn encode_jks_compatible(pool: &CertificatePool, password: &str) -> Result<Vec<u8>> {
    encode_pkcs12(pool, password, Pkcs12Profile::LegacyRC2)
}

/// Human-readable alias for a certificate: first 8 hex chars of
/// `sha256(DER)`, then `|`, then the subject distinguished name rendered
/// as `CN=...,O=...` (RDNs in encounter order, since `openssl::x509::X509Name`
/// has no `Display` impl of its own)
pub fn alias_for(cert: &X509) -> Result<String> {
    let der = cert
        .to_der()
        .map_err(|e| Error::Encode(format!("failed to DER-encode certificate: {}", e)))?;
    let fingerprint = hex::encode(&Sha256::digest(&der)[..4]);
    let subject = render_name(cert.subject_name())?;
    Ok(format!("{}|{}", fingerprint, subject))
}

fn render_name(name: &openssl::x509::X509NameRef) -> Result<String> {
    let mut parts = Vec::new();
    for entry in name.entries() {
        let key = entry.object().nid().short_name().unwrap_or("UNKNOWN").to_string();
        let value = entry
            .data()
            .as_utf8()
            .map_err(|e| Error::Encode(format!("failed to decode RDN value: {}", e)))?;
        parts.push(format!("{}={}", key, value));
    }
    Ok(parts.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::CertificatePool;

    const TEST_CA_PEM: &str = include_str!("../../tests/fixtures/test_ca.pem");

    fn pool_with_ca() -> CertificatePool {
        let mut pool = CertificatePool::new(false, false);
        pool.add_from_pem(TEST_CA_PEM.as_bytes()).unwrap();
        pool
    }

    /// Sorted DER bytes of every CA certificate a PKCS#12 archive decodes to.
    fn certs_in(der: &[u8], password: &str) -> Vec<Vec<u8>> {
        let parsed = Pkcs12::from_der(der).unwrap().parse2(password).unwrap();
        let mut ders: Vec<Vec<u8>> = parsed
            .ca
            .unwrap()
            .iter()
            .map(|cert| cert.to_der().unwrap())
            .collect();
        ders.sort();
        ders
    }

    #[test]
    fn pkcs12_encoding_is_content_stable_but_not_byte_stable() {
        let pool = pool_with_ca();
        let a = encode_pkcs12(&pool, "changeit", Pkcs12Profile::Modern2023).unwrap();
        let b = encode_pkcs12(&pool, "changeit", Pkcs12Profile::Modern2023).unwrap();

        // OpenSSL salts both the cert-bag PBE and the MAC freshly on every
        // build2() call, with no way to fix either from the builder API, so
        // two archives built from identical inputs never match byte-for-byte.
        assert_ne!(a, b);
        assert_eq!(certs_in(&a, "changeit"), certs_in(&b, "changeit"));
    }

    #[test]
    fn empty_pool_is_rejected() {
        let pool = CertificatePool::new(false, false);
        assert!(encode_pkcs12(&pool, "changeit", Pkcs12Profile::Modern2023).is_err());
    }

    #[test]
    fn jks_compatible_uses_legacy_rc2_profile() {
        let pool = pool_with_ca();
        let jks = encode_jks_compatible(&pool, "changeit").unwrap();
        let direct = encode_pkcs12(&pool, "changeit", Pkcs12Profile::LegacyRC2).unwrap();
        assert_eq!(certs_in(&jks, "changeit"), certs_in(&direct, "changeit"));
    }

    #[test]
    fn alias_contains_subject_common_name() {
        let pool = pool_with_ca();
        let cert = pool.certificates().next().unwrap();
        let alias = alias_for(cert).unwrap();
        assert!(alias.contains("CN=trust-manager-test-ca"));
        assert_eq!(alias.split('|').next().unwrap().len(), 8);
    }
}
