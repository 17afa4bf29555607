//! Client-certificate issuance for mutual-TLS database authentication.
//!
//! [`issue_client_certificate`] derives a fresh leaf certificate/key from a
//! supplied CA key and certificate. The output is non-deterministic (a new
//! key pair and serial number on every call), so callers are responsible for
//! idempotency via an existence check on the persisted bundle; this module
//! never checks what was issued before.
//!
//! Serial numbers are drawn at random (16 bytes from a v4 UUID); the
//! collision risk is accepted and no issuance log is kept.

use std::collections::BTreeMap;

use chrono::{Datelike, Months, Utc};
use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose, SerialNumber, PKCS_ECDSA_P384_SHA384,
};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;
use x509_parser::prelude::*;

/// Secret key under which the CA certificate is persisted.
pub const CA_CERTIFICATE_KEY: &str = "ca.crt";
/// Secret key under which the leaf certificate is persisted.
pub const CERTIFICATE_KEY: &str = "tls.crt";
/// Secret key under which the leaf private key is persisted.
pub const PRIVATE_KEY_KEY: &str = "tls.key";

/// Errors from certificate issuance and verification.
#[derive(Debug, Error)]
pub enum PkiError {
    #[error("invalid CA private key: {0}")]
    InvalidCaKey(String),

    #[error("invalid CA certificate: {0}")]
    InvalidCaCertificate(String),

    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("certificate verification failed: {0}")]
    Verification(String),
}

/// Result type for PKI operations.
pub type PkiResult<T> = Result<T, PkiError>;

/// CA certificate plus leaf certificate/key issued for one user, all
/// PEM-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialBundle {
    /// CA certificate the leaf chains to.
    pub ca_certificate: String,
    /// Leaf client certificate, CommonName = username.
    pub certificate: String,
    /// Leaf private key.
    pub private_key: String,
}

impl CredentialBundle {
    /// Render the bundle as secret data under the conventional keys.
    #[must_use]
    pub fn into_secret_data(self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (CA_CERTIFICATE_KEY.to_string(), self.ca_certificate),
            (CERTIFICATE_KEY.to_string(), self.certificate),
            (PRIVATE_KEY_KEY.to_string(), self.private_key),
        ])
    }

    /// SHA-256 fingerprint of the leaf certificate, colon-separated hex.
    pub fn fingerprint(&self) -> PkiResult<String> {
        let der = pem_to_der(&self.certificate)
            .map_err(|e| PkiError::InvalidCertificate(e.to_string()))?;
        let digest = Sha256::digest(&der);
        Ok(digest
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(":"))
    }
}

/// Issue a fresh leaf client certificate for `username`, signed by the
/// supplied CA.
///
/// The leaf key is ECDSA P-384. CommonName is the username (how both
/// PostgreSQL and MySQL map client certificates to accounts); the validity
/// window runs from issue time to twelve months later.
pub fn issue_client_certificate(
    username: &str,
    ca_key_pem: &str,
    ca_certificate_pem: &str,
) -> PkiResult<CredentialBundle> {
    let ca_key =
        KeyPair::from_pem(ca_key_pem).map_err(|e| PkiError::InvalidCaKey(e.to_string()))?;
    let ca_issuer = issuer_certificate(ca_certificate_pem, &ca_key)?;

    let leaf_key = KeyPair::generate_for(&PKCS_ECDSA_P384_SHA384)
        .map_err(|e| PkiError::Signing(e.to_string()))?;

    let mut params = CertificateParams::default();
    params
        .distinguished_name
        .push(DnType::CommonName, username);

    let not_before = Utc::now();
    let not_after = not_before + Months::new(12);
    params.not_before = rcgen::date_time_ymd(
        not_before.year(),
        not_before.month() as u8,
        not_before.day() as u8,
    );
    params.not_after = rcgen::date_time_ymd(
        not_after.year(),
        not_after.month() as u8,
        not_after.day() as u8,
    );

    params.serial_number = Some(random_serial());
    params.is_ca = IsCa::NoCa;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];

    let certificate = params
        .signed_by(&leaf_key, &ca_issuer, &ca_key)
        .map_err(|e| PkiError::Signing(e.to_string()))?;

    Ok(CredentialBundle {
        ca_certificate: ca_certificate_pem.to_string(),
        certificate: certificate.pem(),
        private_key: leaf_key.serialize_pem(),
    })
}

/// Verify that `certificate_pem` chains to `ca_certificate_pem` and is
/// usable for client authentication right now.
///
/// Checks issuer DN against the CA subject, the signature against the CA
/// public key, the extended-key-usage extension for client auth, and the
/// validity window.
pub fn verify_client_certificate(
    certificate_pem: &str,
    ca_certificate_pem: &str,
) -> PkiResult<()> {
    let leaf_der =
        pem_to_der(certificate_pem).map_err(|e| PkiError::InvalidCertificate(e.to_string()))?;
    let (_, leaf) = X509Certificate::from_der(&leaf_der)
        .map_err(|e| PkiError::InvalidCertificate(format!("{e:?}")))?;

    let ca_der = pem_to_der(ca_certificate_pem)
        .map_err(|e| PkiError::InvalidCaCertificate(e.to_string()))?;
    let (_, ca) = X509Certificate::from_der(&ca_der)
        .map_err(|e| PkiError::InvalidCaCertificate(format!("{e:?}")))?;

    if leaf.issuer() != ca.subject() {
        return Err(PkiError::Verification(
            "issuer DN does not match CA subject DN".to_string(),
        ));
    }

    leaf.verify_signature(Some(ca.public_key()))
        .map_err(|e| PkiError::Verification(format!("signature check failed: {e:?}")))?;

    let client_auth = leaf
        .extended_key_usage()
        .map_err(|e| PkiError::Verification(format!("{e:?}")))?
        .map(|ext| ext.value.client_auth)
        .unwrap_or(false);
    if !client_auth {
        return Err(PkiError::Verification(
            "extended key usage does not allow client authentication".to_string(),
        ));
    }

    if !leaf.validity().is_valid() {
        return Err(PkiError::Verification(
            "certificate is outside its validity window".to_string(),
        ));
    }

    Ok(())
}

/// Generate a self-signed CA suitable for signing client certificates.
///
/// Returns `(ca_certificate_pem, ca_key_pem)`. Used for bootstrap tooling
/// and tests; production deployments normally bring an existing CA.
pub fn generate_ca(common_name: &str) -> PkiResult<(String, String)> {
    let key = KeyPair::generate_for(&PKCS_ECDSA_P384_SHA384)
        .map_err(|e| PkiError::Signing(e.to_string()))?;

    let mut params = CertificateParams::default();
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);

    let not_before = Utc::now();
    let not_after = not_before + Months::new(120);
    params.not_before = rcgen::date_time_ymd(
        not_before.year(),
        not_before.month() as u8,
        not_before.day() as u8,
    );
    params.not_after = rcgen::date_time_ymd(
        not_after.year(),
        not_after.month() as u8,
        not_after.day() as u8,
    );

    params.is_ca = IsCa::Ca(BasicConstraints::Constrained(0));
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];

    let certificate = params
        .self_signed(&key)
        .map_err(|e| PkiError::Signing(e.to_string()))?;

    Ok((certificate.pem(), key.serialize_pem()))
}

/// Rebuild an rcgen issuer certificate from a PEM CA certificate.
///
/// rcgen signs against its own `Certificate` type, so the CA's subject DN
/// is lifted out of the parsed X.509 certificate into fresh params and
/// re-signed with the CA key.
fn issuer_certificate(
    ca_certificate_pem: &str,
    ca_key: &KeyPair,
) -> PkiResult<rcgen::Certificate> {
    let ca_der = pem_to_der(ca_certificate_pem)
        .map_err(|e| PkiError::InvalidCaCertificate(e.to_string()))?;
    let (_, ca) = X509Certificate::from_der(&ca_der)
        .map_err(|e| PkiError::InvalidCaCertificate(format!("{e:?}")))?;

    let mut params = CertificateParams::default();
    for rdn in ca.subject().iter() {
        for attr in rdn.iter() {
            let value = attr.as_str().unwrap_or_default();
            match attr.attr_type().to_string().as_str() {
                "2.5.4.3" => params.distinguished_name.push(DnType::CommonName, value),
                "2.5.4.6" => params.distinguished_name.push(DnType::CountryName, value),
                "2.5.4.7" => params.distinguished_name.push(DnType::LocalityName, value),
                "2.5.4.8" => params
                    .distinguished_name
                    .push(DnType::StateOrProvinceName, value),
                "2.5.4.10" => params
                    .distinguished_name
                    .push(DnType::OrganizationName, value),
                "2.5.4.11" => params
                    .distinguished_name
                    .push(DnType::OrganizationalUnitName, value),
                _ => {}
            }
        }
    }

    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];

    params
        .self_signed(ca_key)
        .map_err(|e| PkiError::Signing(e.to_string()))
}

fn random_serial() -> SerialNumber {
    let uuid = Uuid::new_v4();
    SerialNumber::from_slice(uuid.as_bytes())
}

fn pem_to_der(pem_str: &str) -> Result<Vec<u8>, ::pem::PemError> {
    Ok(::pem::parse(pem_str)?.contents().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_ca() -> (String, String) {
        generate_ca("grantor test CA").unwrap()
    }

    #[test]
    fn generated_ca_is_pem_encoded() {
        let (cert, key) = test_ca();
        assert!(cert.contains("BEGIN CERTIFICATE"));
        assert!(key.contains("BEGIN PRIVATE KEY"));
    }

    #[test]
    fn issued_certificate_verifies_against_the_ca() {
        let (ca_cert, ca_key) = test_ca();
        let bundle = issue_client_certificate("alice", &ca_key, &ca_cert).unwrap();

        assert_eq!(bundle.ca_certificate, ca_cert);
        verify_client_certificate(&bundle.certificate, &ca_cert).unwrap();
    }

    #[test]
    fn issued_certificate_carries_the_username_as_common_name() {
        let (ca_cert, ca_key) = test_ca();
        let bundle = issue_client_certificate("alice", &ca_key, &ca_cert).unwrap();

        let der = ::pem::parse(&bundle.certificate).unwrap().contents().to_vec();
        let (_, cert) = X509Certificate::from_der(&der).unwrap();
        let cn = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .unwrap();
        assert_eq!(cn, "alice");
    }

    #[test]
    fn issued_certificate_is_not_self_signed() {
        let (ca_cert, ca_key) = test_ca();
        let bundle = issue_client_certificate("alice", &ca_key, &ca_cert).unwrap();

        let der = ::pem::parse(&bundle.certificate).unwrap().contents().to_vec();
        let (_, cert) = X509Certificate::from_der(&der).unwrap();
        assert_ne!(cert.subject(), cert.issuer());
    }

    #[test]
    fn serial_numbers_differ_between_issuances() {
        let (ca_cert, ca_key) = test_ca();
        let first = issue_client_certificate("alice", &ca_key, &ca_cert).unwrap();
        let second = issue_client_certificate("alice", &ca_key, &ca_cert).unwrap();

        let serial = |pem_str: &str| {
            let der = ::pem::parse(pem_str).unwrap().contents().to_vec();
            let (_, cert) = X509Certificate::from_der(&der).unwrap();
            cert.serial.to_bytes_be()
        };
        assert_ne!(serial(&first.certificate), serial(&second.certificate));
        assert_ne!(first.private_key, second.private_key);
    }

    #[test]
    fn verification_rejects_a_foreign_ca() {
        let (ca_cert, ca_key) = test_ca();
        let (other_ca, _) = generate_ca("unrelated CA").unwrap();
        let bundle = issue_client_certificate("alice", &ca_key, &ca_cert).unwrap();

        let err = verify_client_certificate(&bundle.certificate, &other_ca).unwrap_err();
        assert!(matches!(err, PkiError::Verification(_)));
    }

    #[test]
    fn bundle_renders_the_conventional_secret_keys() {
        let (ca_cert, ca_key) = test_ca();
        let bundle = issue_client_certificate("alice", &ca_key, &ca_cert).unwrap();
        let data = bundle.into_secret_data();

        assert_eq!(data.len(), 3);
        assert!(data.contains_key("ca.crt"));
        assert!(data.contains_key("tls.crt"));
        assert!(data.contains_key("tls.key"));
    }

    #[test]
    fn fingerprint_is_colon_separated_hex() {
        let (ca_cert, ca_key) = test_ca();
        let bundle = issue_client_certificate("alice", &ca_key, &ca_cert).unwrap();
        let fp = bundle.fingerprint().unwrap();
        assert_eq!(fp.split(':').count(), 32);
    }
}
