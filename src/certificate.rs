//! Certificate inspection helpers used by the renewal decision.
//!
//! Only the first certificate of a PEM bundle is ever considered: the leaf
//! is what determines domain coverage, expiry and identity, intermediates
//! are carried along untouched.

use chrono::{DateTime, TimeZone, Utc};
use log::debug;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use x509_parser::prelude::{FromDer, GeneralName, X509Certificate};

use crate::core::types::FingerprintAlgorithm;
use crate::domain::domain_matches;
use crate::errors::CertificateError;

/// Facts extracted from the leaf certificate of a PEM bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    /// Subject CN followed by every dNSName SAN, in certificate order.
    pub domains: Vec<String>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub issuer: String,
}

/// DER bytes of the first `CERTIFICATE` block in `pem`.
fn leaf_der(pem: &str) -> Result<Vec<u8>, CertificateError> {
    let blocks = pem::parse_many(pem.trim())
        .map_err(|err| CertificateError::MalformedCertificate(format!("invalid PEM: {err}")))?;
    blocks
        .into_iter()
        .find(|block| block.tag() == "CERTIFICATE")
        .map(|block| block.into_contents())
        .ok_or_else(|| {
            CertificateError::MalformedCertificate("no certificate PEM block found".into())
        })
}

fn to_utc(timestamp: i64) -> Result<DateTime<Utc>, CertificateError> {
    Utc.timestamp_opt(timestamp, 0).single().ok_or_else(|| {
        CertificateError::MalformedCertificate(format!("validity out of range: {timestamp}"))
    })
}

pub fn parse_certificate_info(pem: &str) -> Result<CertificateInfo, CertificateError> {
    let der = leaf_der(pem)?;
    let (_, cert) = X509Certificate::from_der(&der)
        .map_err(|err| CertificateError::MalformedCertificate(err.to_string()))?;

    let mut domains: Vec<String> = cert
        .subject()
        .iter_common_name()
        .filter_map(|cn| cn.as_str().ok())
        .map(str::to_string)
        .collect();

    let san = cert
        .subject_alternative_name()
        .map_err(|err| CertificateError::MalformedCertificate(err.to_string()))?;
    if let Some(san) = san {
        for name in &san.value.general_names {
            if let GeneralName::DNSName(dns) = name {
                domains.push(dns.to_string());
            }
        }
    }

    Ok(CertificateInfo {
        domains,
        not_before: to_utc(cert.validity().not_before.timestamp())?,
        not_after: to_utc(cert.validity().not_after.timestamp())?,
        issuer: cert.issuer().to_string(),
    })
}

/// True when `target_domain` is covered and `now` is strictly before expiry.
pub fn is_cert_valid(pem: &str, target_domain: &str, now: DateTime<Utc>) -> bool {
    match parse_certificate_info(pem) {
        Ok(info) => domain_matches(target_domain, &info.domains) && now < info.not_after,
        Err(err) => {
            debug!("[certificate] validation failed to parse certificate: {err}");
            false
        }
    }
}

/// Format-only check: the bundle starts with a parseable X.509 certificate.
pub fn validate_format(pem: &str) -> bool {
    let parsed = leaf_der(pem).and_then(|der| {
        X509Certificate::from_der(&der)
            .map(|_| ())
            .map_err(|err| CertificateError::MalformedCertificate(err.to_string()))
    });
    match parsed {
        Ok(()) => true,
        Err(err) => {
            debug!("[certificate] format validation failed: {err}");
            false
        }
    }
}

/// Digest of the leaf DER, colon separated.
///
/// SHA-256 renders uppercase and SHA-1 lowercase; this matches what the
/// respective control-plane APIs report.
pub fn fingerprint(pem: &str, algorithm: FingerprintAlgorithm) -> Result<String, CertificateError> {
    let der = leaf_der(pem)?;
    let formatted = match algorithm {
        FingerprintAlgorithm::Sha256 => colon_separated(&hex::encode_upper(Sha256::digest(&der))),
        FingerprintAlgorithm::Sha1 => colon_separated(&hex::encode(Sha1::digest(&der))),
    };
    Ok(formatted)
}

/// Canonical lowercase colon-separated form of a fingerprint from any source.
///
/// Falls back to the trimmed, lowercased input when the hex digits do not
/// pair up.
pub fn normalize_fingerprint(raw: &str) -> String {
    let digits: String = raw
        .chars()
        .filter(char::is_ascii_hexdigit)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if digits.len() % 2 != 0 {
        return raw.trim().to_lowercase();
    }
    colon_separated(&digits)
}

fn colon_separated(hex: &str) -> String {
    hex.as_bytes()
        .chunks(2)
        .filter_map(|pair| std::str::from_utf8(pair).ok())
        .collect::<Vec<_>>()
        .join(":")
}

/// Fingerprint plus validity window and issuer, as attached to lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSummary {
    pub fingerprint: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub issuer: String,
}

pub fn certificate_summary(
    pem: &str,
    algorithm: FingerprintAlgorithm,
) -> Result<CertificateSummary, CertificateError> {
    let info = parse_certificate_info(pem)?;
    Ok(CertificateSummary {
        fingerprint: fingerprint(pem, algorithm)?,
        not_before: info.not_before,
        not_after: info.not_after,
        issuer: info.issuer,
    })
}

/// Shortened fingerprint for log lines.
pub fn abbreviate(fingerprint: &str) -> String {
    match fingerprint.get(..20) {
        Some(head) if fingerprint.len() > 20 => format!("{head}..."),
        _ => fingerprint.to_string(),
    }
}
