//! Certificate and private key readers over the PEM codec

use std::net::IpAddr;
use std::path::Path;

use ring::signature::RsaKeyPair;
use rustls::pki_types::{CertificateDer, PrivatePkcs8KeyDer};
use x509_parser::extensions::GeneralName;
use x509_parser::certificate::X509Certificate;
use x509_parser::error::X509Error;

use super::codec::{self, PemError};
use crate::error::{KeystoreError, Result};

pub const CERTIFICATE: &str = "CERTIFICATE";
pub const PRIVATE_KEY: &str = "PRIVATE KEY";

/// Details extracted from an X.509 certificate for logging and SNI selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSummary {
    pub subject_cn: Option<String>,
    pub issuer_cn: Option<String>,
    pub san_dns_names: Vec<String>,
    pub san_ip_addresses: Vec<IpAddr>,
    /// Serial number as lowercase hex
    pub serial: String,
    /// Unix timestamps of the validity window
    pub not_before: i64,
    pub not_after: i64,
}

impl CertificateSummary {
    /// Parse a DER certificate and extract its summary.
    pub fn from_der(der: &[u8]) -> std::result::Result<Self, x509_parser::nom::Err<X509Error>> {
        let (_, cert) = x509_parser::parse_x509_certificate(der)?;
        Ok(Self::from_parsed(&cert))
    }

    fn from_parsed(cert: &X509Certificate<'_>) -> Self {
        let common_name = |name: &x509_parser::x509::X509Name<'_>| {
            name.iter_common_name()
                .next()
                .and_then(|cn| cn.as_str().ok())
                .map(str::to_string)
        };

        let mut san_dns_names = Vec::new();
        let mut san_ip_addresses = Vec::new();
        match cert.subject_alternative_name() {
            Ok(Some(san)) => {
                for name in &san.value.general_names {
                    match name {
                        GeneralName::DNSName(dns) => san_dns_names.push((*dns).to_string()),
                        GeneralName::IPAddress(bytes) => {
                            if let Ok(octets) = <[u8; 4]>::try_from(*bytes) {
                                san_ip_addresses.push(IpAddr::from(octets));
                            } else if let Ok(octets) = <[u8; 16]>::try_from(*bytes) {
                                san_ip_addresses.push(IpAddr::from(octets));
                            }
                        }
                        _ => {}
                    }
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to parse SubjectAltName extension: {}", e),
        }

        Self {
            subject_cn: common_name(cert.subject()),
            issuer_cn: common_name(cert.issuer()),
            san_dns_names,
            san_ip_addresses,
            serial: hex::encode(cert.raw_serial()),
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
        }
    }

    /// Whether this certificate names `hostname` in its SANs, or in its
    /// common name when it carries no DNS SANs.
    #[must_use]
    pub fn matches_hostname(&self, hostname: &str) -> bool {
        if self.san_dns_names.is_empty() {
            return self
                .subject_cn
                .as_deref()
                .is_some_and(|cn| match_hostname(hostname, cn));
        }
        self.san_dns_names.iter().any(|san| match_hostname(hostname, san))
    }

    #[must_use]
    pub fn matches_ip(&self, ip: IpAddr) -> bool {
        self.san_ip_addresses.contains(&ip)
    }

    /// Whether `unix_secs` falls inside the validity window.
    #[must_use]
    pub fn is_valid_at(&self, unix_secs: u64) -> bool {
        i64::try_from(unix_secs).is_ok_and(|now| self.not_before <= now && now <= self.not_after)
    }
}

/// Match hostname against a DNS name pattern (single-label leading wildcard)
pub(crate) fn match_hostname(hostname: &str, pattern: &str) -> bool {
    let hostname = hostname.trim_end_matches('.').to_ascii_lowercase();
    let pattern = pattern.trim_end_matches('.').to_ascii_lowercase();

    if hostname == pattern {
        return true;
    }

    match pattern.strip_prefix("*.") {
        Some(suffix) => match hostname.strip_suffix(suffix) {
            Some(prefix) => {
                let label = prefix.strip_suffix('.').unwrap_or_default();
                !label.is_empty() && !label.contains('.')
            }
            None => false,
        },
        None => false,
    }
}

fn decode_file(path: &Path, block_type: &str) -> Result<Option<Vec<u8>>> {
    let bytes = std::fs::read(path)
        .map_err(|e| KeystoreError::malformed_with(path, "unable to read material", e))?;

    codec::decode(&bytes, block_type).map_err(|e: PemError| KeystoreError::malformed_with(path, e.to_string(), e))
}

/// Read the first certificate from a PEM file.
///
/// `Ok(None)` means the file holds no `CERTIFICATE` block.
pub fn read_certificate(path: &Path) -> Result<Option<CertificateDer<'static>>> {
    let Some(der) = decode_file(path, CERTIFICATE)? else {
        return Ok(None);
    };

    let summary = CertificateSummary::from_der(&der)
        .map_err(|e| KeystoreError::malformed_with(path, "invalid X.509 certificate", e))?;
    tracing::debug!(
        path = %path.display(),
        subject = summary.subject_cn.as_deref().unwrap_or("-"),
        serial = %summary.serial,
        "Decoded certificate"
    );

    Ok(Some(CertificateDer::from(der)))
}

/// Read the first PKCS#8 RSA private key from a PEM file.
///
/// `Ok(None)` means the file holds no `PRIVATE KEY` block.
pub fn read_private_key(path: &Path) -> Result<Option<PrivatePkcs8KeyDer<'static>>> {
    let Some(der) = decode_file(path, PRIVATE_KEY)? else {
        return Ok(None);
    };

    RsaKeyPair::from_pkcs8(&der).map_err(|e| {
        KeystoreError::malformed(path, format!("not a usable PKCS#8 RSA private key: {e}"))
    })?;

    Ok(Some(PrivatePkcs8KeyDer::from(der)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_and_wildcard_hostnames() {
        assert!(match_hostname("localhost", "localhost"));
        assert!(match_hostname("API.example.com", "api.example.com"));
        assert!(match_hostname("api.example.com", "*.example.com"));
        assert!(!match_hostname("a.b.example.com", "*.example.com"));
        assert!(!match_hostname("example.com", "*.example.com"));
        assert!(!match_hostname("other.org", "*.example.com"));
    }

    #[test]
    fn summary_prefers_sans_over_common_name() {
        let summary = CertificateSummary {
            subject_cn: Some("kermit".into()),
            issuer_cn: Some("kermit".into()),
            san_dns_names: vec!["localhost".into()],
            san_ip_addresses: vec![IpAddr::from([127, 0, 0, 1])],
            serial: "01".into(),
            not_before: 0,
            not_after: i64::MAX,
        };
        assert!(summary.matches_ip(IpAddr::from([127, 0, 0, 1])));
        assert!(!summary.matches_ip(IpAddr::from([10, 0, 0, 1])));
        assert!(summary.matches_hostname("localhost"));
        assert!(!summary.matches_hostname("kermit"));

        let cn_only = CertificateSummary {
            san_dns_names: Vec::new(),
            ..summary
        };
        assert!(cn_only.matches_hostname("kermit"));
    }

    #[test]
    fn validity_window_is_inclusive() {
        let der = codec::decode(&std::fs::read(fixture("kermit.crt")).unwrap(), CERTIFICATE)
            .unwrap()
            .unwrap();
        let summary = CertificateSummary::from_der(&der).unwrap();
        let not_before = u64::try_from(summary.not_before).unwrap();

        assert!(summary.is_valid_at(not_before));
        assert!(!summary.is_valid_at(not_before - 1));
        assert!(!summary.is_valid_at(u64::MAX));
        assert_eq!(summary.san_dns_names, vec!["localhost".to_string()]);
    }

    fn fixture(name: &str) -> std::path::PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name)
    }
}
