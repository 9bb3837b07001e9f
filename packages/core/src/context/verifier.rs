//! Peer verification against the keystore's certificates
//!
//! A peer whose end-entity certificate is byte-identical to a stored
//! certificate is trusted directly, whatever its basic constraints say.
//! Self-signed certificates minted as CAs are accepted that way. Every
//! other peer goes through webpki path building rooted in the stored
//! certificates.

use std::sync::Arc;

use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::server::WebPkiClientVerifier;
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::{CertificateError, DigitallySignedStruct, DistinguishedName, Error, RootCertStore, SignatureScheme};

use crate::error::{KeystoreError, Result};
use crate::keystore::Keystore;
use crate::pem::CertificateSummary;

/// Stored certificates a peer may present verbatim
#[derive(Debug)]
pub(crate) struct PinnedCertificates {
    certificates: Vec<(CertificateDer<'static>, CertificateSummary)>,
}

impl PinnedCertificates {
    pub(crate) fn from_keystore(keystore: &Keystore) -> Self {
        let certificates = keystore
            .certificates()
            .filter_map(|der| {
                CertificateSummary::from_der(der)
                    .ok()
                    .map(|summary| (der.clone(), summary))
            })
            .collect();
        Self { certificates }
    }

    fn find(&self, end_entity: &CertificateDer<'_>) -> Option<&CertificateSummary> {
        self.certificates
            .iter()
            .find(|(der, _)| der.as_ref() == end_entity.as_ref())
            .map(|(_, summary)| summary)
    }
}

fn check_validity(summary: &CertificateSummary, now: UnixTime) -> std::result::Result<(), Error> {
    let now = now.as_secs();
    if summary.is_valid_at(now) {
        return Ok(());
    }
    let error = if i64::try_from(now).is_ok_and(|now| now < summary.not_before) {
        CertificateError::NotValidYet
    } else {
        CertificateError::Expired
    };
    Err(Error::InvalidCertificate(error))
}

fn check_name(summary: &CertificateSummary, server_name: &ServerName<'_>) -> std::result::Result<(), Error> {
    let matches = match server_name {
        ServerName::DnsName(dns) => summary.matches_hostname(dns.as_ref()),
        ServerName::IpAddress(ip) => summary.matches_ip(std::net::IpAddr::from(*ip)),
        _ => false,
    };
    if matches {
        Ok(())
    } else {
        Err(Error::InvalidCertificate(CertificateError::NotValidForName))
    }
}

/// Verifies servers for a client configuration
#[derive(Debug)]
pub(crate) struct KeystoreServerVerifier {
    pinned: Arc<PinnedCertificates>,
    webpki: Arc<WebPkiServerVerifier>,
    provider: Arc<CryptoProvider>,
}

impl KeystoreServerVerifier {
    pub(crate) fn new(
        pinned: Arc<PinnedCertificates>,
        roots: Arc<RootCertStore>,
        provider: Arc<CryptoProvider>,
    ) -> Result<Self> {
        let webpki = WebPkiServerVerifier::builder_with_provider(roots, Arc::clone(&provider))
            .build()
            .map_err(|e| KeystoreError::TlsContext {
                reason: format!("unable to build server verifier: {e}"),
                source: None,
            })?;
        Ok(Self {
            pinned,
            webpki,
            provider,
        })
    }
}

impl ServerCertVerifier for KeystoreServerVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, Error> {
        if let Some(summary) = self.pinned.find(end_entity) {
            check_validity(summary, now)?;
            check_name(summary, server_name)?;
            tracing::debug!(subject = summary.subject_cn.as_deref().unwrap_or("-"), "Server presented a stored certificate");
            return Ok(ServerCertVerified::assertion());
        }
        self.webpki
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Verifies mandatory client certificates for a server configuration
#[derive(Debug)]
pub(crate) struct KeystoreClientVerifier {
    pinned: Arc<PinnedCertificates>,
    webpki: Arc<dyn ClientCertVerifier>,
    provider: Arc<CryptoProvider>,
}

impl KeystoreClientVerifier {
    pub(crate) fn new(
        pinned: Arc<PinnedCertificates>,
        roots: Arc<RootCertStore>,
        provider: Arc<CryptoProvider>,
    ) -> Result<Self> {
        let webpki = WebPkiClientVerifier::builder_with_provider(roots, Arc::clone(&provider))
            .build()
            .map_err(|e| KeystoreError::TlsContext {
                reason: format!("unable to build client verifier: {e}"),
                source: None,
            })?;
        Ok(Self {
            pinned,
            webpki,
            provider,
        })
    }
}

impl ClientCertVerifier for KeystoreClientVerifier {
    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_mandatory(&self) -> bool {
        true
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        self.webpki.root_hint_subjects()
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        now: UnixTime,
    ) -> std::result::Result<ClientCertVerified, Error> {
        if let Some(summary) = self.pinned.find(end_entity) {
            check_validity(summary, now)?;
            tracing::debug!(subject = summary.subject_cn.as_deref().unwrap_or("-"), "Client presented a stored certificate");
            return Ok(ClientCertVerified::assertion());
        }
        self.webpki.verify_client_cert(end_entity, intermediates, now)
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn summary(not_before: i64, not_after: i64) -> CertificateSummary {
        CertificateSummary {
            subject_cn: Some("kermit".into()),
            issuer_cn: Some("kermit".into()),
            san_dns_names: vec!["localhost".into()],
            san_ip_addresses: vec![std::net::IpAddr::from([127, 0, 0, 1])],
            serial: "01".into(),
            not_before,
            not_after,
        }
    }

    fn at(secs: u64) -> UnixTime {
        UnixTime::since_unix_epoch(Duration::from_secs(secs))
    }

    #[test]
    fn validity_window_maps_to_certificate_errors() {
        let summary = summary(100, 200);
        assert!(check_validity(&summary, at(150)).is_ok());
        assert!(matches!(
            check_validity(&summary, at(50)),
            Err(Error::InvalidCertificate(CertificateError::NotValidYet))
        ));
        assert!(matches!(
            check_validity(&summary, at(250)),
            Err(Error::InvalidCertificate(CertificateError::Expired))
        ));
    }

    #[test]
    fn stored_certificate_must_name_the_server() {
        let summary = summary(0, i64::MAX);
        let localhost = ServerName::try_from("localhost").unwrap();
        let loopback = ServerName::try_from("127.0.0.1").unwrap();
        let other = ServerName::try_from("example.org").unwrap();

        assert!(check_name(&summary, &localhost).is_ok());
        assert!(check_name(&summary, &loopback).is_ok());
        assert!(matches!(
            check_name(&summary, &other),
            Err(Error::InvalidCertificate(CertificateError::NotValidForName))
        ));
    }
}
