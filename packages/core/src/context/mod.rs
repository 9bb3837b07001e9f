//! TLS context derivation
//!
//! Key managers come from the keystore's key entries, trust managers from
//! every certificate it holds. The same store therefore acts as keystore
//! and truststore.

pub mod key_manager;
mod verifier;

use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::pki_types::PrivateKeyDer;
use rustls::sign::CertifiedKey;
use rustls::{ClientConfig, RootCertStore, ServerConfig};

pub use key_manager::KeyManager;
use key_manager::Identity;
use verifier::{KeystoreClientVerifier, KeystoreServerVerifier, PinnedCertificates};

use crate::error::{KeystoreError, Result};
use crate::keystore::Keystore;
use crate::pem::CertificateSummary;

/// Crypto provider used for every derived configuration
#[must_use]
pub fn default_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Derive key managers from every key entry of `keystore`.
pub fn build_key_managers(keystore: &Keystore, provider: &CryptoProvider) -> Result<KeyManager> {
    let mut identities = Vec::new();
    for (alias, key, chain) in keystore.key_entries() {
        let signing_key = provider
            .key_provider
            .load_private_key(PrivateKeyDer::Pkcs8(key.clone_key()))
            .map_err(|e| KeystoreError::tls(format!("unusable private key for alias '{alias}'"), e))?;

        let summary = chain
            .first()
            .and_then(|leaf| CertificateSummary::from_der(leaf).ok());

        identities.push(Identity {
            alias: alias.to_string(),
            summary,
            certified_key: Arc::new(CertifiedKey::new(chain.to_vec(), signing_key)),
        });
    }

    tracing::debug!(identities = identities.len(), "Derived key managers");
    Ok(KeyManager::new(identities))
}

/// Derive trust managers from every certificate of `keystore`.
pub fn build_trust_managers(keystore: &Keystore) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    for certificate in keystore.certificates() {
        roots
            .add(certificate.clone())
            .map_err(|e| KeystoreError::tls("certificate rejected as trust anchor", e))?;
    }

    tracing::debug!(anchors = roots.len(), "Derived trust managers");
    Ok(roots)
}

/// Key managers and trust managers derived from one keystore
#[derive(Clone, Debug)]
pub struct TlsContext {
    key_managers: Arc<KeyManager>,
    trust_managers: Arc<RootCertStore>,
    pinned: Arc<PinnedCertificates>,
    provider: Arc<CryptoProvider>,
}

impl TlsContext {
    /// Derive a context from `keystore` using the default crypto provider.
    pub fn from_keystore(keystore: &Keystore) -> Result<Self> {
        Self::with_provider(keystore, default_provider())
    }

    pub fn with_provider(keystore: &Keystore, provider: Arc<CryptoProvider>) -> Result<Self> {
        let key_managers = build_key_managers(keystore, &provider)?;
        let trust_managers = build_trust_managers(keystore)?;
        Ok(Self {
            key_managers: Arc::new(key_managers),
            trust_managers: Arc::new(trust_managers),
            pinned: Arc::new(PinnedCertificates::from_keystore(keystore)),
            provider,
        })
    }

    #[must_use]
    pub fn key_managers(&self) -> &KeyManager {
        &self.key_managers
    }

    #[must_use]
    pub fn trust_managers(&self) -> &RootCertStore {
        &self.trust_managers
    }

    fn require_identity(&self) -> Result<()> {
        if self.key_managers.is_empty() {
            return Err(KeystoreError::TlsContext {
                reason: "keystore holds no key entry to present".to_string(),
                source: None,
            });
        }
        Ok(())
    }

    /// Server configuration presenting the key-manager identity, without
    /// client authentication.
    pub fn server_config(&self) -> Result<Arc<ServerConfig>> {
        self.require_identity()?;
        let config = ServerConfig::builder_with_provider(Arc::clone(&self.provider))
            .with_safe_default_protocol_versions()
            .map_err(|e| KeystoreError::tls("no usable protocol versions", e))?
            .with_no_client_auth()
            .with_cert_resolver(Arc::clone(&self.key_managers) as Arc<dyn rustls::server::ResolvesServerCert>);
        Ok(Arc::new(config))
    }

    /// Server configuration that also requires clients to present a
    /// certificate rooted in the trust managers.
    pub fn server_config_with_client_auth(&self) -> Result<Arc<ServerConfig>> {
        self.require_identity()?;
        let verifier = KeystoreClientVerifier::new(
            Arc::clone(&self.pinned),
            Arc::clone(&self.trust_managers),
            Arc::clone(&self.provider),
        )?;

        let config = ServerConfig::builder_with_provider(Arc::clone(&self.provider))
            .with_safe_default_protocol_versions()
            .map_err(|e| KeystoreError::tls("no usable protocol versions", e))?
            .with_client_cert_verifier(Arc::new(verifier))
            .with_cert_resolver(Arc::clone(&self.key_managers) as Arc<dyn rustls::server::ResolvesServerCert>);
        Ok(Arc::new(config))
    }

    /// Client configuration verifying servers against the trust managers
    /// and presenting the key-manager identity when one exists.
    ///
    /// Fails when the keystore holds no certificate to trust.
    pub fn client_config(&self) -> Result<Arc<ClientConfig>> {
        let verifier = KeystoreServerVerifier::new(
            Arc::clone(&self.pinned),
            Arc::clone(&self.trust_managers),
            Arc::clone(&self.provider),
        )?;
        let builder = ClientConfig::builder_with_provider(Arc::clone(&self.provider))
            .with_safe_default_protocol_versions()
            .map_err(|e| KeystoreError::tls("no usable protocol versions", e))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier));

        let config = if self.key_managers.is_empty() {
            builder.with_no_client_auth()
        } else {
            builder.with_client_cert_resolver(Arc::clone(&self.key_managers) as Arc<dyn rustls::client::ResolvesClientCert>)
        };
        Ok(Arc::new(config))
    }
}
