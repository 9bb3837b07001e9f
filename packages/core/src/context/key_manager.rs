//! Identity selection over the keystore's key entries

use std::sync::Arc;

use rustls::SignatureScheme;
use rustls::client::ResolvesClientCert;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;

use crate::pem::CertificateSummary;

/// One key entry ready for the handshake
#[derive(Debug)]
pub(crate) struct Identity {
    pub alias: String,
    pub summary: Option<CertificateSummary>,
    pub certified_key: Arc<CertifiedKey>,
}

/// Certificate resolver backed by every key entry of a keystore.
///
/// Servers pick the entry whose certificate names the SNI host, falling
/// back to the first alias; clients present the first alias.
#[derive(Debug, Default)]
pub struct KeyManager {
    identities: Vec<Identity>,
}

impl KeyManager {
    pub(crate) fn new(identities: Vec<Identity>) -> Self {
        Self { identities }
    }

    /// Aliases of the identities this manager can present, in selection order.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.identities.iter().map(|identity| identity.alias.as_str())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Alias of the identity presented for `server_name`.
    #[must_use]
    pub fn select(&self, server_name: Option<&str>) -> Option<&str> {
        self.select_identity(server_name).map(|identity| identity.alias.as_str())
    }

    fn select_identity(&self, server_name: Option<&str>) -> Option<&Identity> {
        let by_name = server_name.and_then(|name| {
            self.identities.iter().find(|identity| {
                identity
                    .summary
                    .as_ref()
                    .is_some_and(|summary| summary.matches_hostname(name))
            })
        });
        by_name.or_else(|| self.identities.first())
    }
}

impl ResolvesServerCert for KeyManager {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let server_name = client_hello.server_name();
        let identity = self.select_identity(server_name)?;
        tracing::debug!(alias = %identity.alias, sni = server_name.unwrap_or("-"), "Selected server identity");
        Some(Arc::clone(&identity.certified_key))
    }
}

impl ResolvesClientCert for KeyManager {
    fn resolve(&self, _root_hint_subjects: &[&[u8]], _sigschemes: &[SignatureScheme]) -> Option<Arc<CertifiedKey>> {
        self.identities
            .first()
            .map(|identity| Arc::clone(&identity.certified_key))
    }

    fn has_certs(&self) -> bool {
        !self.identities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::*;
    use crate::context::{build_key_managers, default_provider};
    use crate::keystore::Keystore;
    use crate::pem::{read_certificate, read_private_key};

    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name)
    }

    fn identity_store(aliases: &[&str]) -> Keystore {
        let mut keystore = Keystore::new();
        for alias in aliases {
            let certificate = read_certificate(&fixture(&format!("{alias}.crt"))).unwrap().unwrap();
            let key = read_private_key(&fixture(&format!("{alias}.key"))).unwrap().unwrap();
            keystore.set_key_entry(alias, key, vec![certificate]);
        }
        keystore
    }

    #[test]
    fn sni_selects_matching_identity() {
        let manager = build_key_managers(&identity_store(&["gonzo", "kermit"]), &default_provider()).unwrap();

        assert_eq!(manager.aliases().collect::<Vec<_>>(), vec!["gonzo", "kermit"]);
        assert_eq!(manager.select(Some("gonzo.localhost")), Some("gonzo"));
        assert_eq!(manager.select(Some("LOCALHOST")), Some("kermit"));
    }

    #[test]
    fn unmatched_or_absent_sni_falls_back_to_first_alias() {
        let manager = build_key_managers(&identity_store(&["kermit", "stranger"]), &default_provider()).unwrap();

        assert_eq!(manager.select(Some("example.org")), Some("kermit"));
        assert_eq!(manager.select(None), Some("kermit"));
        assert!(ResolvesClientCert::has_certs(&manager));
    }

    #[test]
    fn empty_manager_presents_nothing() {
        let manager = KeyManager::default();
        assert!(manager.is_empty());
        assert_eq!(manager.select(Some("localhost")), None);
        assert!(!ResolvesClientCert::has_certs(&manager));
    }
}
