//! Alias-addressed certificate and key container
//!
//! A [`Keystore`] maps aliases to either a trusted certificate or a key
//! entry (PKCS#8 private key plus certificate chain). It lives in memory
//! for the duration of one build and is sealed to disk by [`persistence`].

pub mod password;
pub mod persistence;

use std::collections::BTreeMap;

use rustls::pki_types::{CertificateDer, PrivatePkcs8KeyDer};

pub use password::KeystorePassword;
pub use persistence::KeystoreFormat;

/// A single keystore record
#[derive(Debug)]
pub enum KeystoreEntry {
    /// Certificate used only to validate peers
    TrustedCertificate { certificate: CertificateDer<'static> },
    /// Private key with the certificate chain that identifies it
    PrivateKey {
        key: PrivatePkcs8KeyDer<'static>,
        chain: Vec<CertificateDer<'static>>,
    },
}

impl KeystoreEntry {
    /// The entry's own certificate: the trusted certificate, or the first
    /// element of a key entry's chain.
    #[must_use]
    pub fn certificate(&self) -> Option<&CertificateDer<'static>> {
        match self {
            Self::TrustedCertificate { certificate } => Some(certificate),
            Self::PrivateKey { chain, .. } => chain.first(),
        }
    }

    #[must_use]
    pub fn is_key_entry(&self) -> bool {
        matches!(self, Self::PrivateKey { .. })
    }
}

impl Clone for KeystoreEntry {
    fn clone(&self) -> Self {
        match self {
            Self::TrustedCertificate { certificate } => Self::TrustedCertificate {
                certificate: certificate.clone(),
            },
            Self::PrivateKey { key, chain } => Self::PrivateKey {
                key: key.clone_key(),
                chain: chain.clone(),
            },
        }
    }
}

impl PartialEq for KeystoreEntry {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::TrustedCertificate { certificate: a }, Self::TrustedCertificate { certificate: b }) => a == b,
            (Self::PrivateKey { key: ka, chain: ca }, Self::PrivateKey { key: kb, chain: cb }) => {
                ka.secret_pkcs8_der() == kb.secret_pkcs8_der() && ca == cb
            }
            _ => false,
        }
    }
}

impl Eq for KeystoreEntry {}

/// In-memory keystore, ordered by alias
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keystore {
    entries: BTreeMap<String, KeystoreEntry>,
}

impl Keystore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `certificate` as a trusted entry, replacing whatever `alias` held.
    pub fn set_certificate_entry(&mut self, alias: &str, certificate: CertificateDer<'static>) {
        self.entries
            .insert(alias.to_string(), KeystoreEntry::TrustedCertificate { certificate });
    }

    /// Store a key entry, replacing whatever `alias` held.
    pub fn set_key_entry(
        &mut self,
        alias: &str,
        key: PrivatePkcs8KeyDer<'static>,
        chain: Vec<CertificateDer<'static>>,
    ) {
        self.entries
            .insert(alias.to_string(), KeystoreEntry::PrivateKey { key, chain });
    }

    /// Certificate stored under `alias`, whichever kind of entry holds it.
    #[must_use]
    pub fn certificate(&self, alias: &str) -> Option<&CertificateDer<'static>> {
        self.entries.get(alias).and_then(KeystoreEntry::certificate)
    }

    #[must_use]
    pub fn entry(&self, alias: &str) -> Option<&KeystoreEntry> {
        self.entries.get(alias)
    }

    #[must_use]
    pub fn contains_alias(&self, alias: &str) -> bool {
        self.entries.contains_key(alias)
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &KeystoreEntry)> {
        self.entries.iter().map(|(alias, entry)| (alias.as_str(), entry))
    }

    /// Every certificate in the store: trusted entries and all chain
    /// certificates of key entries.
    pub fn certificates(&self) -> impl Iterator<Item = &CertificateDer<'static>> {
        self.entries.values().flat_map(|entry| match entry {
            KeystoreEntry::TrustedCertificate { certificate } => std::slice::from_ref(certificate).iter(),
            KeystoreEntry::PrivateKey { chain, .. } => chain.iter(),
        })
    }

    /// Key entries as `(alias, key, chain)`.
    pub fn key_entries(
        &self,
    ) -> impl Iterator<Item = (&str, &PrivatePkcs8KeyDer<'static>, &[CertificateDer<'static>])> {
        self.entries.iter().filter_map(|(alias, entry)| match entry {
            KeystoreEntry::PrivateKey { key, chain } => Some((alias.as_str(), key, chain.as_slice())),
            KeystoreEntry::TrustedCertificate { .. } => None,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn insert_entry(&mut self, alias: String, entry: KeystoreEntry) {
        self.entries.insert(alias, entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cert(byte: u8) -> CertificateDer<'static> {
        CertificateDer::from(vec![0x30, byte])
    }

    fn key(byte: u8) -> PrivatePkcs8KeyDer<'static> {
        PrivatePkcs8KeyDer::from(vec![0x30, byte, byte])
    }

    #[test]
    fn key_entry_replaces_certificate_entry() {
        let mut store = Keystore::new();
        store.set_certificate_entry("kermit", cert(1));
        assert!(!store.entry("kermit").is_some_and(KeystoreEntry::is_key_entry));

        store.set_key_entry("kermit", key(2), vec![cert(1)]);
        assert_eq!(store.len(), 1);
        assert!(store.entry("kermit").is_some_and(KeystoreEntry::is_key_entry));
        assert_eq!(store.certificate("kermit"), Some(&cert(1)));
    }

    #[test]
    fn certificates_cover_both_entry_kinds() {
        let mut store = Keystore::new();
        store.set_certificate_entry("jboss", cert(1));
        store.set_key_entry("kermit", key(2), vec![cert(3), cert(4)]);

        let certs: Vec<_> = store.certificates().cloned().collect();
        assert_eq!(certs, vec![cert(1), cert(3), cert(4)]);
        assert_eq!(store.key_entries().count(), 1);
        assert_eq!(store.aliases().collect::<Vec<_>>(), vec!["jboss", "kermit"]);
    }

    #[test]
    fn unknown_alias_has_no_certificate() {
        let store = Keystore::new();
        assert!(store.certificate("gonzo").is_none());
        assert!(!store.contains_alias("gonzo"));
        assert!(store.is_empty());
    }
}
