//! Drains the material queue into a keystore, one kind at a time

use super::queue::{MaterialEntry, MaterialKind, MaterialQueue};
use crate::error::{KeystoreError, Result};
use crate::keystore::Keystore;
use crate::pem::{read_certificate, read_private_key};

/// Resolve every pending entry of `kind` into `keystore`.
///
/// Each entry is popped before it is processed, so a failing entry is
/// never retried. Returns the number of entries added.
pub fn resolve_stage(queue: &mut MaterialQueue, keystore: &mut Keystore, kind: MaterialKind) -> Result<usize> {
    let mut added = 0;
    while let Some(entry) = queue.pop(kind) {
        let resolved = match kind {
            MaterialKind::PemBundle => resolve_pem(&entry, keystore)?,
            MaterialKind::Certificate => resolve_certificate(&entry, keystore)?,
            MaterialKind::PrivateKey => resolve_private_key(&entry, keystore)?,
        };
        if resolved {
            added += 1;
        }
    }
    Ok(added)
}

fn resolve_pem(entry: &MaterialEntry, keystore: &mut Keystore) -> Result<bool> {
    let MaterialEntry { alias, path, .. } = entry;
    tracing::info!(alias = %alias, path = %path.display(), "Adding pem material");

    let certificate = read_certificate(path)?;
    let key = read_private_key(path)?;

    match (certificate, key) {
        (Some(certificate), Some(key)) => {
            keystore.set_key_entry(alias, key, vec![certificate]);
            Ok(true)
        }
        (Some(certificate), None) => {
            keystore.set_certificate_entry(alias, certificate);
            Ok(true)
        }
        // The chain must come from the same file, never from the store
        (None, Some(_)) => Err(KeystoreError::MissingCertificate {
            alias: alias.clone(),
            path: path.clone(),
        }),
        (None, None) => {
            tracing::warn!(alias = %alias, path = %path.display(), "Pem material holds no certificate or private key");
            Ok(false)
        }
    }
}

fn resolve_certificate(entry: &MaterialEntry, keystore: &mut Keystore) -> Result<bool> {
    let MaterialEntry { alias, path, .. } = entry;
    tracing::info!(alias = %alias, path = %path.display(), "Adding certificate material");

    let certificate = read_certificate(path)?.ok_or_else(|| KeystoreError::MissingCertificate {
        alias: alias.clone(),
        path: path.clone(),
    })?;

    keystore.set_certificate_entry(alias, certificate);
    Ok(true)
}

fn resolve_private_key(entry: &MaterialEntry, keystore: &mut Keystore) -> Result<bool> {
    let MaterialEntry { alias, path, .. } = entry;
    tracing::info!(alias = %alias, path = %path.display(), "Adding private key material");

    let key = read_private_key(path)?.ok_or_else(|| KeystoreError::MissingPrivateKey {
        alias: alias.clone(),
        path: path.clone(),
    })?;

    let certificate = keystore
        .certificate(alias)
        .cloned()
        .ok_or_else(|| KeystoreError::UnresolvedAlias { alias: alias.clone() })?;

    keystore.set_key_entry(alias, key, vec![certificate]);
    Ok(true)
}
