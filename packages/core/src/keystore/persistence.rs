//! Keystore load/store with password-based sealing
//!
//! Sealed layout: `magic "KSTS" | version | pbkdf2 iterations (u32 BE) |
//! salt 32 | nonce 12 | AES-256-GCM ciphertext+tag`. The plaintext is a
//! JSON document of base64 DER entries.

use std::num::NonZeroU32;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ring::{aead, pbkdf2, rand};
use rustls::pki_types::{CertificateDer, PrivatePkcs8KeyDer};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use super::{Keystore, KeystoreEntry, KeystorePassword};
use crate::error::{KeystoreError, Result};
use crate::pem;

const MAGIC: &[u8; 4] = b"KSTS";
const VERSION: u8 = 1;
const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const HEADER_LEN: usize = MAGIC.len() + 1 + 4 + SALT_LEN + NONCE_LEN;
const TAG_LEN: usize = 16;

/// PEM block type of an armored keystore
pub const ARMOR_BLOCK: &str = "KEYSTASH KEYSTORE";

/// PBKDF2 iteration count used for new keystores (OWASP 2024 minimum)
pub const DEFAULT_KDF_ITERATIONS: NonZeroU32 = match NonZeroU32::new(600_000) {
    Some(n) => n,
    None => unreachable!(),
};

/// Highest PBKDF2 iteration count accepted from a keystore header
pub const MAX_KDF_ITERATIONS: u32 = 10 * DEFAULT_KDF_ITERATIONS.get();

/// On-disk keystore encoding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeystoreFormat {
    /// Binary sealed container
    #[default]
    Sealed,
    /// Sealed container wrapped in PEM armor
    Armored,
}

impl std::str::FromStr for KeystoreFormat {
    type Err = KeystoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sealed" => Ok(Self::Sealed),
            "armored" => Ok(Self::Armored),
            other => Err(KeystoreError::Config(format!("unknown keystore format '{other}'"))),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Document {
    version: u8,
    entries: Vec<DocumentEntry>,
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DocumentEntry {
    TrustedCertificate {
        alias: String,
        certificate: String,
    },
    PrivateKey {
        alias: String,
        key: String,
        chain: Vec<String>,
    },
}

impl Drop for DocumentEntry {
    fn drop(&mut self) {
        if let Self::PrivateKey { key, .. } = self {
            key.zeroize();
        }
    }
}

fn to_document(keystore: &Keystore) -> Document {
    let entries = keystore
        .entries()
        .map(|(alias, entry)| match entry {
            KeystoreEntry::TrustedCertificate { certificate } => DocumentEntry::TrustedCertificate {
                alias: alias.to_string(),
                certificate: STANDARD.encode(certificate),
            },
            KeystoreEntry::PrivateKey { key, chain } => DocumentEntry::PrivateKey {
                alias: alias.to_string(),
                key: STANDARD.encode(key.secret_pkcs8_der()),
                chain: chain.iter().map(|c| STANDARD.encode(c)).collect(),
            },
        })
        .collect();

    Document { version: VERSION, entries }
}

fn from_document(path: &Path, document: &Document) -> Result<Keystore> {
    let decode = |field: &str, value: &str| {
        STANDARD
            .decode(value)
            .map_err(|e| KeystoreError::load_with(path, format!("corrupt {field} entry"), e))
    };

    let mut keystore = Keystore::new();
    for entry in &document.entries {
        match entry {
            DocumentEntry::TrustedCertificate { alias, certificate } => {
                let der = decode("certificate", certificate)?;
                keystore.insert_entry(
                    alias.clone(),
                    KeystoreEntry::TrustedCertificate {
                        certificate: CertificateDer::from(der),
                    },
                );
            }
            DocumentEntry::PrivateKey { alias, key, chain } => {
                let key = PrivatePkcs8KeyDer::from(decode("private key", key)?);
                let chain = chain
                    .iter()
                    .map(|c| decode("certificate chain", c).map(CertificateDer::from))
                    .collect::<Result<Vec<_>>>()?;
                keystore.insert_entry(alias.clone(), KeystoreEntry::PrivateKey { key, chain });
            }
        }
    }
    Ok(keystore)
}

fn derive_key(
    password: &KeystorePassword,
    salt: &[u8],
    iterations: NonZeroU32,
) -> std::result::Result<aead::LessSafeKey, ring::error::Unspecified> {
    let mut key_bytes = Zeroizing::new([0u8; 32]);
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt,
        password.expose(),
        &mut key_bytes[..],
    );

    let key = aead::UnboundKey::new(&aead::AES_256_GCM, &key_bytes[..])?;
    Ok(aead::LessSafeKey::new(key))
}

fn seal(plaintext: &[u8], password: &KeystorePassword, iterations: NonZeroU32, path: &Path) -> Result<Vec<u8>> {
    let rng = rand::SystemRandom::new();
    let mut salt = [0u8; SALT_LEN];
    rand::SecureRandom::fill(&rng, &mut salt)
        .map_err(|_| KeystoreError::write(path, "failed to generate random salt"))?;
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::SecureRandom::fill(&rng, &mut nonce_bytes)
        .map_err(|_| KeystoreError::write(path, "failed to generate random nonce"))?;

    let key = derive_key(password, &salt, iterations)
        .map_err(|_| KeystoreError::write(path, "failed to create keystore sealing key"))?;

    let mut sealed = Zeroizing::new(plaintext.to_vec());
    key.seal_in_place_append_tag(
        aead::Nonce::assume_unique_for_key(nonce_bytes),
        aead::Aad::from(MAGIC),
        &mut *sealed,
    )
    .map_err(|_| KeystoreError::write(path, "keystore encryption failed"))?;

    let mut out = Vec::with_capacity(HEADER_LEN + sealed.len());
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    out.extend_from_slice(&iterations.get().to_be_bytes());
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&sealed);
    Ok(out)
}

fn unseal(data: &[u8], password: &KeystorePassword, path: &Path) -> Result<Zeroizing<Vec<u8>>> {
    if data.len() < HEADER_LEN + TAG_LEN || &data[..MAGIC.len()] != MAGIC {
        return Err(KeystoreError::load(path, "not a keystash keystore"));
    }
    let version = data[MAGIC.len()];
    if version != VERSION {
        return Err(KeystoreError::load(path, format!("unsupported keystore version {version}")));
    }

    let mut offset = MAGIC.len() + 1;
    let mut iterations = [0u8; 4];
    iterations.copy_from_slice(&data[offset..offset + 4]);
    let iterations = NonZeroU32::new(u32::from_be_bytes(iterations))
        .ok_or_else(|| KeystoreError::load(path, "zero key derivation iterations"))?;
    if iterations.get() > MAX_KDF_ITERATIONS {
        return Err(KeystoreError::load(
            path,
            format!("key derivation iterations {iterations} exceed the limit of {MAX_KDF_ITERATIONS}"),
        ));
    }
    offset += 4;
    let salt = &data[offset..offset + SALT_LEN];
    offset += SALT_LEN;
    let mut nonce_bytes = [0u8; NONCE_LEN];
    nonce_bytes.copy_from_slice(&data[offset..offset + NONCE_LEN]);
    offset += NONCE_LEN;

    let key = derive_key(password, salt, iterations)
        .map_err(|_| KeystoreError::load(path, "failed to create keystore sealing key"))?;

    let mut buffer = Zeroizing::new(data[offset..].to_vec());
    let plaintext_len = key
        .open_in_place(
            aead::Nonce::assume_unique_for_key(nonce_bytes),
            aead::Aad::from(MAGIC),
            &mut *buffer,
        )
        .map_err(|_| KeystoreError::load(path, "keystore was tampered with, or password was incorrect"))?
        .len();
    buffer.truncate(plaintext_len);
    Ok(buffer)
}

/// Load the keystore at `path`, or create an empty one when the file does
/// not exist (creating its parent directories for a later store).
pub fn load(path: &Path, format: KeystoreFormat, password: &KeystorePassword) -> Result<Keystore> {
    if !path.is_file() {
        tracing::info!(path = %path.display(), "Creating keystore");
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| KeystoreError::load_with(path, "unable to create keystore directory", e))?;
        }
        return Ok(Keystore::new());
    }

    tracing::info!(path = %path.display(), ?format, "Loading keystore file");
    let raw = std::fs::read(path).map_err(|e| KeystoreError::load_with(path, "unable to read keystore", e))?;

    let sealed = match format {
        KeystoreFormat::Sealed => raw,
        KeystoreFormat::Armored => pem::decode(&raw, ARMOR_BLOCK)
            .map_err(|e| KeystoreError::load_with(path, "invalid keystore armor", e))?
            .ok_or_else(|| KeystoreError::load(path, "no armored keystore block"))?,
    };

    let plaintext = unseal(&sealed, password, path)?;
    let document: Document = serde_json::from_slice(&plaintext)
        .map_err(|e| KeystoreError::load_with(path, "corrupt keystore document", e))?;
    if document.version != VERSION {
        return Err(KeystoreError::load(
            path,
            format!("unsupported keystore document version {}", document.version),
        ));
    }

    let keystore = from_document(path, &document)?;
    tracing::debug!(path = %path.display(), entries = keystore.len(), "Keystore loaded");
    Ok(keystore)
}

/// Overwrite `path` with the sealed keystore.
pub fn store(
    keystore: &Keystore,
    path: &Path,
    format: KeystoreFormat,
    password: &KeystorePassword,
    iterations: NonZeroU32,
) -> Result<()> {
    tracing::info!(path = %path.display(), entries = keystore.len(), "Storing keystore file");
    // A file sealed above the limit could never be loaded again
    if iterations.get() > MAX_KDF_ITERATIONS {
        return Err(KeystoreError::write(
            path,
            format!("key derivation iterations {iterations} exceed the limit of {MAX_KDF_ITERATIONS}"),
        ));
    }

    let plaintext = Zeroizing::new(
        serde_json::to_vec(&to_document(keystore)).map_err(|e| KeystoreError::write(path, e))?,
    );
    let sealed = seal(&plaintext, password, iterations, path)?;

    let bytes = match format {
        KeystoreFormat::Sealed => sealed,
        KeystoreFormat::Armored => pem::encode(&sealed, ARMOR_BLOCK).into_bytes(),
    };
    std::fs::write(path, &bytes).map_err(|e| KeystoreError::write(path, e))?;

    // Restrict the keystore to its owner
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| KeystoreError::write(path, e))?;
    }

    Ok(())
}
