//! Keystore configuration

use std::num::NonZeroU32;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::builder::queue::{MaterialEntry, MaterialKind};
use crate::error::{KeystoreError, Result};
use crate::keystore::persistence::{DEFAULT_KDF_ITERATIONS, MAX_KDF_ITERATIONS};
use crate::keystore::{KeystoreFormat, KeystorePassword};

pub const ENV_KEYSTORE_PATH: &str = "KEYSTASH_KEYSTORE_PATH";
pub const ENV_KEYSTORE_FORMAT: &str = "KEYSTASH_KEYSTORE_FORMAT";
pub const ENV_KEYSTORE_PASSWORD: &str = "KEYSTASH_KEYSTORE_PASSWORD";
pub const ENV_KDF_ITERATIONS: &str = "KEYSTASH_KDF_ITERATIONS";

/// Material to enqueue when a builder is created from configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialConfig {
    pub alias: String,
    pub path: PathBuf,
    pub kind: MaterialKind,
}

impl From<MaterialConfig> for MaterialEntry {
    fn from(material: MaterialConfig) -> Self {
        MaterialEntry::new(material.alias, material.path, material.kind)
    }
}

/// Keystore location, format and protection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeystoreConfig {
    /// Keystore file, created on first store
    pub path: PathBuf,
    pub format: KeystoreFormat,
    #[serde(skip_serializing)]
    pub password: KeystorePassword,
    /// PBKDF2 rounds for newly written keystores
    pub kdf_iterations: NonZeroU32,
    pub materials: Vec<MaterialConfig>,
}

impl Default for KeystoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("keystore.ks"),
            format: KeystoreFormat::default(),
            password: KeystorePassword::default(),
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
            materials: Vec::new(),
        }
    }
}

impl KeystoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_format(self, format: KeystoreFormat) -> Self {
        Self { format, ..self }
    }

    #[must_use]
    pub fn with_password(self, password: impl Into<KeystorePassword>) -> Self {
        Self {
            password: password.into(),
            ..self
        }
    }

    #[must_use]
    pub fn with_kdf_iterations(self, kdf_iterations: NonZeroU32) -> Self {
        Self { kdf_iterations, ..self }
    }

    /// Parse a JSON configuration document; absent fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| KeystoreError::Config(e.to_string()))
    }

    /// Defaults overridden by `KEYSTASH_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup(ENV_KEYSTORE_PATH) {
            config.path = PathBuf::from(path);
        }
        if let Some(format) = lookup(ENV_KEYSTORE_FORMAT) {
            config.format = format.parse()?;
        }
        if let Some(password) = lookup(ENV_KEYSTORE_PASSWORD) {
            config.password = KeystorePassword::new(password);
        }
        if let Some(iterations) = lookup(ENV_KDF_ITERATIONS) {
            config.kdf_iterations = iterations.trim().parse().map_err(|e| {
                KeystoreError::Config(format!("{ENV_KDF_ITERATIONS} must be a positive integer: {e}"))
            })?;
            if config.kdf_iterations.get() > MAX_KDF_ITERATIONS {
                return Err(KeystoreError::Config(format!(
                    "{ENV_KDF_ITERATIONS} must not exceed {MAX_KDF_ITERATIONS}"
                )));
            }
        }

        Ok(config)
    }
}
