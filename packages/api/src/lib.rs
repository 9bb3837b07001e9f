//! Keystash public API
//!
//! Assembles a password-protected keystore from PEM material, keeps it on
//! disk, and hands back rustls configurations derived from it.
//!
//! ```no_run
//! # fn main() -> keystash::Result<()> {
//! let mut builder = keystash::keystore("target/keystore.ks");
//! builder
//!     .add_certificate("kermit", "tls/tls.crt")
//!     .add_private_key("kermit", "tls/tls.key");
//!
//! let tls = builder.build()?.context;
//! let server = tls.server_config()?;
//! let client = tls.client_config()?;
//! # let _ = (server, client);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]

use std::path::PathBuf;
use std::sync::Arc;

pub use keystash_core::{
    BuildResult, BuildStage, ErrorKind, KeyManager, Keystore, KeystoreBuilder, KeystoreConfig, KeystoreEntry,
    KeystoreError, KeystoreFormat, KeystorePassword, MaterialConfig, MaterialEntry, MaterialKind, MaterialQueue,
    Result, TlsContext,
};
pub use keystash_core::{config, context, keystore, pem};

use rustls::crypto::CryptoProvider;

/// Main Keystash entry point providing static builder methods
pub struct Keystash;

impl Keystash {
    /// Builder for the keystore at `path`, protected by the default password
    ///
    /// Shorthand for [`KeystoreBuilder::new`]
    #[must_use]
    pub fn keystore(path: impl Into<PathBuf>) -> KeystoreBuilder {
        KeystoreBuilder::new(path)
    }

    /// Builder configured from `config`, with its materials already queued
    #[must_use]
    pub fn from_config(config: KeystoreConfig) -> KeystoreBuilder {
        KeystoreBuilder::from_config(config)
    }

    /// Builder configured from `KEYSTASH_*` environment variables
    ///
    /// # Errors
    /// Returns [`ErrorKind::Config`] when a variable holds an invalid value.
    pub fn from_env() -> Result<KeystoreBuilder> {
        let config = KeystoreConfig::from_env()?;
        tracing::debug!(path = %config.path.display(), format = ?config.format, "Keystore configured from environment");
        Ok(KeystoreBuilder::from_config(config))
    }

    /// Builder using `provider` for every derived TLS configuration
    #[must_use]
    pub fn with_crypto_provider(config: KeystoreConfig, provider: Arc<CryptoProvider>) -> KeystoreBuilder {
        KeystoreBuilder::from_config(config).with_crypto_provider(provider)
    }
}

/// Builder for the keystore at `path`
///
/// Shorthand for [`Keystash::keystore`]
#[must_use]
pub fn keystore(path: impl Into<PathBuf>) -> KeystoreBuilder {
    Keystash::keystore(path)
}

/// Builder configured from `KEYSTASH_*` environment variables
///
/// # Errors
/// Returns [`ErrorKind::Config`] when a variable holds an invalid value.
pub fn from_env() -> Result<KeystoreBuilder> {
    Keystash::from_env()
}
