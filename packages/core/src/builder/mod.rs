//! Incremental keystore builder
//!
//! Material is queued with the `add_*` methods and resolved by
//! [`KeystoreBuilder::build`], which runs a fixed pipeline:
//!
//! ```text
//! IDLE -> LOADING_KEYSTORE -> RESOLVING_PEM -> RESOLVING_CERTS -> RESOLVING_KEYS
//!      -> [PERSISTING] -> DERIVING_MANAGERS -> DONE
//! ```
//!
//! The keystore file is reloaded on every call, and only written when the
//! call added at least one entry. Repeated calls compose: queue more
//! material, build again, and only the new entries are resolved.

pub mod queue;
pub mod resolver;

use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::crypto::CryptoProvider;

pub use queue::{MaterialEntry, MaterialKind, MaterialQueue};

use crate::config::KeystoreConfig;
use crate::context::{self, TlsContext};
use crate::error::Result;
use crate::keystore::{Keystore, KeystoreFormat, KeystorePassword, persistence};

/// Pipeline stage of a [`KeystoreBuilder::build`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    Idle,
    LoadingKeystore,
    ResolvingPem,
    ResolvingCerts,
    ResolvingKeys,
    Persisting,
    DerivingManagers,
    Done,
}

impl BuildStage {
    fn resolving(kind: MaterialKind) -> Self {
        match kind {
            MaterialKind::PemBundle => Self::ResolvingPem,
            MaterialKind::Certificate => Self::ResolvingCerts,
            MaterialKind::PrivateKey => Self::ResolvingKeys,
        }
    }
}

/// Outcome of one successful build
#[derive(Debug, Clone)]
pub struct BuildResult {
    pub context: TlsContext,
    pub keystore: Keystore,
    /// Entries added by this call
    pub added: usize,
    /// Whether the keystore file was written by this call
    pub persisted: bool,
}

/// Assembles a keystore from queued material and derives a TLS context.
///
/// Not synchronized: serialize access to one builder externally.
#[derive(Debug)]
pub struct KeystoreBuilder {
    path: PathBuf,
    format: KeystoreFormat,
    password: KeystorePassword,
    kdf_iterations: NonZeroU32,
    provider: Arc<CryptoProvider>,
    queue: MaterialQueue,
    stage: BuildStage,
}

impl KeystoreBuilder {
    /// Builder for the keystore at `path` with default format and password.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::from_config(KeystoreConfig::new(path))
    }

    /// Builder taking location, protection and initial material from `config`.
    #[must_use]
    pub fn from_config(config: KeystoreConfig) -> Self {
        let KeystoreConfig {
            path,
            format,
            password,
            kdf_iterations,
            materials,
        } = config;

        let mut queue = MaterialQueue::new();
        for material in materials {
            queue.push(material.into());
        }

        Self {
            path,
            format,
            password,
            kdf_iterations,
            provider: context::default_provider(),
            queue,
            stage: BuildStage::Idle,
        }
    }

    /// Use `provider` instead of the default ring provider.
    #[must_use]
    pub fn with_crypto_provider(self, provider: Arc<CryptoProvider>) -> Self {
        Self { provider, ..self }
    }

    /// Queue a combined certificate/private-key PEM file.
    pub fn add_pem(&mut self, alias: impl Into<String>, path: impl Into<PathBuf>) -> &mut Self {
        self.queue
            .push(MaterialEntry::new(alias, path, MaterialKind::PemBundle));
        self
    }

    /// Queue a PEM certificate file.
    pub fn add_certificate(&mut self, alias: impl Into<String>, path: impl Into<PathBuf>) -> &mut Self {
        self.queue
            .push(MaterialEntry::new(alias, path, MaterialKind::Certificate));
        self
    }

    /// Queue a PEM PKCS#8 private key file; its certificate must be in the
    /// keystore under the same alias by the time keys are resolved.
    pub fn add_private_key(&mut self, alias: impl Into<String>, path: impl Into<PathBuf>) -> &mut Self {
        self.queue
            .push(MaterialEntry::new(alias, path, MaterialKind::PrivateKey));
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn format(&self) -> KeystoreFormat {
        self.format
    }

    #[must_use]
    pub fn pending(&self) -> &MaterialQueue {
        &self.queue
    }

    /// Stage reached by the last build; a failed build stays at the stage
    /// that failed.
    #[must_use]
    pub fn stage(&self) -> BuildStage {
        self.stage
    }

    fn enter(&mut self, stage: BuildStage) {
        tracing::debug!(?stage, path = %self.path.display(), "Keystore build stage");
        self.stage = stage;
    }

    /// Load the keystore file as it currently is on disk.
    pub fn load_keystore(&self) -> Result<Keystore> {
        persistence::load(&self.path, self.format, &self.password)
    }

    /// Resolve pending material into the keystore, persist it if anything
    /// was added, and derive a TLS context from the result.
    pub fn build(&mut self) -> Result<BuildResult> {
        self.enter(BuildStage::LoadingKeystore);
        let mut keystore = self.load_keystore()?;

        let mut added = 0;
        for kind in MaterialKind::RESOLUTION_ORDER {
            self.enter(BuildStage::resolving(kind));
            added += resolver::resolve_stage(&mut self.queue, &mut keystore, kind)?;
        }

        let persisted = added > 0;
        if persisted {
            self.enter(BuildStage::Persisting);
            persistence::store(&keystore, &self.path, self.format, &self.password, self.kdf_iterations)?;
        }

        self.enter(BuildStage::DerivingManagers);
        let context = TlsContext::with_provider(&keystore, Arc::clone(&self.provider))?;

        self.enter(BuildStage::Done);
        tracing::info!(
            path = %self.path.display(),
            added,
            entries = keystore.len(),
            "Keystore ready"
        );

        Ok(BuildResult {
            context,
            keystore,
            added,
            persisted,
        })
    }
}
