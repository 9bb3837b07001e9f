//! Keystore assembly error types for detailed error handling

use std::path::PathBuf;

/// A `Result` alias where the `Err` case is [`KeystoreError`].
pub type Result<T> = std::result::Result<T, KeystoreError>;

/// Boxed originating cause carried by an error variant.
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while assembling a keystore or deriving a TLS context
#[derive(Debug, thiserror::Error)]
pub enum KeystoreError {
    #[error("Malformed material in {path}: {reason}")]
    MalformedMaterial {
        path: PathBuf,
        reason: String,
        #[source]
        source: Option<Cause>,
    },
    #[error("No certificate found in {path} for alias '{alias}'")]
    MissingCertificate { alias: String, path: PathBuf },
    #[error("No private key found in {path} for alias '{alias}'")]
    MissingPrivateKey { alias: String, path: PathBuf },
    #[error("Cannot find certificate for alias '{alias}'")]
    UnresolvedAlias { alias: String },
    #[error("Failed to load keystore {path}: {reason}")]
    KeystoreLoad {
        path: PathBuf,
        reason: String,
        #[source]
        source: Option<Cause>,
    },
    #[error("Failed to write keystore {path}")]
    KeystoreWrite {
        path: PathBuf,
        #[source]
        source: Cause,
    },
    #[error("Unable to create and initialise the TLS context: {reason}")]
    TlsContext {
        reason: String,
        #[source]
        source: Option<rustls::Error>,
    },
    #[error("Invalid keystore configuration: {0}")]
    Config(String),
}

/// Fieldless discriminant of [`KeystoreError`] for matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedMaterial,
    MissingCertificate,
    MissingPrivateKey,
    UnresolvedAlias,
    KeystoreLoad,
    KeystoreWrite,
    TlsContext,
    Config,
}

impl KeystoreError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedMaterial { .. } => ErrorKind::MalformedMaterial,
            Self::MissingCertificate { .. } => ErrorKind::MissingCertificate,
            Self::MissingPrivateKey { .. } => ErrorKind::MissingPrivateKey,
            Self::UnresolvedAlias { .. } => ErrorKind::UnresolvedAlias,
            Self::KeystoreLoad { .. } => ErrorKind::KeystoreLoad,
            Self::KeystoreWrite { .. } => ErrorKind::KeystoreWrite,
            Self::TlsContext { .. } => ErrorKind::TlsContext,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MalformedMaterial {
            path: path.into(),
            reason: reason.into(),
            source: None,
        }
    }

    pub(crate) fn malformed_with<E>(path: impl Into<PathBuf>, reason: impl Into<String>, source: E) -> Self
    where
        E: Into<Cause>,
    {
        Self::MalformedMaterial {
            path: path.into(),
            reason: reason.into(),
            source: Some(source.into()),
        }
    }

    pub(crate) fn load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::KeystoreLoad {
            path: path.into(),
            reason: reason.into(),
            source: None,
        }
    }

    pub(crate) fn load_with<E>(path: impl Into<PathBuf>, reason: impl Into<String>, source: E) -> Self
    where
        E: Into<Cause>,
    {
        Self::KeystoreLoad {
            path: path.into(),
            reason: reason.into(),
            source: Some(source.into()),
        }
    }

    pub(crate) fn write<E>(path: impl Into<PathBuf>, source: E) -> Self
    where
        E: Into<Cause>,
    {
        Self::KeystoreWrite {
            path: path.into(),
            source: source.into(),
        }
    }

    pub(crate) fn tls(reason: impl Into<String>, source: rustls::Error) -> Self {
        Self::TlsContext {
            reason: reason.into(),
            source: Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn kind_matches_variant() {
        let err = KeystoreError::UnresolvedAlias { alias: "kermit".into() };
        assert_eq!(err.kind(), ErrorKind::UnresolvedAlias);
        assert_eq!(err.to_string(), "Cannot find certificate for alias 'kermit'");
    }

    #[test]
    fn malformed_keeps_its_cause() {
        let cause = std::io::Error::new(std::io::ErrorKind::InvalidData, "bad byte");
        let err = KeystoreError::malformed_with("tls.crt", "invalid base64", cause);
        assert_eq!(err.kind(), ErrorKind::MalformedMaterial);
        let source = err.source().map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("bad byte"));
    }
}
