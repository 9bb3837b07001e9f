//! # Keystash core
//!
//! Builds a password-protected X.509 keystore incrementally from PEM
//! material (combined bundles, or separate certificate and private-key
//! files), persists it, and derives a rustls TLS context from it.
//!
//! ```no_run
//! use keystash_core::{KeystoreBuilder, KeystoreConfig};
//!
//! # fn main() -> keystash_core::Result<()> {
//! let mut builder = KeystoreBuilder::from_config(
//!     KeystoreConfig::new("target/keystore.ks").with_password("s3cr3t"),
//! );
//! builder
//!     .add_certificate("kermit", "tls/tls.crt")
//!     .add_private_key("kermit", "tls/tls.key")
//!     .add_pem("jboss", "tls/jboss-org.pem");
//!
//! let result = builder.build()?;
//! let server_config = result.context.server_config()?;
//! # let _ = server_config;
//! # Ok(())
//! # }
//! ```
//!
//! The resulting context is an explicit value; installing it anywhere
//! process-wide is left to the caller.

#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod builder;
pub mod config;
pub mod context;
pub mod error;
pub mod keystore;
pub mod pem;

pub use builder::{BuildResult, BuildStage, KeystoreBuilder, MaterialEntry, MaterialKind, MaterialQueue};
pub use config::{KeystoreConfig, MaterialConfig};
pub use context::{KeyManager, TlsContext};
pub use error::{ErrorKind, KeystoreError, Result};
pub use keystore::{Keystore, KeystoreEntry, KeystoreFormat, KeystorePassword};
