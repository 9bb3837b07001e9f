//! PEM decoding of certificate and private key material
//!
//! Absence of a requested block is a valid outcome (`Ok(None)`), distinct
//! from a block that is present but malformed.

pub mod codec;
pub mod material;

pub use codec::{PemError, decode, encode};
pub use material::{CertificateSummary, read_certificate, read_private_key};
