//! Keystore password held as a clearable secret

use zeroize::{Zeroize, Zeroizing};

/// Password protecting a keystore.
///
/// The backing buffer is wiped on drop and can be wiped early with
/// [`KeystorePassword::clear`].
#[derive(Clone)]
pub struct KeystorePassword {
    secret: Zeroizing<String>,
}

impl KeystorePassword {
    /// Password used when none is configured.
    pub const DEFAULT: &'static str = "changeit";

    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: Zeroizing::new(secret.into()),
        }
    }

    pub(crate) fn expose(&self) -> &[u8] {
        self.secret.as_bytes()
    }

    /// Wipe the secret in place, leaving an empty password.
    pub fn clear(&mut self) {
        self.secret.zeroize();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.secret.is_empty()
    }
}

impl Default for KeystorePassword {
    fn default() -> Self {
        Self::new(Self::DEFAULT)
    }
}

impl From<&str> for KeystorePassword {
    fn from(secret: &str) -> Self {
        Self::new(secret)
    }
}

impl From<String> for KeystorePassword {
    fn from(secret: String) -> Self {
        Self::new(secret)
    }
}

impl From<Vec<char>> for KeystorePassword {
    fn from(mut chars: Vec<char>) -> Self {
        // Sized up front so no reallocation leaves a stray copy behind
        let mut secret = Zeroizing::new(String::with_capacity(chars.iter().map(|c| c.len_utf8()).sum()));
        for c in &chars {
            secret.push(*c);
        }
        chars.zeroize();
        Self { secret }
    }
}

impl std::fmt::Debug for KeystorePassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeystorePassword(***)")
    }
}

impl<'de> serde::Deserialize<'de> for KeystorePassword {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}
