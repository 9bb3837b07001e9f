//! Pending key material, partitioned by kind

use std::collections::VecDeque;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Kind of queued material.
///
/// Variant order is resolution order: bundles and certificates must be
/// in the keystore before private keys can find them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialKind {
    /// Combined file that may hold a certificate and a private key
    #[serde(alias = "pem")]
    PemBundle,
    Certificate,
    PrivateKey,
}

impl MaterialKind {
    pub const RESOLUTION_ORDER: [Self; 3] = [Self::PemBundle, Self::Certificate, Self::PrivateKey];

    const fn lane(self) -> usize {
        match self {
            Self::PemBundle => 0,
            Self::Certificate => 1,
            Self::PrivateKey => 2,
        }
    }
}

impl std::fmt::Display for MaterialKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::PemBundle => "pem",
            Self::Certificate => "certificate",
            Self::PrivateKey => "private key",
        })
    }
}

/// One pending add-operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialEntry {
    pub alias: String,
    pub path: PathBuf,
    pub kind: MaterialKind,
}

impl MaterialEntry {
    pub fn new(alias: impl Into<String>, path: impl Into<PathBuf>, kind: MaterialKind) -> Self {
        Self {
            alias: alias.into(),
            path: path.into(),
            kind,
        }
    }
}

/// FIFO lanes of pending material, one per [`MaterialKind`]
#[derive(Debug, Clone, Default)]
pub struct MaterialQueue {
    lanes: [VecDeque<MaterialEntry>; 3],
}

impl MaterialQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry to its kind's lane. Duplicates are kept.
    pub fn push(&mut self, entry: MaterialEntry) {
        self.lanes[entry.kind.lane()].push_back(entry);
    }

    /// Remove and return the oldest entry of `kind`.
    pub fn pop(&mut self, kind: MaterialKind) -> Option<MaterialEntry> {
        self.lanes[kind.lane()].pop_front()
    }

    pub fn pending(&self, kind: MaterialKind) -> impl Iterator<Item = &MaterialEntry> {
        self.lanes[kind.lane()].iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lanes.iter().map(VecDeque::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lanes.iter().all(VecDeque::is_empty)
    }
}
