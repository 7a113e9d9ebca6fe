//! Owner references: verified artist identities versus unverified name fingerprints.

use crate::domain::ArtistId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized artist name used as a weak key for the unclaimed pool.
///
/// Normalization trims, lower-cases, drops punctuation and collapses runs of
/// whitespace, so `"  The Beatles! "` and `"the   beatles"` fingerprint alike.
/// A name with no letters or digits (`"!!!"`) keeps its symbols, lower-cased
/// with whitespace collapsed, so it never maps to the empty key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NameFingerprint(String);

impl NameFingerprint {
    pub fn from_name(raw: &str) -> Self {
        let mut out = String::with_capacity(raw.len());
        let mut pending_space = false;
        for c in raw.chars() {
            if c.is_whitespace() {
                pending_space = !out.is_empty();
            } else if c.is_alphanumeric() {
                if pending_space {
                    out.push(' ');
                    pending_space = false;
                }
                out.extend(c.to_lowercase());
            }
        }
        if out.is_empty() {
            out = raw
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase();
        }
        NameFingerprint(out)
    }

    /// Rebuild from an already-normalized stored value.
    pub fn from_stored(value: String) -> Self {
        NameFingerprint(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NameFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who an allocation belongs to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OwnerRef {
    /// Registered, verified artist.
    #[serde(rename_all = "camelCase")]
    Verified { artist_id: ArtistId },
    /// Artist known only by name; money waits in the unclaimed pool.
    #[serde(rename_all = "camelCase")]
    Unverified { fingerprint: NameFingerprint },
}

impl OwnerRef {
    pub fn verified(artist_id: ArtistId) -> Self {
        OwnerRef::Verified { artist_id }
    }

    pub fn unverified(name: &str) -> Self {
        OwnerRef::Unverified {
            fingerprint: NameFingerprint::from_name(name),
        }
    }

    /// Storage discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            OwnerRef::Verified { .. } => "artist",
            OwnerRef::Unverified { .. } => "name",
        }
    }

    /// Storage key (artist id or fingerprint).
    pub fn key(&self) -> &str {
        match self {
            OwnerRef::Verified { artist_id } => artist_id.as_str(),
            OwnerRef::Unverified { fingerprint } => fingerprint.as_str(),
        }
    }

    pub fn from_parts(kind: &str, key: String) -> Option<Self> {
        match kind {
            "artist" => Some(OwnerRef::Verified {
                artist_id: ArtistId::new(key),
            }),
            "name" => Some(OwnerRef::Unverified {
                fingerprint: NameFingerprint::from_stored(key),
            }),
            _ => None,
        }
    }

    pub fn artist_id(&self) -> Option<&ArtistId> {
        match self {
            OwnerRef::Verified { artist_id } => Some(artist_id),
            OwnerRef::Unverified { .. } => None,
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, OwnerRef::Verified { .. })
    }
}

impl fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.key())
    }
}
