//! Branded ID newtypes and random token generation.
//!
//! Convoy IDs are short random hex strings (they appear in share links),
//! verification record IDs are UUID v7, and member IDs are per-convoy
//! integers allocated by the store.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::TryRngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{ConvoyError, Result};

/// Random bytes behind a convoy ID (16 hex characters).
const CONVOY_ID_BYTES: usize = 8;

/// Random bytes behind a verification token (43 base64url characters).
const TOKEN_BYTES: usize = 32;

/// Fill `buf` from the operating system RNG.
fn fill_random(buf: &mut [u8]) -> Result<()> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| ConvoyError::Entropy(e.to_string()))
}

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Unique identifier for a convoy.
    ConvoyId
}

branded_id! {
    /// Unique identifier for a verification record.
    VerificationId
}

branded_id! {
    /// Single-use verification token. Also the lookup key for its record.
    VerificationToken
}

impl ConvoyId {
    /// Generate a fresh random convoy ID from OS entropy.
    pub fn generate() -> Result<Self> {
        let mut buf = [0u8; CONVOY_ID_BYTES];
        fill_random(&mut buf)?;
        let hex = buf.iter().fold(String::with_capacity(CONVOY_ID_BYTES * 2), |mut acc, b| {
            acc.push_str(&format!("{b:02x}"));
            acc
        });
        Ok(Self(hex))
    }
}

impl VerificationId {
    /// Create a new time-ordered ID (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

impl Default for VerificationId {
    fn default() -> Self {
        Self::new()
    }
}

impl VerificationToken {
    /// Generate an unguessable URL-safe token from OS entropy.
    pub fn generate() -> Result<Self> {
        let mut buf = [0u8; TOKEN_BYTES];
        fill_random(&mut buf)?;
        Ok(Self(URL_SAFE_NO_PAD.encode(buf)))
    }

    /// Short prefix safe to put in logs.
    #[must_use]
    pub fn redacted(&self) -> &str {
        let end = self.0.char_indices().nth(6).map_or(self.0.len(), |(i, _)| i);
        &self.0[..end]
    }
}

/// Member identifier, unique within its convoy only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(u64);

impl MemberId {
    /// Wrap a raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for MemberId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convoy_id_is_lowercase_hex() {
        let id = ConvoyId::generate().unwrap();
        assert_eq!(id.len(), CONVOY_ID_BYTES * 2);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn convoy_ids_differ() {
        let a = ConvoyId::generate().unwrap();
        let b = ConvoyId::generate().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn verification_id_is_uuid_v7() {
        let id = VerificationId::new();
        let parsed = Uuid::parse_str(id.as_str()).expect("should be valid UUID");
        assert_eq!(parsed.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn token_is_url_safe() {
        let token = VerificationToken::generate().unwrap();
        assert_eq!(token.len(), 43);
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn token_redaction_keeps_prefix() {
        let token = VerificationToken::from("abcdefghijk");
        assert_eq!(token.redacted(), "abcdef");
        let short = VerificationToken::from("abc");
        assert_eq!(short.redacted(), "abc");
    }

    #[test]
    fn convoy_id_serde_transparent() {
        let id = ConvoyId::from("c0ffee");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"c0ffee\"");
        let back: ConvoyId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn member_id_serializes_as_number() {
        let id = MemberId::new(7);
        assert_eq!(serde_json::to_string(&id).unwrap(), "7");
        assert_eq!(id.to_string(), "7");
        assert_eq!(MemberId::from(7), id);
    }
}
