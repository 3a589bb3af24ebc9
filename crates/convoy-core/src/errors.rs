//! Convoy error types.
//!
//! Every failure the store, hub, or verification flow can report is a variant
//! of [`ConvoyError`]. Each variant belongs to one [`ErrorKind`] (which the
//! HTTP boundary maps to a status code) and carries a stable machine-readable
//! code that clients depend on.

use thiserror::Error;

use crate::ids::{ConvoyId, MemberId};

// ── Error code constants ────────────────────────────────────────────

/// Convoy lookup miss (or convoy hidden because its verification expired).
pub const CONVOY_NOT_FOUND: &str = "CONVOY_NOT_FOUND";
/// Member lookup miss within an existing convoy.
pub const MEMBER_NOT_FOUND: &str = "MEMBER_NOT_FOUND";
/// No verification record for the supplied token.
pub const INVALID_TOKEN: &str = "INVALID_TOKEN";
/// Verification token outlived its expiry.
pub const TOKEN_EXPIRED: &str = "TOKEN_EXPIRED";
/// Verification token was already redeemed.
pub const TOKEN_USED: &str = "TOKEN_USED";
/// Convoy is already verified (resend rejected).
pub const ALREADY_VERIFIED: &str = "ALREADY_VERIFIED";
/// Malformed or out-of-range input.
pub const INVALID_ARGUMENT: &str = "INVALID_ARGUMENT";
/// The OS random source failed.
pub const ENTROPY_UNAVAILABLE: &str = "ENTROPY_UNAVAILABLE";
/// Unexpected internal state.
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

/// Coarse classification of a [`ConvoyError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Lookup miss. Never retried.
    NotFound,
    /// Caller must fix the input.
    InvalidArgument,
    /// Operation conflicts with current state.
    Conflict,
    /// Verification window has passed.
    Expired,
    /// Infrastructure hiccup; retrying may succeed.
    Transient,
    /// Corrupted or impossible state.
    Internal,
}

/// Errors produced by convoy operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConvoyError {
    /// The convoy does not exist (or is no longer served).
    #[error("convoy {0} not found")]
    ConvoyNotFound(ConvoyId),

    /// The member does not exist in the convoy.
    #[error("member {member_id} not found in convoy {convoy_id}")]
    MemberNotFound {
        /// Convoy that was searched.
        convoy_id: ConvoyId,
        /// Missing member.
        member_id: MemberId,
    },

    /// No verification record matches the token.
    #[error("verification token not recognised")]
    VerificationNotFound,

    /// The token was already redeemed.
    #[error("verification token already used")]
    TokenAlreadyUsed,

    /// The token expired before redemption.
    #[error("verification token expired")]
    TokenExpired,

    /// The convoy is verified; the requested transition is not allowed.
    #[error("convoy {0} is already verified")]
    AlreadyVerified(ConvoyId),

    /// Input failed validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Random ID or token generation failed.
    #[error("entropy source unavailable: {0}")]
    Entropy(String),

    /// Internal invariant violated.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ConvoyError {
    /// Shorthand for an [`ConvoyError::InvalidArgument`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Classification used for status mapping and retry decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConvoyNotFound(_) | Self::MemberNotFound { .. } | Self::VerificationNotFound => {
                ErrorKind::NotFound
            }
            Self::TokenAlreadyUsed | Self::AlreadyVerified(_) => ErrorKind::Conflict,
            Self::TokenExpired => ErrorKind::Expired,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Entropy(_) => ErrorKind::Transient,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Machine-readable error code for this variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConvoyNotFound(_) => CONVOY_NOT_FOUND,
            Self::MemberNotFound { .. } => MEMBER_NOT_FOUND,
            Self::VerificationNotFound => INVALID_TOKEN,
            Self::TokenAlreadyUsed => TOKEN_USED,
            Self::TokenExpired => TOKEN_EXPIRED,
            Self::AlreadyVerified(_) => ALREADY_VERIFIED,
            Self::InvalidArgument(_) => INVALID_ARGUMENT,
            Self::Entropy(_) => ENTROPY_UNAVAILABLE,
            Self::Internal(_) => INTERNAL_ERROR,
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

/// Result type for convoy operations.
pub type Result<T> = std::result::Result<T, ConvoyError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_variants_share_kind() {
        let convoy = ConvoyError::ConvoyNotFound(ConvoyId::from("abc"));
        let member = ConvoyError::MemberNotFound {
            convoy_id: ConvoyId::from("abc"),
            member_id: MemberId::new(3),
        };
        assert_eq!(convoy.kind(), ErrorKind::NotFound);
        assert_eq!(member.kind(), ErrorKind::NotFound);
        assert_eq!(ConvoyError::VerificationNotFound.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn expired_is_distinct_from_not_found() {
        assert_eq!(ConvoyError::TokenExpired.kind(), ErrorKind::Expired);
        assert_ne!(
            ConvoyError::TokenExpired.code(),
            ConvoyError::VerificationNotFound.code()
        );
    }

    #[test]
    fn verification_codes_are_stable() {
        assert_eq!(ConvoyError::VerificationNotFound.code(), "INVALID_TOKEN");
        assert_eq!(ConvoyError::TokenExpired.code(), "TOKEN_EXPIRED");
        assert_eq!(ConvoyError::TokenAlreadyUsed.code(), "TOKEN_USED");
        assert_eq!(
            ConvoyError::AlreadyVerified(ConvoyId::from("x")).code(),
            "ALREADY_VERIFIED"
        );
    }

    #[test]
    fn only_entropy_is_retryable() {
        assert!(ConvoyError::Entropy("os rng".into()).is_retryable());
        assert!(!ConvoyError::invalid("bad").is_retryable());
        assert!(!ConvoyError::Internal("boom".into()).is_retryable());
    }

    #[test]
    fn display_includes_ids() {
        let err = ConvoyError::MemberNotFound {
            convoy_id: ConvoyId::from("c1"),
            member_id: MemberId::new(9),
        };
        assert_eq!(err.to_string(), "member 9 not found in convoy c1");
    }

    #[test]
    fn codes_are_screaming_snake_case() {
        let codes = [
            CONVOY_NOT_FOUND,
            MEMBER_NOT_FOUND,
            INVALID_TOKEN,
            TOKEN_EXPIRED,
            TOKEN_USED,
            ALREADY_VERIFIED,
            INVALID_ARGUMENT,
            ENTROPY_UNAVAILABLE,
            INTERNAL_ERROR,
        ];
        for code in codes {
            assert!(
                code.chars().all(|c| c.is_ascii_uppercase() || c == '_'),
                "code '{code}' must be SCREAMING_SNAKE_CASE"
            );
        }
    }
}
