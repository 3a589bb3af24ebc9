//! Convoy domain model.
//!
//! The store exclusively owns every value here; everything handed out to
//! callers is a clone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{ConvoyError, Result};
use crate::ids::{ConvoyId, MemberId, VerificationId, VerificationToken};
use crate::status::MemberStatus;

/// Maximum member display name length, in characters.
pub const MAX_MEMBER_NAME_CHARS: usize = 50;
/// Maximum destination name length, in characters.
pub const MAX_DESTINATION_NAME_CHARS: usize = 100;
/// Maximum destination description length, in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 500;

/// Truncate to at most `max` characters on a char boundary.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Trim and cap a member display name. Empty names are rejected.
pub fn clean_member_name(raw: &str) -> Result<String> {
    let trimmed = truncate_chars(raw.trim(), MAX_MEMBER_NAME_CHARS).trim_end();
    if trimmed.is_empty() {
        return Err(ConvoyError::invalid("member name must not be empty"));
    }
    Ok(trimmed.to_owned())
}

/// Reduce a full place name ("Rizal Park, Manila, Philippines") to its
/// leading segment, capped at [`MAX_DESTINATION_NAME_CHARS`].
pub fn clean_destination_name(raw: &str) -> Result<String> {
    let head = raw.split(',').next().unwrap_or_default().trim();
    let capped = truncate_chars(head, MAX_DESTINATION_NAME_CHARS).trim_end();
    if capped.is_empty() {
        return Err(ConvoyError::invalid("destination name must not be empty"));
    }
    Ok(capped.to_owned())
}

/// A latitude/longitude pair in decimal degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude, `-90..=90`.
    pub lat: f64,
    /// Longitude, `-180..=180`.
    pub lng: f64,
}

impl Location {
    /// Validated constructor.
    pub fn new(lat: f64, lng: f64) -> Result<Self> {
        let loc = Self { lat, lng };
        loc.validate()?;
        Ok(loc)
    }

    /// Reject non-finite or out-of-range coordinates.
    pub fn validate(&self) -> Result<()> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(ConvoyError::invalid(format!("latitude {} out of range", self.lat)));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(ConvoyError::invalid(format!("longitude {} out of range", self.lng)));
        }
        Ok(())
    }

    /// `(0, 0)` is what clients send before they have a GPS fix.
    #[allow(clippy::float_cmp)]
    pub fn is_placeholder(&self) -> bool {
        self.lat == 0.0 && self.lng == 0.0
    }
}

/// One participant's presence within a convoy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    /// Unique within the convoy, never reused.
    pub id: MemberId,
    /// Display name (≤ 50 chars).
    pub name: String,
    /// Last known position.
    pub location: Location,
    /// Derived connectivity status.
    pub status: MemberStatus,
    /// Time of the last accepted location write (join time until then).
    pub last_update: DateTime<Utc>,
    /// When the member joined.
    pub joined_at: DateTime<Utc>,
    /// Whether a real (non-placeholder) location has ever been recorded.
    #[serde(skip)]
    pub has_reported_location: bool,
}

/// Input for adding a member.
#[derive(Clone, Debug, PartialEq)]
pub struct NewMember {
    /// Cleaned display name.
    pub name: String,
    /// Initial position, possibly a placeholder.
    pub location: Location,
}

impl NewMember {
    /// Clean the name and validate the location.
    pub fn new(name: &str, location: Location) -> Result<Self> {
        location.validate()?;
        Ok(Self {
            name: clean_member_name(name)?,
            location,
        })
    }
}

/// The convoy's shared target.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    /// Short place name (≤ 100 chars).
    pub name: String,
    /// Optional free text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lng: f64,
}

impl Destination {
    /// Apply the naming rules and validate coordinates.
    pub fn new(raw_name: &str, description: Option<&str>, lat: f64, lng: f64) -> Result<Self> {
        let _ = Location::new(lat, lng)?;
        let description = description
            .map(|d| truncate_chars(d.trim(), MAX_DESCRIPTION_CHARS).to_owned())
            .filter(|d| !d.is_empty());
        Ok(Self {
            name: clean_destination_name(raw_name)?,
            description,
            lat,
            lng,
        })
    }

    /// Re-check invariants on a value that may have been built field by field.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ConvoyError::invalid("destination name must not be empty"));
        }
        if self.name.chars().count() > MAX_DESTINATION_NAME_CHARS {
            return Err(ConvoyError::invalid("destination name too long"));
        }
        Location {
            lat: self.lat,
            lng: self.lng,
        }
        .validate()
    }
}

/// Authoritative state of one convoy.
#[derive(Clone, Debug, PartialEq)]
pub struct Convoy {
    /// Immutable random ID.
    pub id: ConvoyId,
    /// Members in join order.
    pub members: Vec<Member>,
    /// At most one destination; replaced wholesale.
    pub destination: Option<Destination>,
    /// `false` only while a verification is pending.
    pub is_verified: bool,
    /// Email that requested the convoy (verification flow only).
    pub created_by_email: Option<String>,
    /// Leader's display name (verification flow only).
    pub leader_name: Option<String>,
    /// Current verification token (verification flow only).
    pub verification_token: Option<VerificationToken>,
    /// When the current token expires (verification flow only).
    pub verification_expires_at: Option<DateTime<Utc>>,
    /// When the convoy was verified.
    pub verified_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Bumped on every externally visible change.
    pub revision: u64,
    next_member_id: u64,
}

impl Convoy {
    /// A verified convoy (legacy creation path).
    pub fn new(id: ConvoyId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            members: Vec::new(),
            destination: None,
            is_verified: true,
            created_by_email: None,
            leader_name: None,
            verification_token: None,
            verification_expires_at: None,
            verified_at: None,
            created_at: now,
            revision: 1,
            next_member_id: 1,
        }
    }

    /// An unverified convoy bound to a pending token.
    pub fn pending(
        id: ConvoyId,
        email: String,
        leader_name: String,
        token: VerificationToken,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            is_verified: false,
            created_by_email: Some(email),
            leader_name: Some(leader_name),
            verification_token: Some(token),
            verification_expires_at: Some(expires_at),
            ..Self::new(id, now)
        }
    }

    /// Hand out the next member ID. IDs are never reused.
    pub fn allocate_member_id(&mut self) -> MemberId {
        let id = MemberId::new(self.next_member_id);
        self.next_member_id += 1;
        id
    }

    /// Look up a member.
    pub fn member(&self, id: MemberId) -> Option<&Member> {
        self.members.iter().find(|m| m.id == id)
    }

    /// Look up a member mutably.
    pub fn member_mut(&mut self, id: MemberId) -> Option<&mut Member> {
        self.members.iter_mut().find(|m| m.id == id)
    }

    /// Unverified with a lapsed token: must not be served.
    pub fn is_expired_unverified(&self, now: DateTime<Utc>) -> bool {
        !self.is_verified && self.verification_expires_at.is_some_and(|exp| exp <= now)
    }

    /// Record an externally visible change.
    pub fn bump_revision(&mut self) {
        self.revision += 1;
    }
}

/// Verification bookkeeping, keyed by token in the store.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvoyVerification {
    /// Record ID.
    pub id: VerificationId,
    /// Owning convoy.
    pub convoy_id: ConvoyId,
    /// Address the token was sent to.
    pub email: String,
    /// Current token.
    pub token: VerificationToken,
    /// Token expiry.
    pub expires_at: DateTime<Utc>,
    /// `None` while pending.
    pub verified_at: Option<DateTime<Utc>>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

impl ConvoyVerification {
    /// Whether the token has not been redeemed.
    pub fn is_pending(&self) -> bool {
        self.verified_at.is_none()
    }

    /// Whether the token has lapsed at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Duration;

    #[test]
    fn member_name_is_trimmed_and_capped() {
        let long = "x".repeat(80);
        assert_eq!(clean_member_name(&long).unwrap().chars().count(), 50);
        assert_eq!(clean_member_name("  Alice  ").unwrap(), "Alice");
    }

    #[test]
    fn empty_member_name_rejected() {
        assert_matches!(clean_member_name("   "), Err(ConvoyError::InvalidArgument(_)));
    }

    #[test]
    fn truncation_respects_multibyte_chars() {
        let name = "é".repeat(60);
        let cleaned = clean_member_name(&name).unwrap();
        assert_eq!(cleaned.chars().count(), 50);
    }

    #[test]
    fn destination_name_cut_at_first_comma() {
        let name = clean_destination_name("Rizal Park, Ermita, Manila, Philippines").unwrap();
        assert_eq!(name, "Rizal Park");
    }

    #[test]
    fn destination_name_hard_capped() {
        let raw = format!("{}, Somewhere", "a".repeat(150));
        assert_eq!(clean_destination_name(&raw).unwrap().len(), 100);
    }

    #[test]
    fn destination_name_empty_before_comma_rejected() {
        assert_matches!(
            clean_destination_name(" , Manila"),
            Err(ConvoyError::InvalidArgument(_))
        );
        assert_matches!(clean_destination_name(""), Err(ConvoyError::InvalidArgument(_)));
    }

    #[test]
    fn destination_description_blank_becomes_none() {
        let dest = Destination::new("Cafe", Some("   "), 14.6, 121.0).unwrap();
        assert!(dest.description.is_none());
        let dest = Destination::new("Cafe", Some("meet at gate 2"), 14.6, 121.0).unwrap();
        assert_eq!(dest.description.as_deref(), Some("meet at gate 2"));
    }

    #[test]
    fn destination_serializes_without_missing_description() {
        let dest = Destination::new("Cafe", None, 1.0, 2.0).unwrap();
        let json = serde_json::to_value(&dest).unwrap();
        assert_eq!(json["name"], "Cafe");
        assert!(json.get("description").is_none());
    }

    #[test]
    fn location_range_checked() {
        assert!(Location::new(14.6, 121.0).is_ok());
        assert_matches!(Location::new(91.0, 0.0), Err(ConvoyError::InvalidArgument(_)));
        assert_matches!(Location::new(0.0, -181.0), Err(ConvoyError::InvalidArgument(_)));
        assert_matches!(Location::new(f64::NAN, 0.0), Err(ConvoyError::InvalidArgument(_)));
    }

    #[test]
    fn placeholder_location_detected() {
        assert!(Location { lat: 0.0, lng: 0.0 }.is_placeholder());
        assert!(!Location { lat: 0.0, lng: 1.0 }.is_placeholder());
    }

    #[test]
    fn member_ids_are_monotonic() {
        let mut convoy = Convoy::new(ConvoyId::from("c"), Utc::now());
        let a = convoy.allocate_member_id();
        let b = convoy.allocate_member_id();
        assert_eq!(a, MemberId::new(1));
        assert_eq!(b, MemberId::new(2));
    }

    #[test]
    fn pending_convoy_expiry() {
        let now = Utc::now();
        let convoy = Convoy::pending(
            ConvoyId::from("c"),
            "a@b.com".into(),
            "Leader".into(),
            VerificationToken::from("tok"),
            now - Duration::seconds(1),
            now - Duration::hours(1),
        );
        assert!(!convoy.is_verified);
        assert!(convoy.is_expired_unverified(now));

        let legacy = Convoy::new(ConvoyId::from("d"), now);
        assert!(!legacy.is_expired_unverified(now));
    }
}
