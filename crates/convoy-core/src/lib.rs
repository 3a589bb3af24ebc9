//! # convoy-core
//!
//! Shared vocabulary for the convoy coordinator:
//!
//! - **Branded IDs**: `ConvoyId`, `MemberId`, `VerificationToken`
//! - **Model**: `Convoy`, `Member`, `Destination`, `Location`, `ConvoyVerification`
//! - **Status**: pure member-status and convoy-health derivation
//! - **Snapshots**: the wire shape pushed to clients
//! - **Errors**: `ConvoyError` with stable machine-readable codes

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod model;
pub mod snapshot;
pub mod status;

pub use errors::{ConvoyError, ErrorKind, Result};
pub use ids::{ConvoyId, MemberId, VerificationId, VerificationToken};
pub use model::{Convoy, ConvoyVerification, Destination, Location, Member, NewMember};
pub use snapshot::{ConvoySnapshot, Envelope};
pub use status::{ConvoyHealth, MemberSignals, MemberStatus, StatusCounts, StatusThresholds};
