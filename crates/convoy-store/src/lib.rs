//! # convoy-store
//!
//! The authoritative convoy map. All reads and writes go through one
//! reader-writer lock; live-channel presence is consulted through the
//! [`PresenceProbe`] seam.

#![deny(unsafe_code)]

pub mod presence;
pub mod store;
pub mod verification;

pub use presence::{NoPresence, PresenceProbe};
pub use store::{ConvoyStore, StoreStats};
pub use verification::CleanupReport;
