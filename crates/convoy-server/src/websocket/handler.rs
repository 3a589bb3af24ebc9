//! Inbound frame handling for an open channel.

use convoy_core::Location;
use convoy_store::ConvoyStore;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::connection::ClientConnection;
use super::hub::RealtimeHub;
use crate::metrics::LOCATION_UPDATES_TOTAL;

/// Frame could not be parsed or has an unknown type.
pub const INVALID_MESSAGE: &str = "INVALID_MESSAGE";
/// An observer tried to act as a member.
pub const OBSERVER_READ_ONLY: &str = "OBSERVER_READ_ONLY";

/// Frames a client may send.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Same as the REST location write, for the channel's member.
    #[serde(rename = "location.update")]
    LocationUpdate {
        /// Latitude in degrees.
        lat: f64,
        /// Longitude in degrees.
        lng: f64,
    },
    /// Application-level keepalive.
    #[serde(rename = "ping")]
    Ping,
}

/// Direct replies to the sending channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ServerReply {
    /// Answer to [`ClientMessage::Ping`].
    #[serde(rename = "pong")]
    Pong,
    /// The frame was rejected. The channel stays open.
    #[serde(rename = "error")]
    Error {
        /// Machine-readable code.
        error: &'static str,
    },
}

impl ServerReply {
    fn error(code: &'static str) -> Self {
        Self::Error { error: code }
    }
}

/// Handle one text frame. Returns the reply to queue on this channel, if
/// any. Accepted location writes are broadcast through the hub.
pub fn handle_message(
    text: &str,
    conn: &ClientConnection,
    store: &ConvoyStore,
    hub: &RealtimeHub,
) -> Option<ServerReply> {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            debug!(conn_id = %conn.id, error = %e, "malformed frame");
            return Some(ServerReply::error(INVALID_MESSAGE));
        }
    };

    match message {
        ClientMessage::Ping => Some(ServerReply::Pong),
        ClientMessage::LocationUpdate { lat, lng } => {
            let Some(member_id) = conn.member_id else {
                return Some(ServerReply::error(OBSERVER_READ_ONLY));
            };
            match store.update_member_location(&conn.convoy_id, member_id, Location { lat, lng }) {
                Ok(_) => {
                    counter!(LOCATION_UPDATES_TOTAL, "via" => "ws").increment(1);
                    let _ = hub.broadcast(store, &conn.convoy_id);
                    None
                }
                Err(e) => Some(ServerReply::error(e.code())),
            }
        }
    }
}
