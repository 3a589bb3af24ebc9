//! WebSocket session lifecycle: one channel from upgrade through close.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use convoy_core::{ConvoyId, Envelope, MemberId, MemberStatus};
use convoy_store::PresenceProbe;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::connection::ClientConnection;
use super::handler::{INVALID_MESSAGE, ServerReply, handle_message};
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL};
use crate::server::AppState;

/// Event type of the first frame on every channel.
pub const CONNECTION_ESTABLISHED: &str = "connection.established";

/// Payload of the handshake frame.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionEstablished<'a> {
    /// Server-assigned channel ID.
    pub connection_id: &'a str,
    /// Convoy the channel follows.
    pub convoy_id: &'a ConvoyId,
    /// Member the channel reports for; `null` for observers.
    pub member_id: Option<MemberId>,
}

fn queue_reply(conn: &ClientConnection, reply: &ServerReply) {
    match serde_json::to_string(reply) {
        Ok(json) => {
            if !conn.send(Arc::new(json)) {
                debug!("reply not queued (channel full or closed)");
            }
        }
        Err(e) => warn!(error = %e, "failed to serialize reply"),
    }
}

/// Run one channel.
///
/// 1. Queues `connection.established`
/// 2. Registers with the hub, marks the member connected, and broadcasts
/// 3. Forwards queued frames and sends periodic Pings
/// 4. Handles inbound frames until close, idle timeout, or shutdown
/// 5. Unregisters, marks the member disconnected if this was its last
///    channel, and broadcasts
#[instrument(skip_all, fields(conn_id, convoy_id = %convoy_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    state: Arc<AppState>,
    convoy_id: ConvoyId,
    member_id: Option<MemberId>,
) {
    let conn_id = Uuid::now_v7().to_string();
    let _ = tracing::Span::current().record("conn_id", conn_id.as_str());
    let config = &state.config;

    let (mut ws_tx, mut ws_rx) = ws.split();
    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(config.channel_buffer);
    let cancel = state.shutdown.child_token();
    let conn = Arc::new(ClientConnection::new(
        conn_id,
        convoy_id.clone(),
        member_id,
        send_tx,
        cancel.clone(),
    ));

    let established = Envelope::new(
        CONNECTION_ESTABLISHED,
        ConnectionEstablished {
            connection_id: &conn.id,
            convoy_id: &convoy_id,
            member_id,
        },
    );
    match established.to_json() {
        Ok(json) => {
            let _ = conn.send(Arc::new(json));
        }
        Err(e) => warn!(error = %e, "failed to serialize handshake"),
    }

    if !state.hub.register(conn.clone()) {
        return;
    }
    info!(member_id = ?member_id, "channel open");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    if let Some(member_id) = member_id {
        if let Err(e) = state
            .store
            .update_member_status(&convoy_id, member_id, MemberStatus::Connected)
        {
            debug!(error = %e, "member vanished before open");
            let _ = conn.close();
        }
    }
    let _ = state.hub.broadcast(&state.store, &convoy_id);

    let outbound_conn = conn.clone();
    let ping_interval = config.ping_interval;
    let pong_timeout = config.pong_timeout;
    let outbound = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ping_interval);
        // Skip the immediate first tick
        let _ = ticker.tick().await;

        loop {
            tokio::select! {
                () = outbound_conn.cancel_token().cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
                msg = send_rx.recv() => {
                    let Some(text) = msg else { break };
                    if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if !outbound_conn.check_alive() && outbound_conn.last_seen_elapsed() > pong_timeout {
                        warn!("client unresponsive for {pong_timeout:?}, closing");
                        break;
                    }
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = outbound_conn.close();
    });

    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => break,
            frame = ws_rx.next() => frame,
        };
        let Some(Ok(msg)) = frame else { break };
        conn.mark_alive();

        let text = match msg {
            Message::Text(t) => t.to_string(),
            Message::Binary(data) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s,
                Err(_) => {
                    queue_reply(&conn, &ServerReply::Error { error: INVALID_MESSAGE });
                    continue;
                }
            },
            Message::Close(_) => {
                debug!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        if let Some(reply) = handle_message(&text, &conn, &state.store, &state.hub) {
            queue_reply(&conn, &reply);
        }
    }

    let _ = conn.close();
    let _ = state.hub.unregister(&conn);
    if let Some(member_id) = member_id {
        if !state.hub.has_active_connection(&convoy_id, member_id) {
            if let Err(e) =
                state
                    .store
                    .update_member_status(&convoy_id, member_id, MemberStatus::Disconnected)
            {
                debug!(error = %e, "member already gone at close");
            }
        }
    }
    let _ = state.hub.broadcast(&state.store, &convoy_id);
    let _ = outbound.await;

    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    info!(
        member_id = ?member_id,
        dropped = conn.drop_count(),
        duration_secs = conn.age().as_secs(),
        "channel closed"
    );
}
