//! Health, metrics, and the channel upgrade.

use std::sync::Arc;

use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use convoy_core::{ConvoyError, ConvoyId, MemberId};
use serde::Deserialize;

use crate::error::ApiError;
use crate::health::{HealthResponse, health_check};
use crate::server::AppState;
use crate::websocket::session::run_ws_session;

pub(crate) fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws/convoys/{id}", get(ws_upgrade))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(health_check(
        state.start_time,
        state.hub.connection_count(),
        state.store.stats(),
        state.shutdown.is_shutting_down(),
    ))
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelQuery {
    member_id: Option<u64>,
}

/// `GET /ws/convoys/{id}?memberId=`. Unknown convoys and members are
/// refused before the upgrade.
async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<ChannelQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    if state.shutdown.is_shutting_down() {
        return Err(ApiError::Unavailable);
    }
    let Path(id) = path?;
    let Query(query) = query?;
    let convoy_id = ConvoyId::from(id);
    let convoy = state.store.get_convoy(&convoy_id)?;
    let member_id = query.member_id.map(MemberId::new);
    if let Some(member_id) = member_id {
        if convoy.member(member_id).is_none() {
            return Err(ConvoyError::MemberNotFound {
                convoy_id,
                member_id,
            }
            .into());
        }
    }

    let max_message_size = state.config.max_message_size;
    Ok(ws
        .max_message_size(max_message_size)
        .on_upgrade(move |socket| run_ws_session(socket, state, convoy_id, member_id)))
}
