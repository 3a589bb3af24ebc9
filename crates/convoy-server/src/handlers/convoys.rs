//! Convoy and member endpoints. Every successful mutation is followed by a
//! broadcast to the convoy's open channels.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use convoy_core::{
    ConvoyId, ConvoySnapshot, Destination, Location, Member, MemberId, NewMember,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;
use crate::metrics::{
    CONVOY_CREATED_TOTAL, LOCATION_UPDATES_TOTAL, MEMBER_JOINED_TOTAL, MEMBER_LEFT_TOTAL,
};
use crate::server::AppState;

pub(crate) fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/convoys", post(create_convoy))
        .route("/convoys/{id}", get(get_convoy))
        .route("/convoys/{id}/members", post(add_member))
        .route("/convoys/{id}/members/{member_id}", delete(leave_convoy))
        .route(
            "/convoys/{id}/members/{member_id}/location",
            put(update_location),
        )
        .route("/convoys/{id}/destination", post(set_destination))
}

#[derive(Debug, Serialize)]
struct CreatedConvoy {
    id: ConvoyId,
}

/// Body of `POST /convoys/{id}/members`. A missing location joins at the
/// placeholder origin.
#[derive(Debug, Deserialize)]
struct JoinRequest {
    name: String,
    #[serde(default)]
    location: Option<Location>,
}

#[derive(Debug, Deserialize)]
struct DestinationRequest {
    name: String,
    #[serde(default)]
    description: Option<String>,
    lat: f64,
    lng: f64,
}

async fn create_convoy(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let convoy = state.store.create_convoy()?;
    counter!(CONVOY_CREATED_TOTAL, "flow" => "direct").increment(1);
    info!(convoy_id = %convoy.id, "convoy created");
    Ok((StatusCode::CREATED, Json(CreatedConvoy { id: convoy.id })))
}

async fn get_convoy(
    State(state): State<Arc<AppState>>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<ConvoySnapshot>, ApiError> {
    let Path(id) = path?;
    let snapshot = state.store.snapshot(&ConvoyId::from(id))?;
    Ok(Json(snapshot))
}

async fn add_member(
    State(state): State<Arc<AppState>>,
    path: Result<Path<String>, PathRejection>,
    body: Result<Json<JoinRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = path?;
    let Json(req) = body?;
    let convoy_id = ConvoyId::from(id);
    let new_member = NewMember::new(
        &req.name,
        req.location.unwrap_or(Location { lat: 0.0, lng: 0.0 }),
    )?;
    let member = state.store.add_member(&convoy_id, new_member)?;
    counter!(MEMBER_JOINED_TOTAL).increment(1);
    info!(convoy_id = %convoy_id, member_id = %member.id, "member joined");
    let _ = state.hub.broadcast(&state.store, &convoy_id);
    Ok((StatusCode::CREATED, Json(member)))
}

async fn leave_convoy(
    State(state): State<Arc<AppState>>,
    path: Result<Path<(String, u64)>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path((id, member_id)) = path?;
    let convoy_id = ConvoyId::from(id);
    let member_id = MemberId::new(member_id);
    let _ = state.store.leave_convoy(&convoy_id, member_id)?;
    let closed = state.hub.close_member(&convoy_id, member_id);
    counter!(MEMBER_LEFT_TOTAL).increment(1);
    info!(convoy_id = %convoy_id, member_id = %member_id, closed, "member left");
    let _ = state.hub.broadcast(&state.store, &convoy_id);
    Ok(StatusCode::NO_CONTENT)
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    path: Result<Path<(String, u64)>, PathRejection>,
    body: Result<Json<Location>, JsonRejection>,
) -> Result<Json<Member>, ApiError> {
    let Path((id, member_id)) = path?;
    let Json(location) = body?;
    let convoy_id = ConvoyId::from(id);
    let member = state
        .store
        .update_member_location(&convoy_id, MemberId::new(member_id), location)?;
    counter!(LOCATION_UPDATES_TOTAL, "via" => "rest").increment(1);
    let _ = state.hub.broadcast(&state.store, &convoy_id);
    Ok(Json(member))
}

async fn set_destination(
    State(state): State<Arc<AppState>>,
    path: Result<Path<String>, PathRejection>,
    body: Result<Json<DestinationRequest>, JsonRejection>,
) -> Result<Json<Destination>, ApiError> {
    let Path(id) = path?;
    let Json(req) = body?;
    let convoy_id = ConvoyId::from(id);
    let destination = Destination::new(&req.name, req.description.as_deref(), req.lat, req.lng)?;
    state
        .store
        .set_convoy_destination(&convoy_id, destination.clone())?;
    info!(convoy_id = %convoy_id, "destination set");
    let _ = state.hub.broadcast(&state.store, &convoy_id);
    Ok(Json(destination))
}
