//! Email verification endpoints, gated by the rate limiter.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use convoy_core::{ConvoyId, VerificationToken};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ApiError, RATE_LIMIT_EMAIL, RATE_LIMIT_IP};
use crate::extract::ClientAddr;
use crate::metrics::RATE_LIMITED_TOTAL;
use crate::rate_limit::{email_key, ip_key};
use crate::server::AppState;
use crate::verification::normalize_email;

pub(crate) fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/convoys/create-with-verification",
            post(create_with_verification),
        )
        .route("/convoys/verify/{token}", get(verify))
        .route("/convoys/{id}/resend-verification", post(resend))
}

#[derive(Debug, Deserialize)]
struct CreateRequest {
    name: String,
    email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateResponse {
    convoy_id: ConvoyId,
    expires_at: DateTime<Utc>,
    email_sent: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponse {
    convoy_id: ConvoyId,
    is_verified: bool,
    verified_at: Option<DateTime<Utc>>,
    leader_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResendResponse {
    expires_at: DateTime<Utc>,
    email_sent: bool,
}

fn check_email_limit(state: &AppState, email: &str) -> Result<(), ApiError> {
    if state
        .limiter
        .check_simple(&email_key(email), state.config.email_per_hour)
        .is_allowed()
    {
        Ok(())
    } else {
        counter!(RATE_LIMITED_TOTAL, "scope" => "email").increment(1);
        Err(ApiError::RateLimited(RATE_LIMIT_EMAIL))
    }
}

fn check_ip_limit(state: &AppState, addr: &str) -> Result<(), ApiError> {
    if state
        .limiter
        .check_simple(&ip_key(addr), state.config.ip_per_hour)
        .is_allowed()
    {
        Ok(())
    } else {
        counter!(RATE_LIMITED_TOTAL, "scope" => "ip").increment(1);
        Err(ApiError::RateLimited(RATE_LIMIT_IP))
    }
}

async fn create_with_verification(
    State(state): State<Arc<AppState>>,
    ClientAddr(addr): ClientAddr,
    body: Result<Json<CreateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    let email = normalize_email(&req.email)?;
    check_ip_limit(&state, &addr)?;
    check_email_limit(&state, &email)?;

    let created = state.flow.create(&email, &req.name).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateResponse {
            convoy_id: created.convoy_id,
            expires_at: created.expires_at,
            email_sent: created.email_sent,
        }),
    ))
}

async fn verify(
    State(state): State<Arc<AppState>>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let Path(token) = path?;
    let convoy = state.flow.verify(&VerificationToken::from(token))?;
    Ok(Json(VerifyResponse {
        convoy_id: convoy.id,
        is_verified: convoy.is_verified,
        verified_at: convoy.verified_at,
        leader_name: convoy.leader_name,
    }))
}

async fn resend(
    State(state): State<Arc<AppState>>,
    ClientAddr(addr): ClientAddr,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<ResendResponse>, ApiError> {
    let Path(id) = path?;
    let convoy_id = ConvoyId::from(id);
    check_ip_limit(&state, &addr)?;
    let email = state.store.pending_verification_email(&convoy_id)?;
    check_email_limit(&state, &email)?;

    let resent = state.flow.resend(&convoy_id).await?;
    info!(convoy_id = %convoy_id, "resend requested");
    Ok(Json(ResendResponse {
        expires_at: resent.expires_at,
        email_sent: resent.email_sent,
    }))
}
