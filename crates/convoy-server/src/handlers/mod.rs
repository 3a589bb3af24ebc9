//! HTTP route handlers.

mod convoys;
mod ops;
mod verification;

use std::sync::Arc;

use axum::Router;

use crate::server::AppState;

/// All routes, awaiting state.
pub(crate) fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(convoys::router())
        .merge(verification::router())
        .merge(ops::router())
}
