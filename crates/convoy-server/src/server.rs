//! `ConvoyServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use convoy_store::ConvoyStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::handlers;
use crate::notifier::VerificationNotifier;
use crate::rate_limit::RateLimiter;
use crate::shutdown::ShutdownCoordinator;
use crate::tasks;
use crate::verification::VerificationFlow;
use crate::websocket::RealtimeHub;

/// Shared state accessible from Axum handlers.
pub struct AppState {
    /// Authoritative convoy state.
    pub store: Arc<ConvoyStore>,
    /// Channel registry and fan-out.
    pub hub: Arc<RealtimeHub>,
    /// Email verification lifecycle.
    pub flow: VerificationFlow,
    /// Verification request limiter.
    pub limiter: Arc<RateLimiter>,
    /// Runtime configuration.
    pub config: ServerConfig,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Renders `/metrics`.
    pub metrics: PrometheusHandle,
    /// When the server started.
    pub start_time: Instant,
}

/// The convoy coordinator server.
pub struct ConvoyServer {
    state: Arc<AppState>,
}

impl ConvoyServer {
    /// Wire the hub, store, and verification flow together.
    pub fn new(
        config: ServerConfig,
        notifier: Arc<dyn VerificationNotifier>,
        metrics: PrometheusHandle,
    ) -> Self {
        let hub = Arc::new(RealtimeHub::new());
        let store = Arc::new(ConvoyStore::new(hub.clone(), config.thresholds));
        let flow = VerificationFlow::new(store.clone(), hub.clone(), notifier, config.token_ttl);
        let state = AppState {
            store,
            hub,
            flow,
            limiter: Arc::new(RateLimiter::default()),
            config,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics,
            start_time: Instant::now(),
        };
        Self {
            state: Arc::new(state),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        handlers::routes()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Bind and serve until shutdown. Returns the bound address and the
    /// serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.state.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let token = self.state.shutdown.token();
        info!(%addr, "convoy server listening");

        let handle = tokio::spawn(async move {
            let serve = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(token.cancelled_owned());
            if let Err(e) = serve.await {
                error!(error = %e, "server error");
            }
        });
        Ok((addr, handle))
    }

    /// Start the status refresh and expiry sweep loops.
    pub fn spawn_background_tasks(&self) -> Vec<JoinHandle<()>> {
        let state = &self.state;
        vec![
            tasks::spawn_status_refresh(
                state.store.clone(),
                state.hub.clone(),
                state.config.refresh_interval,
                state.shutdown.token(),
            ),
            tasks::spawn_expiry_sweep(
                state.store.clone(),
                state.hub.clone(),
                state.limiter.clone(),
                state.config.sweep_interval,
                state.shutdown.token(),
            ),
        ]
    }

    /// Shared handler state.
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Get the convoy store.
    pub fn store(&self) -> &Arc<ConvoyStore> {
        &self.state.store
    }

    /// Get the realtime hub.
    pub fn hub(&self) -> &Arc<RealtimeHub> {
        &self.state.hub
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::metrics::detached_handle;
    use crate::notifier::LogNotifier;

    fn make_server() -> ConvoyServer {
        ConvoyServer::new(
            ServerConfig::default(),
            Arc::new(LogNotifier::new("http://localhost")),
            detached_handle(),
        )
    }

    async fn call(
        app: Router,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        call_from(app, None, method, uri, body).await
    }

    async fn call_from(
        app: Router,
        forwarded_for: Option<&str>,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(addr) = forwarded_for {
            builder = builder.header("x-forwarded-for", addr);
        }
        let req = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1 << 20).await.unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, json)
    }

    #[test]
    fn server_with_default_config() {
        let server = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert_eq!(server.config().port, 0);
        assert!(!server.shutdown().is_shutting_down());
        assert_eq!(server.hub().connection_count(), 0);
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let server = make_server();
        let (status, body) = call(server.router(), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 0);
        assert!(body["uptimeSecs"].is_number());
        assert!(body["pendingVerifications"].is_number());
    }

    #[tokio::test]
    async fn metrics_endpoint_serves_text() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let ct = resp.headers()[axum::http::header::CONTENT_TYPE].to_str().unwrap();
        assert!(ct.starts_with("text/plain"));
    }

    #[tokio::test]
    async fn create_join_move_and_read() {
        let server = make_server();
        let (status, created) = call(server.router(), "POST", "/convoys", None).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_str().unwrap().to_owned();

        let (status, member) = call(
            server.router(),
            "POST",
            &format!("/convoys/{id}/members"),
            Some(serde_json::json!({"name": "Alice", "location": {"lat": 14.6, "lng": 121.0}})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(member["name"], "Alice");
        assert_eq!(member["status"], "connected");
        let member_id = member["id"].as_u64().unwrap();

        let (status, moved) = call(
            server.router(),
            "PUT",
            &format!("/convoys/{id}/members/{member_id}/location"),
            Some(serde_json::json!({"lat": 14.61, "lng": 121.01})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(moved["location"]["lat"], 14.61);

        let (status, snapshot) = call(server.router(), "GET", &format!("/convoys/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(snapshot["members"][0]["location"]["lng"], 121.01);
        assert!(snapshot["destination"].is_null());
        // No channel was ever opened, so the derived status is disconnected.
        assert_eq!(snapshot["members"][0]["status"], "disconnected");
        assert_eq!(snapshot["health"], "critical");
    }

    #[tokio::test]
    async fn destination_is_cleaned_and_replaced() {
        let server = make_server();
        let id = server.store().create_convoy().unwrap().id;

        let (status, dest) = call(
            server.router(),
            "POST",
            &format!("/convoys/{id}/destination"),
            Some(serde_json::json!({"name": "  Baguio, Benguet", "lat": 16.4, "lng": 120.6})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(dest["name"], "Baguio");

        let (status, err) = call(
            server.router(),
            "POST",
            &format!("/convoys/{id}/destination"),
            Some(serde_json::json!({"name": " , x", "lat": 1.0, "lng": 1.0})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["error"], "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn unknown_convoy_and_member_are_404() {
        let server = make_server();
        let (status, err) = call(server.router(), "GET", "/convoys/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(err["error"], "CONVOY_NOT_FOUND");

        let id = server.store().create_convoy().unwrap().id;
        let (status, err) = call(
            server.router(),
            "DELETE",
            &format!("/convoys/{id}/members/42"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(err["error"], "MEMBER_NOT_FOUND");
    }

    #[tokio::test]
    async fn leave_returns_no_content() {
        let server = make_server();
        let id = server.store().create_convoy().unwrap().id;
        let (_, member) = call(
            server.router(),
            "POST",
            &format!("/convoys/{id}/members"),
            Some(serde_json::json!({"name": "Bob"})),
        )
        .await;
        let member_id = member["id"].as_u64().unwrap();
        let (status, _) = call(
            server.router(),
            "DELETE",
            &format!("/convoys/{id}/members/{member_id}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(server.store().get_convoy(&id).unwrap().members.is_empty());
    }

    #[tokio::test]
    async fn malformed_body_uses_error_shape() {
        let server = make_server();
        let id = server.store().create_convoy().unwrap().id;
        let (status, err) = call(
            server.router(),
            "POST",
            &format!("/convoys/{id}/members"),
            Some(serde_json::json!({"nickname": "x"})),
        )
        .await;
        assert!(status.is_client_error());
        assert_eq!(err["error"], "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn verification_round_trip_over_http() {
        let server = make_server();
        let (status, created) = call(
            server.router(),
            "POST",
            "/convoys/create-with-verification",
            Some(serde_json::json!({"name": "Leader", "email": "a@b.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["emailSent"], true);
        let convoy_id = convoy_core::ConvoyId::from(created["convoyId"].as_str().unwrap());

        let token = server
            .store()
            .get_convoy(&convoy_id)
            .unwrap()
            .verification_token
            .unwrap();
        let (status, verified) = call(
            server.router(),
            "GET",
            &format!("/convoys/verify/{token}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(verified["isVerified"], true);
        assert_eq!(verified["leaderName"], "Leader");

        let (status, err) = call(
            server.router(),
            "GET",
            &format!("/convoys/verify/{token}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(err["error"], "TOKEN_USED");

        let (status, err) = call(
            server.router(),
            "POST",
            &format!("/convoys/{convoy_id}/resend-verification"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(err["error"], "ALREADY_VERIFIED");
    }

    #[tokio::test]
    async fn unknown_token_is_invalid_token() {
        let server = make_server();
        let (status, err) = call(server.router(), "GET", "/convoys/verify/bogus", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(err["error"], "INVALID_TOKEN");
    }

    #[tokio::test]
    async fn email_rate_limit_trips() {
        let config = ServerConfig {
            email_per_hour: 2,
            ..ServerConfig::default()
        };
        let server = ConvoyServer::new(
            config,
            Arc::new(LogNotifier::new("http://localhost")),
            detached_handle(),
        );
        let body = serde_json::json!({"name": "L", "email": "Same@Example.com"});
        for _ in 0..2 {
            let (status, _) = call(
                server.router(),
                "POST",
                "/convoys/create-with-verification",
                Some(body.clone()),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }
        let (status, err) = call(
            server.router(),
            "POST",
            "/convoys/create-with-verification",
            Some(serde_json::json!({"name": "L", "email": "same@example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err["error"], "RATE_LIMIT_EMAIL");
    }

    #[tokio::test]
    async fn ip_rate_limit_trips_across_emails() {
        let config = ServerConfig {
            ip_per_hour: 1,
            ..ServerConfig::default()
        };
        let server = ConvoyServer::new(
            config,
            Arc::new(LogNotifier::new("http://localhost")),
            detached_handle(),
        );
        let (status, _) = call(
            server.router(),
            "POST",
            "/convoys/create-with-verification",
            Some(serde_json::json!({"name": "L", "email": "one@example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, err) = call(
            server.router(),
            "POST",
            "/convoys/create-with-verification",
            Some(serde_json::json!({"name": "L", "email": "two@example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err["error"], "RATE_LIMIT_IP");
    }

    #[tokio::test]
    async fn ip_limit_is_checked_before_email_quota_is_spent() {
        let config = ServerConfig {
            ip_per_hour: 1,
            email_per_hour: 1,
            ..ServerConfig::default()
        };
        let server = ConvoyServer::new(
            config,
            Arc::new(LogNotifier::new("http://localhost")),
            detached_handle(),
        );
        let create = "/convoys/create-with-verification";
        let first = serde_json::json!({"name": "L", "email": "first@example.com"});
        let second = serde_json::json!({"name": "L", "email": "second@example.com"});

        let (status, _) =
            call_from(server.router(), Some("198.51.100.1"), "POST", create, Some(first)).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, err) = call_from(
            server.router(),
            Some("198.51.100.1"),
            "POST",
            create,
            Some(second.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err["error"], "RATE_LIMIT_IP");

        // The IP rejection must not have spent the second email's quota.
        let (status, _) =
            call_from(server.router(), Some("198.51.100.2"), "POST", create, Some(second)).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn resend_on_expired_pending_convoy_is_404() {
        let server = make_server();
        let convoy = server
            .store()
            .create_convoy_with_verification(
                "late@example.com",
                "Late",
                convoy_core::VerificationToken::from("stale-token"),
                chrono::Utc::now() - chrono::Duration::seconds(5),
            )
            .unwrap();
        let uri = format!("/convoys/{}", convoy.id);

        let (status, _) = call(server.router(), "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, err) = call(
            server.router(),
            "POST",
            &format!("{uri}/resend-verification"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(err["error"], "CONVOY_NOT_FOUND");

        let (status, _) = call(server.router(), "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server();
        let (status, _) = call(server.router(), "GET", "/nonexistent", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
