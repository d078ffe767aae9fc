//! Web server: axum app serving the checker form and the JSON API.
//!
//! Shared state holds the browser probe and the active match rules. Each
//! request to the check endpoint gets its own probe session.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use http::{header, HeaderValue};
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;

use consent_core::MatchRules;

use crate::probe::BrowserProbe;

pub mod pages;
pub mod routes;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct AppState {
    pub probe: Arc<dyn BrowserProbe>,
    pub rules: MatchRules,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(pages::page_index))
        .route("/api/check-consent", post(routes::api_check_consent))
        .route("/api/rules", get(routes::api_rules))
        .route("/api/health", get(routes::api_health))
        .with_state(state)
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
}

/// Start the web server and run until Ctrl-C.
pub async fn serve(state: Arc<AppState>, host: &str, port: u16) -> std::io::Result<()> {
    let app = build_router(state);
    let addr = format!("{host}:{port}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("consent checker listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}
