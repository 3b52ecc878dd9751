//! HTTP surface of the site
//!
//! Every route, including the fallback page, runs behind the kill switch gate.
//! The gate lets its own diagnostic endpoints and static assets through.

pub mod gate;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::{middleware, Router};

use crate::cli::ServerConfig;
use crate::killswitch::StatusProvider;

/// State shared by the gate and all handlers
#[derive(Clone)]
pub struct AppState {
    /// Source of the kill switch status
    pub status: Arc<dyn StatusProvider>,
    /// URL of the flag document
    pub source_url: String,
    /// Whether `source_url` came from configuration rather than the default
    pub source_overridden: bool,
    /// Deployment environment name reported by `/api/test`
    pub environment: String,
    /// Token required by the cache-clearing endpoint; the route is absent without one
    pub admin_token: Option<String>,
}

impl AppState {
    /// Builds state from validated server configuration
    pub fn from_config(status: Arc<dyn StatusProvider>, config: &ServerConfig) -> Self {
        Self {
            status,
            source_url: config.manager.source_url.clone(),
            source_overridden: config.source_overridden,
            environment: config.environment.clone(),
            admin_token: config.admin_token.clone(),
        }
    }
}

/// Builds the application router with the kill switch gate applied
pub fn router(state: AppState) -> Router {
    let mut app: Router<AppState> = Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/kill-switch-status", get(routes::kill_switch_status))
        .route("/api/test-kill-switch", get(routes::test_kill_switch))
        .route("/api/test", get(routes::api_test));

    if state.admin_token.is_some() {
        app = app.route("/api/kill-switch-status/clear", post(routes::clear_cache));
    }

    app.fallback(routes::page)
        .layer(middleware::from_fn_with_state(state.clone(), gate::kill_switch_gate))
        .with_state(state)
}

/// Serves the site on `addr` until Ctrl-C
///
/// # Errors
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "BessZone listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
