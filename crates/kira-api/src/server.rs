//! HTTP API Server
//!
//! Starts and manages the axum-based control server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use kira_core::ApiConfig;
use kira_whatsapp::SessionManager;

use crate::routes::routes;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
}

/// Build the router with CORS and request tracing
pub fn router(state: AppState) -> Router {
    Router::new().merge(routes()).with_state(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}

/// Start the control API server
pub async fn start_server(config: &ApiConfig, sessions: Arc<SessionManager>) -> anyhow::Result<()> {
    let app = router(AppState { sessions });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Server running on port {}", config.port);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
