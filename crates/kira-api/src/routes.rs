//! Route definitions

use axum::{Router, routing::get};

use crate::handlers::{index, logout, pair, status};
use crate::server::AppState;

/// Create the API router
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/pair", get(pair))
        .route("/logout", get(logout))
        .route("/status", get(status))
}
