//! kira-api: HTTP control surface for the WhatsApp session
//!
//! Pairing, logout and status endpoints, built with axum.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;

pub use error::{ApiError, Result};
pub use server::{AppState, router, start_server};
