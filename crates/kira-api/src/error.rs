//! エラー型定義 (kira-api)

use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde_json::json;
use thiserror::Error;

const PAIR_EXAMPLE: &str = "/pair?code=1234567890";

/// kira-api のエラー型
///
/// 各バリアントは固定のステータスと JSON ボディに対応します。
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Phone number required")]
    PhoneNumberRequired,

    #[error("Invalid phone number format")]
    InvalidPhoneNumber,

    #[error("Bot not initialized. Please restart the bot.")]
    NotInitialized,

    #[error("Bot is already connected")]
    AlreadyConnected,

    #[error("Failed to generate pairing code: {0}")]
    PairingFailed(String),

    #[error("Phone number code required")]
    LogoutCodeRequired,

    #[error("Failed to logout: {0}")]
    LogoutFailed(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::PhoneNumberRequired
            | Self::InvalidPhoneNumber
            | Self::AlreadyConnected
            | Self::LogoutCodeRequired => StatusCode::BAD_REQUEST,
            Self::NotInitialized | Self::PairingFailed(_) | Self::LogoutFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn body(&self) -> serde_json::Value {
        match self {
            Self::PhoneNumberRequired => json!({
                "error": "Phone number required",
                "example": PAIR_EXAMPLE,
            }),
            Self::InvalidPhoneNumber => json!({
                "error": "Invalid phone number format",
                "message": "Phone number should contain only digits",
                "example": PAIR_EXAMPLE,
            }),
            Self::NotInitialized => json!({
                "error": "Bot not initialized. Please restart the bot.",
            }),
            Self::AlreadyConnected => json!({
                "error": "Bot is already connected",
                "message": "Use /logout first to disconnect",
            }),
            Self::PairingFailed(details) => json!({
                "error": "Failed to generate pairing code",
                "details": details,
                "tip": "Make sure the bot is not already connected. Try /logout first.",
            }),
            Self::LogoutCodeRequired => json!({
                "error": "Phone number code required",
            }),
            Self::LogoutFailed(details) => json!({
                "error": "Failed to logout",
                "details": details,
            }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

/// Result 型エイリアス
pub type Result<T> = std::result::Result<T, ApiError>;
