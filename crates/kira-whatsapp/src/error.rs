//! エラー型定義 (kira-whatsapp)

use thiserror::Error;

/// kira-whatsapp のエラー型
#[derive(Error, Debug)]
pub enum WhatsAppError {
    #[error("Bridge API error: {0}")]
    Api(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Bot not initialized")]
    NoSession,

    #[error("Auth state error: {0}")]
    AuthState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for WhatsAppError {
    fn from(err: reqwest::Error) -> Self {
        WhatsAppError::Http(err.to_string())
    }
}

/// Result 型エイリアス
pub type Result<T> = std::result::Result<T, WhatsAppError>;
