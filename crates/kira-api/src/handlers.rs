//! HTTP API handlers
//!
//! Status, pairing and logout endpoints over the shared session.

use axum::Json;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use kira_whatsapp::WhatsAppError;

use crate::error::{ApiError, Result};
use crate::server::AppState;

/// `?code=<phone number>`
#[derive(Debug, Default, Deserialize)]
pub struct CodeQuery {
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub status: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub connected: bool,
    #[serde(rename = "hasQR")]
    pub has_qr: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairResponse {
    pub success: bool,
    pub pairing_code: String,
    pub phone_number: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutResponse {
    pub success: bool,
    pub message: &'static str,
    pub auth_folder_deleted: bool,
}

/// Strip whitespace, `-` and `+`; `None` unless only digits remain
pub fn clean_phone_number(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '+')
        .collect();

    if !cleaned.is_empty() && cleaned.chars().all(|c| c.is_ascii_digit()) {
        Some(cleaned)
    } else {
        None
    }
}

fn linking_instructions(code: &str) -> String {
    format!(
        "Enter this code in WhatsApp:\n1. Open WhatsApp\n2. Go to Settings > Linked Devices\n3. Tap \"Link a Device\"\n4. Enter the code: {}",
        code
    )
}

pub async fn index(State(state): State<AppState>) -> Json<IndexResponse> {
    let connected = state.sessions.state().await.is_open();
    Json(IndexResponse {
        status: if connected { "connected" } else { "disconnected" },
        message: "WhatsApp Bot is running",
    })
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let status = state.sessions.status().await;
    Json(StatusResponse {
        connected: status.state.is_open(),
        has_qr: status.has_qr,
    })
}

/// Request a pairing code for the phone number in `code`
pub async fn pair(
    State(state): State<AppState>,
    Query(query): Query<CodeQuery>,
) -> Result<Json<PairResponse>> {
    let raw = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or(ApiError::PhoneNumberRequired)?;
    let phone_number = clean_phone_number(&raw).ok_or(ApiError::InvalidPhoneNumber)?;

    let session = state.sessions.status().await;
    if !session.has_session {
        return Err(ApiError::NotInitialized);
    }
    if session.state.is_open() {
        return Err(ApiError::AlreadyConnected);
    }

    let pairing_code = state
        .sessions
        .request_pairing_code(&phone_number)
        .await
        .map_err(|e| match e {
            WhatsAppError::NoSession => ApiError::NotInitialized,
            other => {
                error!("Pairing error: {}", other);
                ApiError::PairingFailed(other.to_string())
            }
        })?;

    info!("Pairing code issued for {}", phone_number);
    Ok(Json(PairResponse {
        success: true,
        message: linking_instructions(&pairing_code),
        pairing_code,
        phone_number,
    }))
}

/// Unlink the session and delete stored credentials.
///
/// `code` must be present but is not otherwise checked.
pub async fn logout(
    State(state): State<AppState>,
    Query(query): Query<CodeQuery>,
) -> Result<Json<LogoutResponse>> {
    if query.code.as_deref().is_none_or(str::is_empty) {
        return Err(ApiError::LogoutCodeRequired);
    }

    let deleted = state.sessions.disconnect().await.map_err(|e| {
        error!("Logout error: {}", e);
        ApiError::LogoutFailed(e.to_string())
    })?;

    Ok(Json(LogoutResponse {
        success: true,
        message: "Logged out successfully",
        auth_folder_deleted: deleted,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_phone_number() {
        assert_eq!(clean_phone_number("1234567890").as_deref(), Some("1234567890"));
        assert_eq!(
            clean_phone_number("+91 98765-43210").as_deref(),
            Some("919876543210")
        );
        assert_eq!(clean_phone_number("12ab34"), None);
        assert_eq!(clean_phone_number("+ -"), None);
        assert_eq!(clean_phone_number("１２３"), None);
    }

    #[test]
    fn test_linking_instructions_end_with_code() {
        let message = linking_instructions("ABCD-1234");
        assert!(message.starts_with("Enter this code in WhatsApp:\n1. Open WhatsApp"));
        assert!(message.contains("3. Tap \"Link a Device\""));
        assert!(message.ends_with("4. Enter the code: ABCD-1234"));
    }
}
