//! WhatsApp wire types
//!
//! Event payloads mirror the shapes emitted by the socket library
//! (`creds.update`, `connection.update`, `messages.upsert`).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Suffix of one-to-one chat identifiers
pub const USER_SUFFIX: &str = "@s.whatsapp.net";
/// Suffix of group chat identifiers
pub const GROUP_SUFFIX: &str = "@g.us";
/// Suffix of channel (newsletter) identifiers
pub const NEWSLETTER_SUFFIX: &str = "@newsletter";
/// Suffix of broadcast lists and status updates
pub const BROADCAST_SUFFIX: &str = "@broadcast";

pub fn is_group(jid: &str) -> bool {
    jid.ends_with(GROUP_SUFFIX)
}

/// Channels and broadcast lists
pub fn is_broadcast(jid: &str) -> bool {
    jid.ends_with(NEWSLETTER_SUFFIX) || jid.ends_with(BROADCAST_SUFFIX)
}

/// Phone number part of a user JID (`1234@s.whatsapp.net` -> `1234`).
/// Identifiers without the user suffix are returned unchanged.
pub fn phone_number(jid: &str) -> String {
    jid.replacen(USER_SUFFIX, "", 1)
}

/// Connection state as observed by the connector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Open,
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

/// Why the network closed the connection (status codes of the socket library)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    ConnectionClosed,
    /// Also reported for timeouts
    ConnectionLost,
    ConnectionReplaced,
    LoggedOut,
    MultideviceMismatch,
    Forbidden,
    BadSession,
    UnavailableService,
    RestartRequired,
    Other(u16),
    Unknown,
}

impl DisconnectReason {
    pub fn from_status_code(code: Option<u16>) -> Self {
        match code {
            Some(428) => Self::ConnectionClosed,
            Some(408) => Self::ConnectionLost,
            Some(440) => Self::ConnectionReplaced,
            Some(401) => Self::LoggedOut,
            Some(411) => Self::MultideviceMismatch,
            Some(403) => Self::Forbidden,
            Some(500) => Self::BadSession,
            Some(503) => Self::UnavailableService,
            Some(515) => Self::RestartRequired,
            Some(other) => Self::Other(other),
            None => Self::Unknown,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ConnectionClosed => Some(428),
            Self::ConnectionLost => Some(408),
            Self::ConnectionReplaced => Some(440),
            Self::LoggedOut => Some(401),
            Self::MultideviceMismatch => Some(411),
            Self::Forbidden => Some(403),
            Self::BadSession => Some(500),
            Self::UnavailableService => Some(503),
            Self::RestartRequired => Some(515),
            Self::Other(code) => Some(*code),
            Self::Unknown => None,
        }
    }

    /// Only an explicit logout ends the session for good
    pub fn should_reconnect(&self) -> bool {
        !matches!(self, Self::LoggedOut)
    }
}

/// Signal key writes: `type -> id -> value`, `None` deletes the key
pub type KeyUpdates = HashMap<String, HashMap<String, Option<Value>>>;

/// Payload of `creds.update`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialUpdate {
    /// Full credential document after the update
    #[serde(default)]
    pub creds: Option<Value>,
    #[serde(default)]
    pub keys: KeyUpdates,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionPhase {
    Connecting,
    Open,
    Close,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastDisconnect {
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Payload of `connection.update`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionUpdate {
    #[serde(default)]
    pub connection: Option<ConnectionPhase>,
    #[serde(default)]
    pub last_disconnect: Option<LastDisconnect>,
    #[serde(default)]
    pub qr: Option<String>,
}

impl ConnectionUpdate {
    pub fn disconnect_reason(&self) -> DisconnectReason {
        DisconnectReason::from_status_code(
            self.last_disconnect.as_ref().and_then(|d| d.status_code),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertKind {
    /// Live messages
    Notify,
    /// History sync and own-device echoes
    Append,
    #[serde(other)]
    Other,
}

/// Payload of `messages.upsert`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesUpsert {
    pub messages: Vec<WebMessage>,
    #[serde(rename = "type")]
    pub kind: UpsertKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageKey {
    pub remote_jid: String,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtendedTextMessage {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContent {
    #[serde(default)]
    pub conversation: Option<String>,
    #[serde(default)]
    pub extended_text_message: Option<ExtendedTextMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebMessage {
    pub key: MessageKey,
    /// Absent for protocol/stub messages
    #[serde(default)]
    pub message: Option<MessageContent>,
    #[serde(default)]
    pub push_name: Option<String>,
}

impl WebMessage {
    /// Plain text body: `conversation`, else the extended text, else empty
    pub fn text(&self) -> &str {
        let Some(content) = &self.message else {
            return "";
        };
        content
            .conversation
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| {
                content
                    .extended_text_message
                    .as_ref()
                    .and_then(|e| e.text.as_deref())
            })
            .unwrap_or("")
    }

    pub fn remote_jid(&self) -> &str {
        &self.key.remote_jid
    }
}

/// Events produced by an open socket
#[derive(Debug, Clone)]
pub enum SocketEvent {
    CredsUpdate(CredentialUpdate),
    ConnectionUpdate(ConnectionUpdate),
    MessagesUpsert(MessagesUpsert),
}

impl SocketEvent {
    /// Build an event from its library name and JSON payload.
    /// Events the connector does not consume yield `None`.
    pub fn from_parts(name: &str, data: Value) -> Result<Option<Self>> {
        let event = match name {
            "creds.update" => Self::CredsUpdate(serde_json::from_value(data)?),
            "connection.update" => Self::ConnectionUpdate(serde_json::from_value(data)?),
            "messages.upsert" => Self::MessagesUpsert(serde_json::from_value(data)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CredsUpdate(_) => "creds.update",
            Self::ConnectionUpdate(_) => "connection.update",
            Self::MessagesUpsert(_) => "messages.upsert",
        }
    }

    pub fn is_close(&self) -> bool {
        matches!(
            self,
            Self::ConnectionUpdate(ConnectionUpdate {
                connection: Some(ConnectionPhase::Close),
                ..
            })
        )
    }
}
