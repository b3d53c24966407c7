//! Socket abstraction
//!
//! The protocol library lives behind these traits. A factory opens a socket
//! from stored credentials and hands back its event stream.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::auth::AuthState;
use crate::error::Result;
use crate::types::SocketEvent;
use crate::version::ProtocolVersion;

/// Browser description announced to the network: `[platform, name, version]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Browser(pub String, pub String, pub String);

impl Browser {
    pub fn ubuntu(name: &str) -> Self {
        Self("Ubuntu".to_string(), name.to_string(), "22.04.4".to_string())
    }
}

/// Everything needed to open a socket
#[derive(Debug, Clone)]
pub struct SocketOptions {
    pub version: ProtocolVersion,
    pub browser: Browser,
    pub auth: AuthState,
}

/// An open socket plus its event stream
pub struct SocketConnection {
    pub socket: Arc<dyn WaSocket>,
    pub events: mpsc::Receiver<SocketEvent>,
}

/// Live connection to the messaging network
#[async_trait]
pub trait WaSocket: Send + Sync {
    /// Send a plain text message to a chat
    async fn send_text(&self, jid: &str, text: &str) -> Result<()>;

    /// Ask for a code that links a phone number without scanning a QR
    async fn request_pairing_code(&self, phone_number: &str) -> Result<String>;

    /// Unlink this device
    async fn logout(&self) -> Result<()>;
}

/// Opens sockets
#[async_trait]
pub trait SocketFactory: Send + Sync {
    async fn open(&self, options: SocketOptions) -> Result<SocketConnection>;
}

/// Outbound text messages through whatever socket is current
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_text(&self, jid: &str, text: &str) -> Result<()>;
}
