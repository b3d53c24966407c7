//! kira-whatsapp: WhatsApp session connector and chat commands
//!
//! ソケットブリッジ経由で WhatsApp セッションを 1 つ維持し、認証情報を保存します。
//! `ping` とペアリングのコマンドに応答します。

pub mod auth;
pub mod bridge;
pub mod dispatcher;
pub mod error;
pub mod session;
pub mod socket;
pub mod tasks;
pub mod types;
pub mod version;

pub use auth::{AuthState, AuthStore};
pub use bridge::{BridgeClient, BridgeSocketFactory};
pub use dispatcher::{Command, CommandDispatcher, DispatcherConfig};
pub use error::{Result, WhatsAppError};
pub use session::{ConnectorOptions, SessionManager, SessionStatus};
pub use socket::{Browser, MessageSender, SocketConnection, SocketFactory, SocketOptions, WaSocket};
pub use types::{ConnectionState, MessagesUpsert, SocketEvent};
