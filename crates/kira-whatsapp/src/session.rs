//! Session connector
//!
//! Owns the single WhatsApp session: opens sockets from stored credentials,
//! persists credential updates, reconnects after transient closes and feeds
//! live message batches to the dispatcher.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use kira_core::WhatsAppConfig;

use crate::auth::AuthStore;
use crate::error::{Result, WhatsAppError};
use crate::socket::{Browser, MessageSender, SocketFactory, SocketOptions, WaSocket};
use crate::tasks::DeferredTask;
use crate::types::{
    ConnectionPhase, ConnectionState, ConnectionUpdate, MessagesUpsert, SocketEvent,
};
use crate::version::{DEFAULT_VERSION, fetch_latest_version};

/// Connector settings
#[derive(Debug, Clone)]
pub struct ConnectorOptions {
    /// Credential storage directory
    pub auth_dir: PathBuf,
    /// Latest-version document; `None` uses the bundled version
    pub version_url: Option<String>,
    pub browser: Browser,
    pub reconnect_delay: Duration,
}

impl ConnectorOptions {
    pub fn new(auth_dir: impl Into<PathBuf>) -> Self {
        Self {
            auth_dir: auth_dir.into(),
            version_url: None,
            browser: Browser::ubuntu("Firefox"),
            reconnect_delay: Duration::from_secs(3),
        }
    }
}

impl From<&WhatsAppConfig> for ConnectorOptions {
    fn from(config: &WhatsAppConfig) -> Self {
        Self {
            auth_dir: PathBuf::from(&config.auth_dir),
            version_url: config.version_url.clone(),
            browser: Browser::ubuntu(&config.browser),
            reconnect_delay: Duration::from_secs(config.reconnect_delay_secs),
        }
    }
}

/// Snapshot of the session for status reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub state: ConnectionState,
    pub has_session: bool,
    pub has_qr: bool,
}

/// Socket handle and connection state, kept together so they always agree:
/// `Open` implies a socket, no socket implies `Disconnected`.
#[derive(Default)]
struct SessionSlot {
    socket: Option<Arc<dyn WaSocket>>,
    state: ConnectionState,
    qr: Option<String>,
    /// Bumped whenever the socket is replaced or cleared; events from older
    /// generations are ignored.
    generation: u64,
    pump: Option<JoinHandle<()>>,
}

/// The process-wide WhatsApp session
pub struct SessionManager {
    factory: Arc<dyn SocketFactory>,
    auth: AuthStore,
    options: ConnectorOptions,
    http: reqwest::Client,
    slot: RwLock<SessionSlot>,
    inbound: mpsc::Sender<MessagesUpsert>,
    reconnect: Mutex<Option<DeferredTask>>,
}

impl SessionManager {
    /// `inbound` receives every message batch the socket reports
    pub fn new(
        factory: Arc<dyn SocketFactory>,
        options: ConnectorOptions,
        inbound: mpsc::Sender<MessagesUpsert>,
    ) -> Arc<Self> {
        Arc::new(Self {
            factory,
            auth: AuthStore::new(options.auth_dir.clone()),
            options,
            http: reqwest::Client::new(),
            slot: RwLock::new(SessionSlot::default()),
            inbound,
            reconnect: Mutex::new(None),
        })
    }

    pub fn auth_store(&self) -> &AuthStore {
        &self.auth
    }

    pub async fn state(&self) -> ConnectionState {
        self.slot.read().await.state
    }

    pub async fn status(&self) -> SessionStatus {
        let slot = self.slot.read().await;
        SessionStatus {
            state: slot.state,
            has_session: slot.socket.is_some(),
            has_qr: slot.qr.is_some(),
        }
    }

    /// The current socket, if one has been opened and not logged out
    pub async fn socket(&self) -> Option<Arc<dyn WaSocket>> {
        self.slot.read().await.socket.clone()
    }

    /// Open a socket with the stored credentials and start consuming its events.
    ///
    /// Replaces any previous socket. Also invoked by the reconnect timer.
    pub fn connect(self: &Arc<Self>) -> BoxFuture<'static, Result<()>> {
        let manager = Arc::clone(self);
        Box::pin(async move { manager.open_socket().await })
    }

    /// Connect, and keep retrying every `reconnect_delay` if that fails.
    ///
    /// Used at startup; `disconnect()` and `shutdown()` stop the retries.
    pub async fn start(self: &Arc<Self>) {
        if let Err(e) = self.connect().await {
            error!("Failed to start WhatsApp session: {}", e);
            self.schedule_reconnect();
        }
    }

    async fn open_socket(self: Arc<Self>) -> Result<()> {
        let started = self.slot.read().await.generation;
        let auth = self.auth.load().await?;

        let version = match &self.options.version_url {
            Some(url) => {
                let info = fetch_latest_version(&self.http, url).await;
                info!("Using WA v{}, isLatest: {}", info.version, info.is_latest);
                info.version
            }
            None => DEFAULT_VERSION,
        };

        let connection = self
            .factory
            .open(SocketOptions {
                version,
                browser: self.options.browser.clone(),
                auth,
            })
            .await?;

        let mut slot = self.slot.write().await;
        if slot.generation != started && slot.socket.is_none() {
            // logged out while the socket was opening
            drop(slot);
            info!("Session was logged out during connect, closing new socket");
            if let Err(e) = connection.socket.logout().await {
                warn!("Failed to close abandoned socket: {}", e);
            }
            return Ok(());
        }
        slot.generation += 1;
        let generation = slot.generation;
        if let Some(previous) = slot.pump.take() {
            previous.abort();
        }
        slot.socket = Some(connection.socket);
        slot.state = ConnectionState::Connecting;
        slot.qr = None;
        slot.pump = Some(tokio::spawn(
            Arc::clone(&self).pump(generation, connection.events),
        ));

        debug!("Socket generation {} opened", generation);
        Ok(())
    }

    /// Request a pairing code for `phone_number` from the current socket
    pub async fn request_pairing_code(&self, phone_number: &str) -> Result<String> {
        let socket = self.socket().await.ok_or(WhatsAppError::NoSession)?;
        socket.request_pairing_code(phone_number).await
    }

    /// Log out of the current socket (if any), clear the session and delete
    /// the credential directory.
    ///
    /// Returns whether a credential directory was found and removed. A failed
    /// logout leaves everything untouched.
    pub async fn disconnect(&self) -> Result<bool> {
        if let Some(socket) = self.socket().await {
            socket.logout().await?;
        }

        self.cancel_reconnect();

        {
            let mut slot = self.slot.write().await;
            slot.generation += 1;
            slot.socket = None;
            slot.state = ConnectionState::Disconnected;
            slot.qr = None;
            if let Some(pump) = slot.pump.take() {
                pump.abort();
            }
        }

        let deleted = match self.auth.delete().await {
            Ok(deleted) => deleted,
            Err(e) => {
                error!("Error deleting auth folder: {}", e);
                false
            }
        };

        info!("Session logged out (auth folder deleted: {})", deleted);
        Ok(deleted)
    }

    /// Stop the event pump and any pending reconnect
    pub async fn shutdown(&self) {
        self.cancel_reconnect();
        if let Some(pump) = self.slot.write().await.pump.take() {
            pump.abort();
        }
    }

    fn cancel_reconnect(&self) {
        let mut pending = self.reconnect.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(task) = pending.take() {
            task.cancel();
        }
    }

    /// Reconnect after `reconnect_delay`, retrying at the same interval until
    /// a socket opens. Each attempt runs in its own task so cancelling the
    /// retries never interrupts a half-opened socket.
    fn schedule_reconnect(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        let delay = self.options.reconnect_delay;
        let task = DeferredTask::schedule(delay, async move {
            loop {
                info!("Reconnecting...");
                let result = match tokio::spawn(manager.connect()).await {
                    Ok(result) => result,
                    Err(e) => {
                        error!("Reconnect task failed: {}", e);
                        return;
                    }
                };
                match result {
                    Ok(()) => return,
                    Err(e) => {
                        error!("Reconnect failed, retrying in {}s: {}", delay.as_secs_f32(), e);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        });

        let mut pending = self.reconnect.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = pending.replace(task) {
            if !previous.is_finished() {
                previous.cancel();
            }
        }
    }

    async fn is_current(&self, generation: u64) -> bool {
        self.slot.read().await.generation == generation
    }

    async fn pump(self: Arc<Self>, generation: u64, mut events: mpsc::Receiver<SocketEvent>) {
        while let Some(event) = events.recv().await {
            if !self.is_current(generation).await {
                debug!("Dropping {} from superseded socket", event.name());
                break;
            }
            self.handle_event(generation, event).await;
        }
        debug!("Event stream for socket generation {} ended", generation);
    }

    async fn handle_event(self: &Arc<Self>, generation: u64, event: SocketEvent) {
        match event {
            SocketEvent::CredsUpdate(update) => {
                // persisted before the next event is looked at
                if let Err(e) = self.auth.save(&update).await {
                    error!("Failed to persist credentials: {}", e);
                }
            }
            SocketEvent::ConnectionUpdate(update) => {
                self.handle_connection_update(generation, update).await;
            }
            SocketEvent::MessagesUpsert(upsert) => {
                if self.inbound.send(upsert).await.is_err() {
                    warn!("Dispatcher is gone, dropping message batch");
                }
            }
        }
    }

    async fn handle_connection_update(self: &Arc<Self>, generation: u64, update: ConnectionUpdate) {
        let mut slot = self.slot.write().await;
        if slot.generation != generation {
            return;
        }

        if let Some(qr) = &update.qr {
            info!("QR code available for linking");
            slot.qr = Some(qr.clone());
        }

        match update.connection {
            Some(ConnectionPhase::Close) => {
                slot.state = ConnectionState::Disconnected;
                drop(slot);

                let reason = update.disconnect_reason();
                let message = update
                    .last_disconnect
                    .as_ref()
                    .and_then(|d| d.message.as_deref())
                    .unwrap_or("");
                info!("Connection closed. Reason: {:?} {}", reason, message);

                if reason.should_reconnect() {
                    info!(
                        "Reconnecting in {}s",
                        self.options.reconnect_delay.as_secs_f32()
                    );
                    self.schedule_reconnect();
                } else {
                    info!("Logged out, not reconnecting");
                }
            }
            Some(ConnectionPhase::Open) => {
                slot.state = ConnectionState::Open;
                slot.qr = None;
                info!("Connected to WhatsApp");
            }
            Some(ConnectionPhase::Connecting) => {
                slot.state = ConnectionState::Connecting;
            }
            None => {}
        }
    }
}

#[async_trait]
impl MessageSender for SessionManager {
    async fn send_text(&self, jid: &str, text: &str) -> Result<()> {
        let socket = self.socket().await.ok_or(WhatsAppError::NoSession)?;
        socket.send_text(jid, text).await
    }
}
