//! Socket bridge REST client
//!
//! Talks to the sidecar that hosts the protocol library. Each open socket
//! gets an id on the bridge; its events are polled and forwarded in order.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use kira_core::WhatsAppConfig;

use crate::auth::KeyStore;
use crate::error::{Result, WhatsAppError};
use crate::socket::{Browser, SocketConnection, SocketFactory, SocketOptions, WaSocket};
use crate::types::{ConnectionPhase, ConnectionUpdate, DisconnectReason, LastDisconnect, SocketEvent};
use crate::version::ProtocolVersion;

/// Consecutive failed polls before the socket is reported closed
const MAX_POLL_FAILURES: u32 = 5;

const EVENT_BUFFER: usize = 64;

#[derive(Serialize)]
struct OpenSocketRequest<'a> {
    version: ProtocolVersion,
    browser: &'a Browser,
    creds: Option<&'a Value>,
    keys: &'a KeyStore,
}

#[derive(Deserialize)]
struct OpenSocketResponse {
    id: String,
}

/// One event as queued by the bridge
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeEvent {
    pub seq: u64,
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Deserialize)]
struct EventsResponse {
    #[serde(default)]
    events: Vec<BridgeEvent>,
}

#[derive(Deserialize)]
struct PairingCodeResponse {
    code: String,
}

/// Bridge REST API client
#[derive(Clone)]
pub struct BridgeClient {
    client: Client,
    base_url: String,
}

impl BridgeClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Open a socket and return its bridge id
    pub async fn open_socket(&self, options: &SocketOptions) -> Result<String> {
        let url = format!("{}/v1/sockets", self.base_url);
        let body = OpenSocketRequest {
            version: options.version,
            browser: &options.browser,
            creds: options.auth.creds.as_ref(),
            keys: &options.auth.keys,
        };

        debug!("Opening socket with WA v{}", options.version);

        let response = self.client.post(&url).json(&body).send().await?;
        let response = check_status(response, "Open socket").await?;

        let opened: OpenSocketResponse = response
            .json()
            .await
            .map_err(|e| WhatsAppError::InvalidPayload(e.to_string()))?;

        info!("Bridge socket {} opened", opened.id);
        Ok(opened.id)
    }

    /// Events with a sequence number greater than `after`
    pub async fn poll_events(&self, id: &str, after: u64) -> Result<Vec<BridgeEvent>> {
        let url = format!("{}/v1/sockets/{}/events?after={}", self.base_url, id, after);

        let response = self.client.get(&url).send().await?;
        let response = check_status(response, "Poll events").await?;

        let events: EventsResponse = response
            .json()
            .await
            .map_err(|e| WhatsAppError::InvalidPayload(e.to_string()))?;

        Ok(events.events)
    }

    pub async fn send_text(&self, id: &str, jid: &str, text: &str) -> Result<()> {
        let url = format!("{}/v1/sockets/{}/messages", self.base_url, id);
        let body = serde_json::json!({
            "jid": jid,
            "text": text,
        });

        debug!("Sending message to {}", jid);

        let response = self.client.post(&url).json(&body).send().await?;
        check_status(response, "Send message").await?;
        Ok(())
    }

    pub async fn request_pairing_code(&self, id: &str, phone_number: &str) -> Result<String> {
        let url = format!("{}/v1/sockets/{}/pairing-code", self.base_url, id);
        let body = serde_json::json!({ "phoneNumber": phone_number });

        let response = self.client.post(&url).json(&body).send().await?;
        let response = check_status(response, "Request pairing code").await?;

        let pairing: PairingCodeResponse = response
            .json()
            .await
            .map_err(|e| WhatsAppError::InvalidPayload(e.to_string()))?;

        info!("Pairing code generated for {}", phone_number);
        Ok(pairing.code)
    }

    pub async fn logout(&self, id: &str) -> Result<()> {
        let url = format!("{}/v1/sockets/{}/logout", self.base_url, id);

        let response = self.client.post(&url).send().await?;
        check_status(response, "Logout").await?;

        info!("Bridge socket {} logged out", id);
        Ok(())
    }
}

async fn check_status(response: Response, action: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_text = response.text().await.unwrap_or_default();
    error!("{} failed: {} - {}", action, status, error_text);
    Err(WhatsAppError::Api(format!("{}: {}", status, error_text)))
}

/// A socket living on the bridge
pub struct BridgeSocket {
    client: BridgeClient,
    id: String,
}

impl BridgeSocket {
    pub fn id(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl WaSocket for BridgeSocket {
    async fn send_text(&self, jid: &str, text: &str) -> Result<()> {
        self.client.send_text(&self.id, jid, text).await
    }

    async fn request_pairing_code(&self, phone_number: &str) -> Result<String> {
        self.client.request_pairing_code(&self.id, phone_number).await
    }

    async fn logout(&self) -> Result<()> {
        self.client.logout(&self.id).await
    }
}

/// Opens sockets on the bridge and polls their events
pub struct BridgeSocketFactory {
    client: BridgeClient,
    poll_interval: Duration,
}

impl BridgeSocketFactory {
    pub fn new(client: BridgeClient, poll_interval: Duration) -> Self {
        Self {
            client,
            poll_interval,
        }
    }

    pub fn from_config(config: &WhatsAppConfig) -> Result<Self> {
        Ok(Self::new(
            BridgeClient::new(&config.bridge_url)?,
            Duration::from_millis(config.poll_interval_ms),
        ))
    }
}

#[async_trait]
impl SocketFactory for BridgeSocketFactory {
    async fn open(&self, options: SocketOptions) -> Result<SocketConnection> {
        let id = self.client.open_socket(&options).await?;
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        tokio::spawn(poll_loop(
            self.client.clone(),
            id.clone(),
            self.poll_interval,
            tx,
        ));

        Ok(SocketConnection {
            socket: Arc::new(BridgeSocket {
                client: self.client.clone(),
                id,
            }),
            events: rx,
        })
    }
}

/// Forward bridge events until the socket closes or the receiver goes away
async fn poll_loop(
    client: BridgeClient,
    id: String,
    interval: Duration,
    tx: mpsc::Sender<SocketEvent>,
) {
    let mut after = 0;
    let mut failures = 0;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if tx.is_closed() {
            debug!("Event receiver for socket {} dropped", id);
            return;
        }

        let events = match client.poll_events(&id, after).await {
            Ok(events) => {
                failures = 0;
                events
            }
            Err(e) => {
                failures += 1;
                warn!(
                    "Polling socket {} failed ({}/{}): {}",
                    id, failures, MAX_POLL_FAILURES, e
                );
                if failures >= MAX_POLL_FAILURES {
                    let _ = tx.send(connection_lost(&e)).await;
                    return;
                }
                continue;
            }
        };

        for envelope in events {
            after = after.max(envelope.seq);
            match SocketEvent::from_parts(&envelope.event, envelope.data) {
                Ok(Some(event)) => {
                    let closing = event.is_close();
                    if tx.send(event).await.is_err() {
                        return;
                    }
                    if closing {
                        debug!("Socket {} closed, stopping poll", id);
                        return;
                    }
                }
                Ok(None) => debug!("Ignoring bridge event {}", envelope.event),
                Err(e) => warn!("Malformed {} event from bridge: {}", envelope.event, e),
            }
        }
    }
}

fn connection_lost(cause: &WhatsAppError) -> SocketEvent {
    SocketEvent::ConnectionUpdate(ConnectionUpdate {
        connection: Some(ConnectionPhase::Close),
        last_disconnect: Some(LastDisconnect {
            status_code: DisconnectReason::ConnectionLost.status_code(),
            message: Some(cause.to_string()),
        }),
        qr: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthState;
    use crate::types::UpsertKind;
    use crate::version::DEFAULT_VERSION;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options() -> SocketOptions {
        SocketOptions {
            version: DEFAULT_VERSION,
            browser: Browser::ubuntu("Firefox"),
            auth: AuthState::default(),
        }
    }

    async fn mount_open(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/v1/sockets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "s1"})))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_open_socket_sends_options() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/sockets"))
            .and(body_json(json!({
                "version": [2, 3000, 1_015_901_307u32],
                "browser": ["Ubuntu", "Firefox", "22.04.4"],
                "creds": null,
                "keys": {}
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "abc"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = BridgeClient::new(&format!("{}/", server.uri())).unwrap();
        assert_eq!(client.open_socket(&options()).await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_request_pairing_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/sockets/s1/pairing-code"))
            .and(body_json(json!({"phoneNumber": "1234567890"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": "ABCD-1234"})))
            .mount(&server)
            .await;

        let client = BridgeClient::new(&server.uri()).unwrap();
        let code = client.request_pairing_code("s1", "1234567890").await.unwrap();
        assert_eq!(code, "ABCD-1234");
    }

    #[tokio::test]
    async fn test_error_status_maps_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/sockets/s1/messages"))
            .respond_with(ResponseTemplate::new(500).set_body_string("socket closed"))
            .mount(&server)
            .await;

        let client = BridgeClient::new(&server.uri()).unwrap();
        let err = client
            .send_text("s1", "1@s.whatsapp.net", "hi")
            .await
            .unwrap_err();
        match err {
            WhatsAppError::Api(msg) => assert!(msg.contains("socket closed")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_socket_forwards_events_until_close() {
        let server = MockServer::start().await;
        mount_open(&server).await;
        Mock::given(method("GET"))
            .and(path("/v1/sockets/s1/events"))
            .and(query_param("after", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "events": [
                    {"seq": 1, "event": "connection.update", "data": {"connection": "open"}},
                    {"seq": 2, "event": "presence.update", "data": {}},
                    {"seq": 3, "event": "messages.upsert", "data": {"type": "notify", "messages": []}}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/sockets/s1/events"))
            .and(query_param("after", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "events": [
                    {"seq": 4, "event": "connection.update",
                     "data": {"connection": "close", "lastDisconnect": {"statusCode": 428}}}
                ]
            })))
            .mount(&server)
            .await;

        let factory = BridgeSocketFactory::new(
            BridgeClient::new(&server.uri()).unwrap(),
            Duration::from_millis(10),
        );
        let mut connection = factory.open(options()).await.unwrap();

        let first = connection.events.recv().await.unwrap();
        assert!(matches!(
            first,
            SocketEvent::ConnectionUpdate(ConnectionUpdate {
                connection: Some(ConnectionPhase::Open),
                ..
            })
        ));

        match connection.events.recv().await.unwrap() {
            SocketEvent::MessagesUpsert(upsert) => assert_eq!(upsert.kind, UpsertKind::Notify),
            other => panic!("unexpected event: {}", other.name()),
        }

        let last = connection.events.recv().await.unwrap();
        assert!(last.is_close());
        if let SocketEvent::ConnectionUpdate(update) = last {
            assert_eq!(update.disconnect_reason(), DisconnectReason::ConnectionClosed);
        }

        // polling stops after close
        assert!(connection.events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_bridge_reports_connection_lost() {
        let server = MockServer::start().await;
        mount_open(&server).await;
        Mock::given(method("GET"))
            .and(path("/v1/sockets/s1/events"))
            .respond_with(ResponseTemplate::new(502))
            .expect(5)
            .mount(&server)
            .await;

        let factory = BridgeSocketFactory::new(
            BridgeClient::new(&server.uri()).unwrap(),
            Duration::from_millis(5),
        );
        let mut connection = factory.open(options()).await.unwrap();

        match connection.events.recv().await.unwrap() {
            SocketEvent::ConnectionUpdate(update) => {
                assert_eq!(update.disconnect_reason(), DisconnectReason::ConnectionLost);
                assert!(update.disconnect_reason().should_reconnect());
            }
            other => panic!("unexpected event: {}", other.name()),
        }
        assert!(connection.events.recv().await.is_none());
    }
}
