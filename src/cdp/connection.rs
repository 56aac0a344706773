//! CDP WebSocket connection implementation
//!
//! This module provides WebSocket-based connection to Chrome DevTools Protocol.

use super::traits::{CdpConnection, CdpError as CdpErrorResponse, CdpEvent, CdpResponse};
use super::types::*;
use crate::Error;
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
type PendingMap = Arc<Mutex<HashMap<u64, PendingCommand>>>;
type Subscribers = Arc<Mutex<Vec<mpsc::UnboundedSender<CdpEvent>>>>;

/// CDP timeout configuration
#[derive(Debug, Clone)]
pub struct CdpTimeoutConfig {
    /// Default timeout for most commands (seconds)
    pub default_timeout_secs: u64,
    /// Timeout for screenshot commands (seconds)
    pub screenshot_timeout_secs: u64,
    /// Timeout for page navigation commands (seconds)
    pub navigation_timeout_secs: u64,
    /// Timeout for JavaScript execution (seconds)
    pub execution_timeout_secs: u64,
}

impl Default for CdpTimeoutConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 30,
            screenshot_timeout_secs: 90,
            navigation_timeout_secs: 60,
            execution_timeout_secs: 30,
        }
    }
}

impl CdpTimeoutConfig {
    /// Get timeout duration for a specific command method
    pub fn get_timeout_for_command(&self, method: &str) -> tokio::time::Duration {
        let method_lower = method.to_lowercase();

        if method_lower.contains("screenshot") || method_lower.contains("capture") {
            return tokio::time::Duration::from_secs(self.screenshot_timeout_secs);
        }

        // Page.navigate returns once the response starts; the load wait happens on events
        if method_lower.contains("navigate") || method_lower.contains("reload") {
            return tokio::time::Duration::from_secs(self.navigation_timeout_secs);
        }

        if method_lower.starts_with("runtime.evaluate") || method_lower.starts_with("runtime.call") {
            return tokio::time::Duration::from_secs(self.execution_timeout_secs);
        }

        tokio::time::Duration::from_secs(self.default_timeout_secs)
    }
}

/// WebSocket connection state
#[derive(Debug, Clone, Copy, PartialEq)]
enum ConnectionState {
    Connected,
    Closed,
}

/// Pending command response
#[derive(Debug)]
struct PendingCommand {
    /// Response channel sender
    sender: oneshot::Sender<CdpResponse>,
    /// Command method (for logging)
    method: String,
}

/// CDP WebSocket connection implementation
///
/// The socket is split: commands go through the locked sink, a spawned
/// reader task owns the stream and routes responses and events.
#[derive(Debug)]
pub struct CdpWebSocketConnection {
    /// WebSocket URL
    url: String,
    /// Write half
    sink: Mutex<SplitSink<WsStream, Message>>,
    /// Connection state
    state: RwLock<ConnectionState>,
    /// Next command ID
    next_id: AtomicU64,
    /// Pending commands (ID -> response sender)
    pending_commands: PendingMap,
    /// Event subscribers
    event_subscribers: Subscribers,
    /// Is connection active
    is_active: Arc<AtomicBool>,
    /// Timeout configuration
    timeout_config: CdpTimeoutConfig,
}

impl CdpWebSocketConnection {
    /// Create a new CDP WebSocket connection
    ///
    /// # Arguments
    /// * `url` - WebSocket URL (e.g., "ws://localhost:9222/devtools/browser/ABC123")
    pub async fn new<S: Into<String>>(url: S) -> Result<Arc<Self>, Error> {
        Self::with_timeouts(url, CdpTimeoutConfig::default()).await
    }

    /// Connect with explicit per-command timeouts
    pub async fn with_timeouts<S: Into<String>>(url: S, timeout_config: CdpTimeoutConfig) -> Result<Arc<Self>, Error> {
        let url = url.into();
        info!("Connecting to WebSocket: {}", url);

        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| Error::websocket(format!("Failed to connect: {}", e)))?;
        let (sink, stream) = ws_stream.split();

        let connection = Arc::new(Self {
            url,
            sink: Mutex::new(sink),
            state: RwLock::new(ConnectionState::Connected),
            next_id: AtomicU64::new(1),
            pending_commands: Arc::new(Mutex::new(HashMap::new())),
            event_subscribers: Arc::new(Mutex::new(Vec::new())),
            is_active: Arc::new(AtomicBool::new(true)),
            timeout_config,
        });
        info!("WebSocket connection established");

        let pending_commands = Arc::clone(&connection.pending_commands);
        let event_subscribers = Arc::clone(&connection.event_subscribers);
        let is_active = Arc::clone(&connection.is_active);
        tokio::spawn(async move {
            debug!("Message loop task started");
            if let Err(e) = Self::message_loop(stream, &pending_commands, &event_subscribers).await {
                error!("Message loop error: {}", e);
            }
            is_active.store(false, Ordering::SeqCst);
            // dropping the senders wakes every waiter with a closed channel
            pending_commands.lock().await.clear();
            event_subscribers.lock().await.clear();
            debug!("Message loop task exited");
        });

        Ok(connection)
    }

    /// WebSocket URL this connection was opened on
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Read until the socket closes
    async fn message_loop(
        mut stream: SplitStream<WsStream>,
        pending_commands: &PendingMap,
        event_subscribers: &Subscribers,
    ) -> Result<(), Error> {
        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Text(text)) => Self::handle_message(&text, pending_commands, event_subscribers).await,
                Ok(Message::Close(_)) => {
                    info!("WebSocket close frame received");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    let error_msg = e.to_string();
                    if error_msg.contains("Connection closed") || error_msg.contains("AlreadyClosed") {
                        warn!("WebSocket connection closed");
                        break;
                    }
                    return Err(Error::websocket(format!("WebSocket error: {}", e)));
                }
            }
        }
        Ok(())
    }

    /// Handle incoming WebSocket message
    async fn handle_message(text: &str, pending_commands: &PendingMap, event_subscribers: &Subscribers) {
        match serde_json::from_str::<CdpMessage>(text) {
            Ok(CdpMessage::Response(response)) => Self::handle_response(response, pending_commands).await,
            Ok(CdpMessage::Notification(notification)) => {
                Self::handle_notification(notification, event_subscribers).await
            }
            Err(_) => warn!("Unknown message format: {}", text),
        }
    }

    /// Handle CDP response
    async fn handle_response(response: CdpRpcResponse, pending_commands: &PendingMap) {
        let mut pending = pending_commands.lock().await;

        if let Some(pending_cmd) = pending.remove(&response.id) {
            debug!("Received response for command {}: {}", response.id, pending_cmd.method);

            let cdp_response = CdpResponse {
                id: response.id,
                result: Some(response.result),
                error: response.error.map(|e| CdpErrorResponse {
                    code: e.code,
                    message: e.message,
                    data: e.data,
                }),
            };

            let _ = pending_cmd.sender.send(cdp_response);
        } else {
            warn!("Received response for unknown command ID: {}", response.id);
        }
    }

    /// Handle CDP notification/event
    async fn handle_notification(notification: CdpNotification, event_subscribers: &Subscribers) {
        debug!("Received event: {}", notification.method);

        let event = CdpEvent {
            method: notification.method,
            params: notification.params,
            session_id: notification.session_id,
        };

        // Broadcast, dropping subscribers that went away
        let mut subscribers = event_subscribers.lock().await;
        subscribers.retain(|sender| sender.send(event.clone()).is_ok());
    }
}

#[async_trait]
impl CdpConnection for CdpWebSocketConnection {
    /// Send a CDP command and wait for response
    async fn send_command(
        &self,
        method: &str,
        params: serde_json::Value,
        session_id: Option<&str>,
    ) -> Result<CdpResponse, Error> {
        if !self.is_active.load(Ordering::SeqCst) {
            return Err(Error::websocket("Connection is not active"));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let request = CdpRequest {
            id,
            method: method.to_string(),
            params: if params.is_null() { None } else { Some(params) },
            session_id: session_id.map(str::to_string),
        };

        let json = serde_json::to_string(&request)
            .map_err(|e| Error::cdp(format!("Failed to serialize request: {}", e)))?;

        debug!("Sending CDP command {}: {}", id, method);

        let (sender, receiver) = oneshot::channel();
        self.pending_commands.lock().await.insert(
            id,
            PendingCommand {
                sender,
                method: method.to_string(),
            },
        );

        let sent = self.sink.lock().await.send(Message::Text(json)).await;
        if let Err(e) = sent {
            self.pending_commands.lock().await.remove(&id);
            return Err(Error::websocket(format!("Failed to send message: {}", e)));
        }

        let timeout_duration = self.timeout_config.get_timeout_for_command(method);

        match tokio::time::timeout(timeout_duration, receiver).await {
            Ok(Ok(response)) => {
                if let Some(error) = &response.error {
                    return Err(Error::cdp(format!(
                        "{}: {} (code: {})",
                        method, error.message, error.code
                    )));
                }
                Ok(response)
            }
            Ok(Err(_)) => Err(Error::websocket(format!(
                "Connection closed before command {} ({}) completed",
                id, method
            ))),
            Err(_) => {
                self.pending_commands.lock().await.remove(&id);
                Err(Error::timeout(format!(
                    "Command {} ({}) timed out after {:?}",
                    id, method, timeout_duration
                )))
            }
        }
    }

    /// Subscribe to CDP events
    async fn listen_events(&self) -> Result<mpsc::UnboundedReceiver<CdpEvent>, Error> {
        if !self.is_active.load(Ordering::SeqCst) {
            return Err(Error::websocket("Connection is not active"));
        }
        let (sender, receiver) = mpsc::unbounded_channel();
        self.event_subscribers.lock().await.push(sender);
        Ok(receiver)
    }

    /// Close the connection
    async fn close(&self) -> Result<(), Error> {
        info!("Closing CDP WebSocket connection");

        self.is_active.store(false, Ordering::SeqCst);
        let mut state = self.state.write().await;
        if *state == ConnectionState::Closed {
            return Ok(());
        }
        *state = ConnectionState::Closed;

        // the browser may already have dropped the socket
        if let Err(e) = self.sink.lock().await.close().await {
            debug!("WebSocket close: {}", e);
        }
        Ok(())
    }

    /// Check if connection is active
    fn is_active(&self) -> bool {
        self.is_active.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_selection() {
        let config = CdpTimeoutConfig::default();
        assert_eq!(config.get_timeout_for_command("Page.captureScreenshot").as_secs(), 90);
        assert_eq!(config.get_timeout_for_command("Page.navigate").as_secs(), 60);
        assert_eq!(config.get_timeout_for_command("Runtime.callFunctionOn").as_secs(), 30);
        assert_eq!(config.get_timeout_for_command("DOM.getBoxModel").as_secs(), 30);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let err = CdpWebSocketConnection::new("ws://127.0.0.1:1/devtools/browser/x").await.unwrap_err();
        assert!(matches!(err, Error::WebSocket(_)));
    }
}
