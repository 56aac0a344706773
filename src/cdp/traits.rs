//! CDP (Chrome DevTools Protocol) layer traits
//!
//! This module defines the abstract interfaces for CDP communication.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::types::{BoxModel, CallArgument, Clip, RemoteObject, TargetInfo};

/// CDP event representation
#[derive(Debug, Clone)]
pub struct CdpEvent {
    /// Event method (e.g., "Page.loadEventFired")
    pub method: String,
    /// Event parameters
    pub params: Value,
    /// Session ID (for multi-session targets)
    pub session_id: Option<String>,
}

/// CDP response representation
#[derive(Debug, Clone)]
pub struct CdpResponse {
    /// Response ID (matches request ID)
    pub id: u64,
    /// Response result
    pub result: Option<Value>,
    /// Error if any
    pub error: Option<CdpError>,
}

/// CDP error representation
#[derive(Debug, Clone)]
pub struct CdpError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Additional error data
    pub data: Option<Value>,
}

/// CDP connection trait
///
/// One WebSocket to the browser endpoint; target sessions are multiplexed on
/// it through `session_id`.
#[async_trait]
pub trait CdpConnection: Send + Sync + std::fmt::Debug {
    /// Send a CDP command and wait for response
    async fn send_command(
        &self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
    ) -> Result<CdpResponse, crate::Error>;

    /// Subscribe to every CDP event
    async fn listen_events(&self) -> Result<mpsc::UnboundedReceiver<CdpEvent>, crate::Error>;

    /// Close the connection
    async fn close(&self) -> Result<(), crate::Error>;

    /// Check if connection is active
    fn is_active(&self) -> bool;
}

/// CDP client trait
///
/// Typed access to one target session (or to the browser when unscoped).
#[async_trait]
pub trait CdpClient: Send + Sync + std::fmt::Debug {
    /// Get the underlying connection
    fn connection(&self) -> Arc<dyn CdpConnection>;

    /// Session this client is bound to
    fn session_id(&self) -> Option<&str>;

    /// Call a raw CDP method (returns JSON Value)
    async fn call_method(&self, method: &str, params: Value) -> Result<Value, crate::Error>;

    /// Enable a domain
    async fn enable_domain(&self, domain: &str) -> Result<(), crate::Error>;

    /// Evaluate an expression, optionally inside an execution context
    async fn evaluate(
        &self,
        expression: &str,
        context_id: Option<i64>,
        by_value: bool,
    ) -> Result<RemoteObject, crate::Error>;

    /// Call a function declaration with arguments (`this` is `object_id` when given)
    async fn call_function_on(
        &self,
        function: &str,
        object_id: Option<&str>,
        context_id: Option<i64>,
        args: Vec<CallArgument>,
        by_value: bool,
    ) -> Result<RemoteObject, crate::Error>;

    /// Handles of the indexed own properties of an array object, in order
    async fn array_items(&self, object_id: &str) -> Result<Vec<String>, crate::Error>;

    /// Drop a remote object handle
    async fn release_object(&self, object_id: &str) -> Result<(), crate::Error>;

    /// Box model of a node
    async fn box_model(&self, object_id: &str) -> Result<BoxModel, crate::Error>;

    /// Capture a PNG screenshot
    async fn screenshot(&self, clip: Option<Clip>) -> Result<Vec<u8>, crate::Error>;

    /// Subscribe to events of this session (`"*"` for all, or a domain prefix like `"Network."`)
    async fn subscribe_events(&self, event_type: &str) -> Result<mpsc::UnboundedReceiver<CdpEvent>, crate::Error>;
}

/// Browser version information
#[derive(Debug, Clone, Default)]
pub struct BrowserVersion {
    /// Protocol version
    pub protocol_version: String,
    /// Product name
    pub product: String,
    /// User agent
    pub user_agent: String,
    /// JavaScript engine version
    pub js_version: String,
}

/// CDP browser trait
///
/// Browser-level operations: contexts, targets and storage.
#[async_trait]
pub trait CdpBrowser: Send + Sync + std::fmt::Debug {
    /// Browser-level client (no session)
    fn client(&self) -> Arc<dyn CdpClient>;

    /// Get browser version
    async fn get_version(&self) -> Result<BrowserVersion, crate::Error>;

    /// Create an isolated browser context, returning its id
    async fn create_browser_context(&self) -> Result<String, crate::Error>;

    /// Dispose a browser context and its targets
    async fn dispose_browser_context(&self, context_id: &str) -> Result<(), crate::Error>;

    /// List all targets (pages, workers, etc.)
    async fn get_targets(&self) -> Result<Vec<TargetInfo>, crate::Error>;

    /// Create a new page target, returning its target id
    async fn create_target(&self, url: &str, context_id: Option<&str>) -> Result<String, crate::Error>;

    /// Attach to a target in flatten mode and return a client bound to the new session
    async fn attach(&self, target_id: &str) -> Result<Arc<dyn CdpClient>, crate::Error>;

    /// Close a target
    async fn close_target(&self, target_id: &str) -> Result<(), crate::Error>;

    /// Close the browser
    async fn close(&self) -> Result<(), crate::Error>;
}
