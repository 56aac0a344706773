//! CDP browser control implementation
//!
//! This module provides browser-level operations via CDP.

use super::client::CdpClientImpl;
use super::connection::CdpWebSocketConnection;
use super::traits::*;
use super::types::TargetInfo;
use crate::Error;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Resolve an endpoint to the browser WebSocket URL.
///
/// `ws://`/`wss://` URLs are used as is; `http://host:port` is asked for
/// `/json/version`.
pub async fn discover_ws_url(endpoint: &str) -> Result<String, Error> {
    if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
        return Ok(endpoint.to_string());
    }

    let url = format!("{}/json/version", endpoint.trim_end_matches('/'));
    debug!("Fetching browser version from {}", url);

    let client = reqwest::Client::builder()
        .build()
        .map_err(|e| Error::internal(format!("Failed to create HTTP client: {}", e)))?;

    let version: Value = client
        .get(&url)
        .send()
        .await
        .map_err(|e| {
            Error::browser_not_found(format!(
                "Failed to connect to CDP endpoint at {}. \
                 Start Chrome with --remote-debugging-port=9222 (error: {})",
                endpoint, e
            ))
        })?
        .json()
        .await
        .map_err(|e| Error::cdp(format!("Failed to parse /json/version: {}", e)))?;

    version
        .get("webSocketDebuggerUrl")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| Error::cdp("No webSocketDebuggerUrl in /json/version"))
}

/// CDP browser implementation
#[derive(Debug)]
pub struct CdpBrowserImpl {
    /// Browser WebSocket endpoint
    endpoint: String,
    /// Browser-level client (no session)
    client: Arc<CdpClientImpl>,
}

impl CdpBrowserImpl {
    /// Connect to a browser endpoint (`ws://…/devtools/browser/…` or `http://host:port`)
    pub async fn connect(endpoint: &str) -> Result<Self, Error> {
        let ws_url = discover_ws_url(endpoint).await?;
        info!("Connecting to browser at {}", ws_url);
        let connection = CdpWebSocketConnection::new(ws_url.as_str()).await?;
        Ok(Self::from_connection(ws_url, connection))
    }

    /// Wrap an already established connection
    pub fn from_connection<S: Into<String>>(endpoint: S, connection: Arc<dyn CdpConnection>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: Arc::new(CdpClientImpl::new(connection)),
        }
    }

    /// Browser WebSocket endpoint
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn string_field(result: &Value, field: &str) -> Result<String, Error> {
        result
            .get(field)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::cdp(format!("No {} in response", field)))
    }
}

#[async_trait]
impl CdpBrowser for CdpBrowserImpl {
    fn client(&self) -> Arc<dyn CdpClient> {
        Arc::clone(&self.client) as Arc<dyn CdpClient>
    }

    async fn get_version(&self) -> Result<BrowserVersion, Error> {
        let result = self.client.call_method("Browser.getVersion", json!({})).await?;
        let field = |name: &str| {
            result
                .get(name)
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string()
        };
        Ok(BrowserVersion {
            protocol_version: field("protocolVersion"),
            product: field("product"),
            user_agent: field("userAgent"),
            js_version: field("jsVersion"),
        })
    }

    async fn create_browser_context(&self) -> Result<String, Error> {
        let result = self
            .client
            .call_method("Target.createBrowserContext", json!({ "disposeOnDetach": true }))
            .await?;
        let id = Self::string_field(&result, "browserContextId")?;
        info!("Created browser context {}", id);
        Ok(id)
    }

    async fn dispose_browser_context(&self, context_id: &str) -> Result<(), Error> {
        info!("Disposing browser context {}", context_id);
        self.client
            .call_method("Target.disposeBrowserContext", json!({ "browserContextId": context_id }))
            .await?;
        Ok(())
    }

    async fn get_targets(&self) -> Result<Vec<TargetInfo>, Error> {
        let result = self.client.call_method("Target.getTargets", json!({})).await?;
        let infos = result.get("targetInfos").cloned().unwrap_or_else(|| json!([]));
        Ok(serde_json::from_value(infos)?)
    }

    async fn create_target(&self, url: &str, context_id: Option<&str>) -> Result<String, Error> {
        let mut params = json!({ "url": url });
        if let Some(context_id) = context_id {
            params["browserContextId"] = json!(context_id);
        }
        let result = self.client.call_method("Target.createTarget", params).await?;
        let target_id = Self::string_field(&result, "targetId")?;
        debug!("Created target {}", target_id);
        Ok(target_id)
    }

    async fn attach(&self, target_id: &str) -> Result<Arc<dyn CdpClient>, Error> {
        let result = self
            .client
            .call_method(
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
            )
            .await?;
        let session_id = Self::string_field(&result, "sessionId")?;
        debug!("Attached to target {} as session {}", target_id, session_id);
        Ok(Arc::new(CdpClientImpl::for_session(self.client.connection(), session_id)))
    }

    async fn close_target(&self, target_id: &str) -> Result<(), Error> {
        self.client
            .call_method("Target.closeTarget", json!({ "targetId": target_id }))
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), Error> {
        info!("CdpBrowser::close: Closing browser at endpoint {}", self.endpoint);

        // the browser drops the socket while answering
        if let Err(e) = self.client.call_method("Browser.close", json!({})).await {
            warn!("CdpBrowser::close: Browser.close did not complete cleanly: {}", e);
        }
        self.client.connection().close().await
    }
}
