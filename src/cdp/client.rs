//! CDP client implementation
//!
//! This module provides a high-level CDP client with typed methods for common operations.

use super::traits::*;
use super::types::*;
use crate::Error;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// CDP client implementation
#[derive(Debug, Clone)]
pub struct CdpClientImpl {
    /// Underlying CDP connection
    connection: Arc<dyn CdpConnection>,
    /// Flattened target session, `None` for the browser itself
    session_id: Option<String>,
}

impl CdpClientImpl {
    /// Create a browser-level CDP client
    ///
    /// # Arguments
    /// * `connection` - CDP connection instance
    pub fn new(connection: Arc<dyn CdpConnection>) -> Self {
        Self {
            connection,
            session_id: None,
        }
    }

    /// Create a client addressing one attached target session
    pub fn for_session<S: Into<String>>(connection: Arc<dyn CdpConnection>, session_id: S) -> Self {
        let session_id = session_id.into();
        debug!("Creating CDP client for session {}", session_id);
        Self {
            connection,
            session_id: Some(session_id),
        }
    }

    /// Turn an evaluation result into the remote object, or the thrown exception into an error
    fn parse_evaluation(result: Value) -> Result<RemoteObject, Error> {
        let response: EvaluateResponse = serde_json::from_value(result)
            .map_err(|e| Error::cdp(format!("Failed to parse EvaluateResponse: {}", e)))?;
        if let Some(exception) = response.exception_details {
            return Err(Error::script_execution_failed(exception.message()));
        }
        debug!("Evaluation returned type='{}'", response.result.r#type);
        Ok(response.result)
    }
}

#[async_trait]
impl CdpClient for CdpClientImpl {
    fn connection(&self) -> Arc<dyn CdpConnection> {
        Arc::clone(&self.connection)
    }

    fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    async fn call_method(&self, method: &str, params: Value) -> Result<Value, Error> {
        let response = self
            .connection
            .send_command(method, params, self.session_id.as_deref())
            .await?;

        response.result.ok_or_else(|| Error::cdp("No result in response"))
    }

    async fn enable_domain(&self, domain: &str) -> Result<(), Error> {
        debug!("Enabling domain: {}", domain);
        self.call_method(&format!("{}.enable", domain), json!({})).await?;
        Ok(())
    }

    async fn evaluate(&self, expression: &str, context_id: Option<i64>, by_value: bool) -> Result<RemoteObject, Error> {
        let mut params = json!({
            "expression": expression,
            "awaitPromise": true,
            "returnByValue": by_value,
        });
        if let Some(context_id) = context_id {
            params["contextId"] = json!(context_id);
        }

        let result = self.call_method("Runtime.evaluate", params).await?;
        Self::parse_evaluation(result)
    }

    async fn call_function_on(
        &self,
        function: &str,
        object_id: Option<&str>,
        context_id: Option<i64>,
        args: Vec<CallArgument>,
        by_value: bool,
    ) -> Result<RemoteObject, Error> {
        let mut params = json!({
            "functionDeclaration": function,
            "arguments": args,
            "awaitPromise": true,
            "returnByValue": by_value,
        });
        match (object_id, context_id) {
            (Some(object_id), _) => params["objectId"] = json!(object_id),
            (None, Some(context_id)) => params["executionContextId"] = json!(context_id),
            (None, None) => {
                return Err(Error::internal("callFunctionOn needs an object or an execution context"))
            }
        }

        let result = self.call_method("Runtime.callFunctionOn", params).await?;
        Self::parse_evaluation(result)
    }

    async fn array_items(&self, object_id: &str) -> Result<Vec<String>, Error> {
        let result = self
            .call_method(
                "Runtime.getProperties",
                json!({ "objectId": object_id, "ownProperties": true }),
            )
            .await?;

        let properties: Vec<PropertyDescriptor> = serde_json::from_value(
            result.get("result").cloned().unwrap_or_else(|| json!([])),
        )?;

        let mut items: Vec<(usize, String)> = properties
            .into_iter()
            .filter_map(|p| {
                let index = p.name.parse::<usize>().ok()?;
                let object_id = p.value?.object_id?;
                Some((index, object_id))
            })
            .collect();
        items.sort_by_key(|(index, _)| *index);
        Ok(items.into_iter().map(|(_, id)| id).collect())
    }

    async fn release_object(&self, object_id: &str) -> Result<(), Error> {
        self.call_method("Runtime.releaseObject", json!({ "objectId": object_id }))
            .await?;
        Ok(())
    }

    async fn box_model(&self, object_id: &str) -> Result<BoxModel, Error> {
        let result = self
            .call_method("DOM.getBoxModel", json!({ "objectId": object_id }))
            .await?;
        let model = result
            .get("model")
            .cloned()
            .ok_or_else(|| Error::cdp("No model in box model result"))?;
        Ok(serde_json::from_value(model)?)
    }

    async fn screenshot(&self, clip: Option<Clip>) -> Result<Vec<u8>, Error> {
        info!("Capturing screenshot");

        let mut params = json!({ "format": "png" });
        if let Some(clip) = clip {
            params["clip"] = serde_json::to_value(clip)?;
            params["captureBeyondViewport"] = json!(true);
        }

        let result = self.call_method("Page.captureScreenshot", params).await?;

        let data = result
            .get("data")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::cdp("No data in screenshot result"))?;

        BASE64
            .decode(data)
            .map_err(|e| Error::cdp(format!("Failed to decode screenshot: {}", e)))
    }

    async fn subscribe_events(&self, event_type: &str) -> Result<mpsc::UnboundedReceiver<CdpEvent>, Error> {
        debug!("Subscribing to events: {}", event_type);

        let mut event_receiver = self.connection.listen_events().await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let filter = event_type.to_string();
        let session_id = self.session_id.clone();

        tokio::spawn(async move {
            while let Some(event) = event_receiver.recv().await {
                if event.session_id != session_id {
                    continue;
                }
                let wanted = filter == "*"
                    || event.method == filter
                    || (filter.ends_with('.') && event.method.starts_with(&filter));
                if wanted && tx.send(event).is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }
}
