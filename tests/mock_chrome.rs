//! Mock Chrome DevTools Protocol server
//!
//! A browser-level WebSocket endpoint speaking enough flatten-mode CDP to drive
//! the Chrome engine without a real browser: contexts, targets, sessions,
//! navigation with lifecycle events and a few `Runtime.evaluate` expressions.

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Mock Chrome server
pub struct MockChromeServer {
    addr: String,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

/// Per-connection browser state
#[derive(Default)]
struct BrowserState {
    next_id: u32,
    contexts: Vec<String>,
    /// target id -> (context id, url)
    targets: HashMap<String, (Option<String>, String)>,
    titles: HashMap<String, String>,
}

impl BrowserState {
    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn target_of(session_id: &str) -> &str {
        session_id.strip_prefix("S-").unwrap_or(session_id)
    }
}

impl MockChromeServer {
    /// Start a new mock Chrome server
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        Self::start_with_titles(HashMap::new()).await
    }

    /// Start a server that reports `titles[url]` as `document.title`
    pub async fn start_with_titles(titles: HashMap<String, String>) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let ws_addr = format!("ws://{}/devtools/browser/mock", addr);

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, peer_addr)) => {
                                tracing::info!("Mock Chrome: Connection from {}", peer_addr);
                                tokio::spawn(Self::handle_connection(stream, titles.clone()));
                            }
                            Err(e) => {
                                tracing::error!("Mock Chrome: Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = &mut shutdown_rx => {
                        tracing::info!("Mock Chrome: Shutdown signal received");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            addr: ws_addr,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// Handle a WebSocket connection
    async fn handle_connection(stream: TcpStream, titles: HashMap<String, String>) {
        let ws_stream = match accept_async(stream).await {
            Ok(ws_stream) => ws_stream,
            Err(e) => {
                tracing::error!("Mock Chrome: WebSocket handshake error: {}", e);
                return;
            }
        };
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let mut state = BrowserState {
            titles,
            ..Default::default()
        };

        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    let Ok(request) = serde_json::from_str::<Value>(&text) else { continue };
                    for message in Self::handle_request(&mut state, &request) {
                        if ws_sender.send(Message::Text(message.to_string())).await.is_err() {
                            return;
                        }
                    }
                }
                Ok(Message::Close(_)) => break,
                Err(e) => {
                    tracing::error!("Mock Chrome: WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    }

    /// Response to one command, followed by the events it triggers
    fn handle_request(state: &mut BrowserState, request: &Value) -> Vec<Value> {
        let id = request.get("id").and_then(|i| i.as_u64()).unwrap_or(0);
        let method = request.get("method").and_then(|m| m.as_str()).unwrap_or("unknown");
        let params = request.get("params").cloned().unwrap_or(Value::Null);
        let session_id = request.get("sessionId").and_then(|s| s.as_str()).map(str::to_string);

        let reply = |result: Value| {
            let mut message = json!({ "id": id, "result": result });
            if let Some(session_id) = &session_id {
                message["sessionId"] = json!(session_id);
            }
            message
        };
        let event = |method: &str, params: Value| {
            json!({ "method": method, "params": params, "sessionId": session_id })
        };

        match method {
            "Browser.getVersion" => vec![reply(json!({
                "protocolVersion": "1.3",
                "product": "MockChrome/120.0",
                "revision": "0",
                "userAgent": "Mozilla/5.0 (Mock)",
                "jsVersion": "12.0"
            }))],
            "Target.createBrowserContext" => {
                let context_id = state.next("CTX");
                state.contexts.push(context_id.clone());
                vec![reply(json!({ "browserContextId": context_id }))]
            }
            "Target.disposeBrowserContext" => {
                let context_id = params["browserContextId"].as_str().map(str::to_string);
                state.contexts.retain(|c| Some(c) != context_id.as_ref());
                state.targets.retain(|_, (ctx, _)| *ctx != context_id);
                vec![reply(json!({}))]
            }
            "Target.createTarget" => {
                let target_id = state.next("T");
                let context_id = params["browserContextId"].as_str().map(str::to_string);
                let url = params["url"].as_str().unwrap_or("about:blank").to_string();
                state.targets.insert(target_id.clone(), (context_id, url));
                vec![reply(json!({ "targetId": target_id }))]
            }
            "Target.attachToTarget" => {
                let target_id = params["targetId"].as_str().unwrap_or_default();
                vec![reply(json!({ "sessionId": format!("S-{}", target_id) }))]
            }
            "Target.getTargets" => {
                let infos: Vec<Value> = state
                    .targets
                    .iter()
                    .map(|(target_id, (context_id, url))| {
                        json!({
                            "targetId": target_id,
                            "type": "page",
                            "title": "",
                            "url": url,
                            "attached": true,
                            "browserContextId": context_id,
                        })
                    })
                    .collect();
                vec![reply(json!({ "targetInfos": infos }))]
            }
            "Target.closeTarget" => {
                let target_id = params["targetId"].as_str().unwrap_or_default().to_string();
                state.targets.remove(&target_id);
                vec![
                    reply(json!({ "success": true })),
                    json!({ "method": "Inspector.detached", "params": { "reason": "target_closed" }, "sessionId": format!("S-{}", target_id) }),
                ]
            }
            "Page.getFrameTree" => {
                let session = session_id.clone().unwrap_or_default();
                let url = state
                    .targets
                    .get(BrowserState::target_of(&session))
                    .map(|(_, url)| url.clone())
                    .unwrap_or_default();
                vec![reply(json!({ "frameTree": { "frame": { "id": format!("F-{}", session), "url": url } } }))]
            }
            "Page.navigate" => {
                let session = session_id.clone().unwrap_or_default();
                let url = params["url"].as_str().unwrap_or_default().to_string();
                if let Some(target) = state.targets.get_mut(BrowserState::target_of(&session)) {
                    target.1 = url.clone();
                }
                let loader_id = state.next("L");
                let frame_id = format!("F-{}", session);
                let lifecycle = |name: &str| {
                    event(
                        "Page.lifecycleEvent",
                        json!({ "frameId": frame_id, "loaderId": loader_id, "name": name, "timestamp": 0.0 }),
                    )
                };
                vec![
                    reply(json!({ "frameId": frame_id, "loaderId": loader_id })),
                    lifecycle("init"),
                    event("Page.frameNavigated", json!({ "frame": { "id": frame_id, "url": url } })),
                    lifecycle("DOMContentLoaded"),
                    lifecycle("load"),
                    lifecycle("networkIdle"),
                ]
            }
            "Runtime.evaluate" => {
                let session = session_id.clone().unwrap_or_default();
                let url = state
                    .targets
                    .get(BrowserState::target_of(&session))
                    .map(|(_, url)| url.clone())
                    .unwrap_or_default();
                let expression = params["expression"].as_str().unwrap_or_default();
                let value = match expression {
                    "location.href" => json!({ "type": "string", "value": url }),
                    "document.title" => {
                        json!({ "type": "string", "value": state.titles.get(&url).cloned().unwrap_or_default() })
                    }
                    _ => json!({ "type": "undefined" }),
                };
                vec![reply(json!({ "result": value }))]
            }
            "Storage.getCookies" => vec![reply(json!({ "cookies": [] }))],
            "Page.captureScreenshot" => vec![reply(json!({
                "data": "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg=="
            }))],
            // enable calls, emulation and other setters
            _ => vec![reply(json!({}))],
        }
    }

    /// Get the WebSocket endpoint URL
    pub fn ws_endpoint(&self) -> &str {
        &self.addr
    }
}

impl Drop for MockChromeServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_chrome_startup() {
        let server = MockChromeServer::start().await.unwrap();
        assert!(server.ws_endpoint().starts_with("ws://127.0.0.1:"));
    }

    #[test]
    fn test_navigate_emits_lifecycle_after_reply() {
        let mut state = BrowserState::default();
        state.targets.insert("T-1".into(), (None, "about:blank".into()));
        let messages = MockChromeServer::handle_request(
            &mut state,
            &json!({ "id": 5, "method": "Page.navigate", "params": { "url": "https://a.test/" }, "sessionId": "S-T-1" }),
        );

        assert_eq!(messages[0]["id"], 5);
        let loader = messages[0]["result"]["loaderId"].clone();
        let load = messages
            .iter()
            .find(|m| m["params"]["name"] == "load")
            .unwrap();
        assert_eq!(load["params"]["loaderId"], loader);
        assert_eq!(load["sessionId"], "S-T-1");
        assert_eq!(state.targets["T-1"].1, "https://a.test/");
    }
}
