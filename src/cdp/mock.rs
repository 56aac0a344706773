//! Mock CDP implementation for testing
//!
//! A scripted in-process connection: commands are recorded and answered by
//! per-method responders, events are pushed with [`MockCdpConnection::emit`].

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::cdp::traits::*;
use crate::Error;

type Responder = Arc<dyn Fn(&Value) -> Result<Value, Error> + Send + Sync>;

/// A command seen by the mock connection
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    pub params: Value,
    pub session_id: Option<String>,
}

/// Mock CDP connection
pub struct MockCdpConnection {
    is_active: AtomicBool,
    next_id: AtomicU64,
    calls: Mutex<Vec<RecordedCall>>,
    responders: Mutex<HashMap<String, Responder>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<CdpEvent>>>,
}

impl std::fmt::Debug for MockCdpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockCdpConnection")
            .field("is_active", &self.is_active)
            .field("calls", &self.calls.lock().map(|c| c.len()).unwrap_or_default())
            .finish()
    }
}

impl MockCdpConnection {
    /// Create a new mock CDP connection; unscripted methods answer `{}`
    pub fn new() -> Self {
        Self {
            is_active: AtomicBool::new(true),
            next_id: AtomicU64::new(1),
            calls: Mutex::new(Vec::new()),
            responders: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Answer `method` with `responder(params)`
    pub fn respond<F>(&self, method: &str, responder: F)
    where
        F: Fn(&Value) -> Result<Value, Error> + Send + Sync + 'static,
    {
        if let Ok(mut responders) = self.responders.lock() {
            responders.insert(method.to_string(), Arc::new(responder));
        }
    }

    /// Every command sent so far
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Commands sent for one method
    pub fn calls_to(&self, method: &str) -> Vec<RecordedCall> {
        self.calls().into_iter().filter(|c| c.method == method).collect()
    }

    /// Push an event to every listener
    pub fn emit(&self, method: &str, params: Value, session_id: Option<&str>) {
        let event = CdpEvent {
            method: method.to_string(),
            params,
            session_id: session_id.map(str::to_string),
        };
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|s| s.send(event.clone()).is_ok());
        }
    }
}

impl Default for MockCdpConnection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CdpConnection for MockCdpConnection {
    async fn send_command(
        &self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
    ) -> Result<CdpResponse, Error> {
        if !self.is_active.load(Ordering::Relaxed) {
            return Err(Error::websocket("Connection is not active"));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                method: method.to_string(),
                params: params.clone(),
                session_id: session_id.map(str::to_string),
            });
        }

        let responder = self.responders.lock().ok().and_then(|r| r.get(method).cloned());
        let result = match responder {
            Some(responder) => responder(&params)?,
            None => serde_json::json!({}),
        };

        Ok(CdpResponse {
            id,
            result: Some(result),
            error: None,
        })
    }

    async fn listen_events(&self) -> Result<mpsc::UnboundedReceiver<CdpEvent>, Error> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        Ok(rx)
    }

    async fn close(&self) -> Result<(), Error> {
        self.is_active.store(false, Ordering::Relaxed);
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.clear();
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.is_active.load(Ordering::Relaxed)
    }
}
