//! Canned responses for fulfilled requests

use crate::session::traits::FulfillResponse;
use crate::{Error, Result};
use bytes::Bytes;
use serde_json::Value;

/// Body of a canned response
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ResponseBody {
    #[default]
    Empty,
    Text(String),
    /// Encoded as JSON; implies `application/json` unless a content type is given
    Json(Value),
    Bytes(Bytes),
}

/// A canned response
#[derive(Debug, Clone, PartialEq)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub content_type: Option<String>,
    pub body: ResponseBody,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            content_type: None,
            body: ResponseBody::Empty,
        }
    }
}

impl MockResponse {
    /// 200 with a JSON body
    pub fn json(body: Value) -> Self {
        Self {
            body: ResponseBody::Json(body),
            ..Default::default()
        }
    }

    /// 200 with a text body
    pub fn text<S: Into<String>>(body: S) -> Self {
        Self {
            body: ResponseBody::Text(body.into()),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Build from an object such as `{"status": 200, "headers": {...}, "contentType": "...", "body": ...}`.
    ///
    /// A string body is sent as text; any other non-null body is JSON-encoded.
    pub fn from_value(value: Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| Error::invalid_argument("Mock response must be an object"))?;

        let status = match object.get("status") {
            None | Some(Value::Null) => 200,
            Some(v) => v
                .as_u64()
                .and_then(|s| u16::try_from(s).ok())
                .ok_or_else(|| Error::invalid_argument(format!("Invalid status: {}", v)))?,
        };

        let headers = match object.get("headers") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| {
                    let value = match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), value)
                })
                .collect(),
            Some(other) => return Err(Error::invalid_argument(format!("Invalid headers: {}", other))),
        };

        let content_type = object
            .get("contentType")
            .and_then(Value::as_str)
            .map(str::to_string);

        let body = match object.get("body") {
            None | Some(Value::Null) => ResponseBody::Empty,
            Some(Value::String(s)) => ResponseBody::Text(s.clone()),
            Some(other) => ResponseBody::Json(other.clone()),
        };

        Ok(Self {
            status,
            headers,
            content_type,
            body,
        })
    }

    /// Encode into the engine's fulfil payload
    pub fn to_fulfill(&self) -> Result<FulfillResponse> {
        let mut headers = self.headers.clone();
        let has_content_type = headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("content-type"));

        let body = match &self.body {
            ResponseBody::Empty => Bytes::new(),
            ResponseBody::Text(text) => Bytes::from(text.clone()),
            ResponseBody::Bytes(bytes) => bytes.clone(),
            ResponseBody::Json(value) => Bytes::from(serde_json::to_vec(value)?),
        };

        if !has_content_type {
            let implied = match (&self.content_type, &self.body) {
                (Some(ct), _) => Some(ct.clone()),
                (None, ResponseBody::Json(_)) => Some("application/json".to_string()),
                (None, ResponseBody::Text(_)) => Some("text/plain".to_string()),
                _ => None,
            };
            if let Some(ct) = implied {
                headers.push(("content-type".to_string(), ct));
            }
        }

        Ok(FulfillResponse {
            status: self.status,
            headers,
            body,
        })
    }
}
