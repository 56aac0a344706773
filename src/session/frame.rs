//! Frame handle of a Chrome page

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::element::{query_args, ChromeElement, QUERY_JS};
use super::input::Input;
use crate::cdp::CdpClient;
use crate::session::traits::{ElementHandle, FrameHandle, Query};
use crate::Result;

const WORLD_NAME: &str = "__oxidrums_utility__";

/// `(function)(...args)` as an expression
pub(crate) fn invocation(function: &str, args: &[Value]) -> Result<String> {
    Ok(format!("({})(...{})", function, serde_json::to_string(args)?))
}

/// One frame of a page. The main frame evaluates in the page's own world;
/// child frames get an isolated world created on first use.
#[derive(Debug)]
pub struct ChromeFrame {
    client: Arc<dyn CdpClient>,
    input: Arc<Input>,
    frame_id: String,
    main: bool,
    world: OnceCell<i64>,
}

impl ChromeFrame {
    pub fn new(client: Arc<dyn CdpClient>, input: Arc<Input>, frame_id: String, main: bool) -> Self {
        Self {
            client,
            input,
            frame_id,
            main,
            world: OnceCell::new(),
        }
    }

    async fn context_id(&self) -> Result<Option<i64>> {
        if self.main {
            return Ok(None);
        }
        let id = self
            .world
            .get_or_try_init(|| async {
                let result = self
                    .client
                    .call_method(
                        "Page.createIsolatedWorld",
                        json!({ "frameId": self.frame_id, "worldName": WORLD_NAME }),
                    )
                    .await?;
                result
                    .get("executionContextId")
                    .and_then(|v| v.as_i64())
                    .ok_or_else(|| crate::Error::cdp("No executionContextId in createIsolatedWorld result"))
            })
            .await?;
        Ok(Some(*id))
    }
}

#[async_trait]
impl FrameHandle for ChromeFrame {
    fn id(&self) -> &str {
        &self.frame_id
    }

    fn is_main(&self) -> bool {
        self.main
    }

    async fn query_all(&self, query: &Query) -> Result<Vec<Arc<dyn ElementHandle>>> {
        let (kind, text) = query_args(query);
        let expression = invocation(QUERY_JS, &[json!(kind), json!(text), Value::Null])?;
        let context_id = self.context_id().await?;
        let array = self.client.evaluate(&expression, context_id, false).await?;
        match array.object_id {
            Some(array_id) => ChromeElement::from_array(&self.client, &self.input, &array_id).await,
            None => Ok(Vec::new()),
        }
    }

    async fn evaluate(&self, function: &str, args: &[Value]) -> Result<Value> {
        let expression = invocation(function, args)?;
        let context_id = self.context_id().await?;
        let remote = self.client.evaluate(&expression, context_id, true).await?;
        Ok(remote.value.unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdp::{CdpClientImpl, MockCdpConnection};

    fn frame(connection: &Arc<MockCdpConnection>, main: bool) -> ChromeFrame {
        let client: Arc<dyn CdpClient> = Arc::new(CdpClientImpl::for_session(connection.clone(), "S"));
        let input = Arc::new(Input::new(Arc::clone(&client)));
        ChromeFrame::new(client, input, "F".to_string(), main)
    }

    #[test]
    fn test_invocation_inlines_json_args() {
        let expr = invocation("(a, b) => a + b", &[json!(1), json!("x")]).unwrap();
        assert_eq!(expr, r#"((a, b) => a + b)(...[1,"x"])"#);
    }

    #[tokio::test]
    async fn test_child_frame_uses_isolated_world_once() {
        let connection = Arc::new(MockCdpConnection::new());
        connection.respond("Page.createIsolatedWorld", |_| Ok(json!({ "executionContextId": 7 })));
        connection.respond("Runtime.evaluate", |_| Ok(json!({ "result": { "type": "number", "value": 3 } })));

        let frame = frame(&connection, false);
        assert_eq!(frame.evaluate("() => 3", &[]).await.unwrap(), json!(3));
        frame.evaluate("() => 3", &[]).await.unwrap();

        assert_eq!(connection.calls_to("Page.createIsolatedWorld").len(), 1);
        assert_eq!(connection.calls_to("Runtime.evaluate")[0].params["contextId"], 7);
    }

    #[tokio::test]
    async fn test_query_wraps_array_items() {
        let connection = Arc::new(MockCdpConnection::new());
        connection.respond("Runtime.evaluate", |_| {
            Ok(json!({ "result": { "type": "object", "subtype": "array", "objectId": "ARR" } }))
        });
        connection.respond("Runtime.getProperties", |_| {
            Ok(json!({ "result": [
                { "name": "0", "value": { "type": "object", "subtype": "node", "objectId": "N0" } },
                { "name": "1", "value": { "type": "object", "subtype": "node", "objectId": "N1" } }
            ]}))
        });

        let found = frame(&connection, true).query_all(&Query::Css("li".into())).await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(connection.calls_to("Runtime.evaluate")[0].params.get("contextId").is_none());
        assert_eq!(connection.calls_to("Runtime.releaseObject")[0].params["objectId"], "ARR");
    }
}
