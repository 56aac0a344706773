//! Element handle backed by a remote object
//!
//! Every element operation is a `Runtime.callFunctionOn` against the element's
//! object id, with the element passed as the first argument.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use super::input::Input;
use crate::cdp::{CallArgument, CdpClient};
use crate::session::traits::{BoundingBox, ClickOptions, ElementHandle, Query};
use crate::{Error, Result};

/// `(kind, query, root) => Element[]`
pub(crate) const QUERY_JS: &str = r#"(kind, query, root) => {
    root = root || document;
    if (kind === 'css') {
        return Array.from(root.querySelectorAll(query));
    }
    if (kind === 'xpath') {
        const doc = root.ownerDocument || root;
        const snapshot = doc.evaluate(query, root, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
        const found = [];
        for (let i = 0; i < snapshot.snapshotLength; i++) {
            const node = snapshot.snapshotItem(i);
            if (node.nodeType === Node.ELEMENT_NODE) found.push(node);
        }
        return found;
    }
    const found = [];
    const walker = (root.ownerDocument || root).createTreeWalker(root, NodeFilter.SHOW_ELEMENT);
    for (let el = walker.currentNode; el; el = walker.nextNode()) {
        if (el.nodeType !== Node.ELEMENT_NODE || el.tagName === 'SCRIPT' || el.tagName === 'STYLE') continue;
        const own = Array.from(el.childNodes)
            .filter(n => n.nodeType === Node.TEXT_NODE)
            .map(n => n.textContent)
            .join('');
        if (own.includes(query)) found.push(el);
    }
    return found;
}"#;

const VISIBLE_JS: &str = r#"(el) => {
    if (!el.isConnected) return false;
    const style = window.getComputedStyle(el);
    if (!style || style.visibility === 'hidden' || style.display === 'none') return false;
    const rect = el.getBoundingClientRect();
    return rect.width > 0 && rect.height > 0;
}"#;

const VALUE_JS: &str = r#"(el) => ('value' in el && el.value != null) ? String(el.value) : ''"#;

const FILL_JS: &str = r#"(el, text) => {
    const editable = el.isContentEditable;
    const tag = el.tagName;
    if (!editable && tag !== 'INPUT' && tag !== 'TEXTAREA') {
        throw new Error('Element is not an <input>, <textarea> or [contenteditable] element');
    }
    if (el.disabled || el.readOnly) throw new Error('Element is not editable');
    el.focus();
    if (editable) {
        el.textContent = text;
    } else {
        const proto = tag === 'INPUT' ? HTMLInputElement.prototype : HTMLTextAreaElement.prototype;
        Object.getOwnPropertyDescriptor(proto, 'value').set.call(el, text);
    }
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('change', { bubbles: true }));
}"#;

const SELECT_JS: &str = r#"(el, value) => {
    if (el.tagName !== 'SELECT') throw new Error('Element is not a <select> element');
    const matched = Array.from(el.options).filter(o => o.value === value || o.label === value);
    if (matched.length === 0) return [];
    for (const option of el.options) option.selected = matched.includes(option) && (el.multiple || option === matched[0]);
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('change', { bubbles: true }));
    return Array.from(el.selectedOptions).map(o => o.value);
}"#;

const CHECKED_JS: &str = r#"(el) => {
    if (el.getAttribute && ['checkbox', 'radio'].includes(el.getAttribute('role'))) {
        return el.getAttribute('aria-checked') === 'true';
    }
    if (el.tagName !== 'INPUT' || !['checkbox', 'radio'].includes(el.type)) {
        throw new Error('Not a checkbox or radio button');
    }
    return el.checked;
}"#;

/// Query kind and text as passed to [`QUERY_JS`]
pub(crate) fn query_args(query: &Query) -> (&'static str, &str) {
    match query {
        Query::Css(q) => ("css", q),
        Query::XPath(q) => ("xpath", q),
        Query::Text(q) => ("text", q),
    }
}

/// Element handle of a Chrome page
#[derive(Debug)]
pub struct ChromeElement {
    client: Arc<dyn CdpClient>,
    input: Arc<Input>,
    object_id: String,
}

impl ChromeElement {
    pub fn new(client: Arc<dyn CdpClient>, input: Arc<Input>, object_id: String) -> Self {
        Self {
            client,
            input,
            object_id,
        }
    }

    /// Remote object id
    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    /// Wrap every item of a remote array as an element
    pub(crate) async fn from_array(
        client: &Arc<dyn CdpClient>,
        input: &Arc<Input>,
        array_id: &str,
    ) -> Result<Vec<Arc<dyn ElementHandle>>> {
        let items = client.array_items(array_id).await?;
        if let Err(e) = client.release_object(array_id).await {
            debug!("Failed to release query result: {}", e);
        }
        Ok(items
            .into_iter()
            .map(|id| Arc::new(ChromeElement::new(Arc::clone(client), Arc::clone(input), id)) as Arc<dyn ElementHandle>)
            .collect())
    }

    fn arguments(&self, args: &[Value]) -> Vec<CallArgument> {
        let mut arguments = vec![CallArgument::object(&self.object_id)];
        arguments.extend(args.iter().cloned().map(CallArgument::value));
        arguments
    }

    /// `function(element, ...args)` by value
    async fn call(&self, function: &str, args: &[Value]) -> Result<Value> {
        let remote = self
            .client
            .call_function_on(function, Some(&self.object_id), None, self.arguments(args), true)
            .await?;
        Ok(remote.value.unwrap_or(Value::Null))
    }

    async fn call_bool(&self, function: &str) -> Result<bool> {
        Ok(self.call(function, &[]).await?.as_bool().unwrap_or(false))
    }

    async fn call_string(&self, function: &str) -> Result<String> {
        Ok(match self.call(function, &[]).await? {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        })
    }

    async fn clickable_point(&self) -> Result<(f64, f64)> {
        self.scroll_into_view().await?;
        self.bounding_box()
            .await?
            .map(|b| b.center())
            .ok_or_else(|| Error::element_not_found("element is not visible"))
    }
}

#[async_trait]
impl ElementHandle for ChromeElement {
    async fn query_all(&self, query: &Query) -> Result<Vec<Arc<dyn ElementHandle>>> {
        let (kind, text) = query_args(query);
        let function = format!("(el, kind, query) => ({})(kind, query, el)", QUERY_JS);
        let array = self
            .client
            .call_function_on(
                &function,
                Some(&self.object_id),
                None,
                self.arguments(&[json!(kind), json!(text)]),
                false,
            )
            .await?;
        match array.object_id {
            Some(array_id) => ChromeElement::from_array(&self.client, &self.input, &array_id).await,
            None => Ok(Vec::new()),
        }
    }

    async fn is_attached(&self) -> Result<bool> {
        match self.call_bool("(el) => el.isConnected").await {
            Ok(attached) => Ok(attached),
            // the object died with its document
            Err(Error::Cdp(e)) => {
                debug!("Element handle is gone: {}", e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn is_visible(&self) -> Result<bool> {
        self.call_bool(VISIBLE_JS).await
    }

    async fn text(&self) -> Result<String> {
        self.call_string("(el) => el.textContent").await
    }

    async fn value(&self) -> Result<String> {
        self.call_string(VALUE_JS).await
    }

    async fn click(&self, options: &ClickOptions) -> Result<()> {
        let (x, y) = self.clickable_point().await?;
        self.input.click(x, y, options).await
    }

    async fn hover(&self) -> Result<()> {
        let (x, y) = self.clickable_point().await?;
        self.input.mouse_move(x, y).await
    }

    async fn focus(&self) -> Result<()> {
        self.call("(el) => el.focus()", &[]).await?;
        Ok(())
    }

    async fn fill(&self, text: &str) -> Result<()> {
        self.call(FILL_JS, &[json!(text)]).await?;
        Ok(())
    }

    async fn select_option(&self, value: &str) -> Result<Vec<String>> {
        let selected = self.call(SELECT_JS, &[json!(value)]).await?;
        Ok(serde_json::from_value(selected).unwrap_or_default())
    }

    async fn set_checked(&self, checked: bool) -> Result<()> {
        if self.is_checked().await? == checked {
            return Ok(());
        }
        self.click(&ClickOptions::default()).await?;
        if self.is_checked().await? != checked {
            return Err(Error::script_execution_failed("Clicking the checkbox did not change its state"));
        }
        Ok(())
    }

    async fn is_checked(&self) -> Result<bool> {
        self.call_bool(CHECKED_JS).await
    }

    async fn set_input_files(&self, files: &[PathBuf]) -> Result<()> {
        let files: Vec<String> = files.iter().map(|p| p.to_string_lossy().into_owned()).collect();
        self.client
            .call_method(
                "DOM.setFileInputFiles",
                json!({ "files": files, "objectId": self.object_id }),
            )
            .await?;
        Ok(())
    }

    async fn bounding_box(&self) -> Result<Option<BoundingBox>> {
        let model = match self.client.box_model(&self.object_id).await {
            Ok(model) => model,
            // "Could not compute box model": not rendered
            Err(Error::Cdp(e)) => {
                debug!("No box model: {}", e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let xs = model.border.iter().step_by(2);
        let ys = model.border.iter().skip(1).step_by(2);
        let x = xs.clone().cloned().fold(f64::INFINITY, f64::min);
        let y = ys.clone().cloned().fold(f64::INFINITY, f64::min);
        let right = xs.cloned().fold(f64::NEG_INFINITY, f64::max);
        let bottom = ys.cloned().fold(f64::NEG_INFINITY, f64::max);
        if !x.is_finite() || !y.is_finite() {
            return Ok(None);
        }
        Ok(Some(BoundingBox {
            x,
            y,
            width: right - x,
            height: bottom - y,
        }))
    }

    async fn scroll_into_view(&self) -> Result<()> {
        self.client
            .call_method("DOM.scrollIntoViewIfNeeded", json!({ "objectId": self.object_id }))
            .await?;
        Ok(())
    }

    async fn evaluate(&self, function: &str, args: &[Value]) -> Result<Value> {
        self.call(function, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdp::{CdpClientImpl, MockCdpConnection};

    fn element(connection: &Arc<MockCdpConnection>) -> ChromeElement {
        let client: Arc<dyn CdpClient> = Arc::new(CdpClientImpl::for_session(connection.clone(), "S"));
        let input = Arc::new(Input::new(Arc::clone(&client)));
        ChromeElement::new(client, input, "E1".to_string())
    }

    #[tokio::test]
    async fn test_click_hits_box_center() {
        let connection = Arc::new(MockCdpConnection::new());
        connection.respond("DOM.getBoxModel", |_| {
            Ok(json!({ "model": {
                "border": [10.0, 20.0, 110.0, 20.0, 110.0, 70.0, 10.0, 70.0],
                "width": 100, "height": 50
            }}))
        });

        element(&connection).click(&ClickOptions::default()).await.unwrap();

        assert_eq!(connection.calls_to("DOM.scrollIntoViewIfNeeded").len(), 1);
        let mouse = connection.calls_to("Input.dispatchMouseEvent");
        let kinds: Vec<_> = mouse.iter().map(|c| c.params["type"].as_str().unwrap().to_string()).collect();
        assert_eq!(kinds, vec!["mouseMoved", "mousePressed", "mouseReleased"]);
        assert_eq!(mouse[1].params["x"], 60.0);
        assert_eq!(mouse[1].params["y"], 45.0);
    }

    #[tokio::test]
    async fn test_unrendered_element_has_no_box() {
        let connection = Arc::new(MockCdpConnection::new());
        connection.respond("DOM.getBoxModel", |_| Err(Error::cdp("Could not compute box model.")));
        let element = element(&connection);
        assert_eq!(element.bounding_box().await.unwrap(), None);
        assert!(element.click(&ClickOptions::default()).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_call_passes_element_first() {
        let connection = Arc::new(MockCdpConnection::new());
        connection.respond("Runtime.callFunctionOn", |_| {
            Ok(json!({ "result": { "type": "string", "value": "hello" } }))
        });
        let element = element(&connection);
        assert_eq!(element.value().await.unwrap(), "hello");

        let call = &connection.calls_to("Runtime.callFunctionOn")[0];
        assert_eq!(call.params["objectId"], "E1");
        assert_eq!(call.params["arguments"][0]["objectId"], "E1");
        assert_eq!(call.params["returnByValue"], true);
    }

    #[tokio::test]
    async fn test_dead_handle_is_detached() {
        let connection = Arc::new(MockCdpConnection::new());
        connection.respond("Runtime.callFunctionOn", |_| Err(Error::cdp("Could not find object with given id")));
        assert!(!element(&connection).is_attached().await.unwrap());
    }
}
