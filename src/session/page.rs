//! Page handle backed by one flattened CDP target session
//!
//! Every page owns an event pump: raw session events are translated into
//! [`PageEvent`]s and fanned out on a broadcast channel, and paused requests
//! (`Fetch.requestPaused`) are handed to the context's route handler.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace, warn};

use super::context::ContextState;
use super::frame::{invocation, ChromeFrame};
use super::input::Input;
use crate::cdp::types::{FrameTree, NavigationHistory};
use crate::cdp::{CdpBrowser, CdpClient, CdpEvent, Clip};
use crate::session::traits::{
    BoundingBox, FrameHandle, FulfillResponse, Geolocation, LoadState, MouseButton, NavigationOptions,
    PageEvent, PageHandle, RequestInfo, ResponseInfo, RoutedRequest, Viewport,
};
use crate::{Error, Result};

const EVENT_CAPACITY: usize = 256;

/// Lifecycle event name reported by Chrome for a load state
fn lifecycle_name(state: LoadState) -> &'static str {
    match state {
        LoadState::Load => "load",
        LoadState::DomContentLoaded => "DOMContentLoaded",
        LoadState::NetworkIdle => "networkIdle",
    }
}

fn load_state(name: &str) -> Option<LoadState> {
    match name {
        "load" => Some(LoadState::Load),
        "DOMContentLoaded" => Some(LoadState::DomContentLoaded),
        "networkIdle" => Some(LoadState::NetworkIdle),
        _ => None,
    }
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> &'a str {
    value.pointer(pointer).and_then(|v| v.as_str()).unwrap_or_default()
}

/// Map a raw session event onto a page event; `None` for events pages do not report
pub(crate) fn translate(event: &CdpEvent, main_frame: &str) -> Option<PageEvent> {
    let params = &event.params;
    let other = |name: &str| PageEvent::Other {
        name: name.to_string(),
        payload: params.clone(),
    };
    match event.method.as_str() {
        "Network.requestWillBeSent" => Some(PageEvent::Request(RequestInfo {
            url: str_at(params, "/request/url").to_string(),
            method: str_at(params, "/request/method").to_string(),
        })),
        "Network.responseReceived" => Some(PageEvent::Response(ResponseInfo {
            url: str_at(params, "/response/url").to_string(),
            status: params
                .pointer("/response/status")
                .and_then(|v| v.as_u64())
                .unwrap_or_default() as u16,
        })),
        "Page.lifecycleEvent" if str_at(params, "/frameId") == main_frame => {
            load_state(str_at(params, "/name")).map(PageEvent::Lifecycle)
        }
        "Page.frameNavigated" if params.pointer("/frame/parentId").is_none() => Some(PageEvent::FrameNavigated {
            url: str_at(params, "/frame/url").to_string(),
        }),
        "Network.loadingFinished" => Some(other("requestfinished")),
        "Network.loadingFailed" => Some(other("requestfailed")),
        "Runtime.consoleAPICalled" => Some(other("console")),
        "Runtime.exceptionThrown" => Some(other("pageerror")),
        "Page.javascriptDialogOpening" => Some(other("dialog")),
        "Page.windowOpen" => Some(other("popup")),
        "Page.downloadWillBegin" => Some(other("download")),
        "Inspector.detached" => Some(other("close")),
        _ => None,
    }
}

/// A request paused in the `Fetch` domain
#[derive(Debug)]
pub struct ChromeRoutedRequest {
    client: Arc<dyn CdpClient>,
    request_id: String,
    url: String,
    method: String,
    headers: HashMap<String, String>,
    post_data: Option<String>,
}

impl ChromeRoutedRequest {
    fn from_paused(client: Arc<dyn CdpClient>, params: &Value) -> Result<Self> {
        let request_id = params
            .get("requestId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::cdp("Fetch.requestPaused without requestId"))?
            .to_string();
        let headers = params
            .pointer("/request/headers")
            .and_then(|v| v.as_object())
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            client,
            request_id,
            url: str_at(params, "/request/url").to_string(),
            method: str_at(params, "/request/method").to_string(),
            headers,
            post_data: params
                .pointer("/request/postData")
                .and_then(|v| v.as_str())
                .map(String::from),
        })
    }
}

#[async_trait]
impl RoutedRequest for ChromeRoutedRequest {
    fn url(&self) -> &str {
        &self.url
    }

    fn method(&self) -> &str {
        &self.method
    }

    fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    fn post_data(&self) -> Option<&str> {
        self.post_data.as_deref()
    }

    async fn abort(&self) -> Result<()> {
        self.client
            .call_method(
                "Fetch.failRequest",
                json!({ "requestId": self.request_id, "errorReason": "BlockedByClient" }),
            )
            .await?;
        Ok(())
    }

    async fn fulfill(&self, response: FulfillResponse) -> Result<()> {
        let headers: Vec<Value> = response
            .headers
            .iter()
            .map(|(name, value)| json!({ "name": name, "value": value }))
            .collect();
        self.client
            .call_method(
                "Fetch.fulfillRequest",
                json!({
                    "requestId": self.request_id,
                    "responseCode": response.status,
                    "responseHeaders": headers,
                    "body": BASE64.encode(&response.body),
                }),
            )
            .await?;
        Ok(())
    }

    async fn proceed(&self) -> Result<()> {
        self.client
            .call_method("Fetch.continueRequest", json!({ "requestId": self.request_id }))
            .await?;
        Ok(())
    }
}

/// State moved into the event pump task
struct Pump {
    client: Arc<dyn CdpClient>,
    context: Arc<ContextState>,
    events: broadcast::Sender<PageEvent>,
    closed: Arc<AtomicBool>,
    main_frame: String,
    target_id: String,
}

impl Pump {
    async fn run(self, mut raw: mpsc::UnboundedReceiver<CdpEvent>) {
        while let Some(event) = raw.recv().await {
            if event.method == "Fetch.requestPaused" {
                self.route(&event.params);
                continue;
            }
            if let Some(page_event) = translate(&event, &self.main_frame) {
                trace!("Page {} event: {}", self.target_id, page_event.name());
                // no subscriber is not an error
                let _ = self.events.send(page_event);
            }
            if event.method == "Inspector.detached" {
                break;
            }
        }
        self.closed.store(true, Ordering::SeqCst);
        debug!("Event pump of page {} stopped", self.target_id);
    }

    fn route(&self, params: &Value) {
        let request = match ChromeRoutedRequest::from_paused(Arc::clone(&self.client), params) {
            Ok(request) => Arc::new(request),
            Err(e) => {
                warn!("Ignoring paused request: {}", e);
                return;
            }
        };
        let handler = self.context.route().unwrap_or_else(|e| {
            warn!("Route handler unavailable: {}", e);
            None
        });

        tokio::spawn(async move {
            let outcome = match handler {
                Some(handler) => {
                    let routed: Arc<dyn RoutedRequest> = request.clone();
                    handler(routed).await
                }
                None => request.proceed().await,
            };
            if let Err(e) = outcome {
                warn!("Routing {} {} failed: {}", request.method, request.url, e);
                // a stuck request would hang the page
                if let Err(e) = request.proceed().await {
                    debug!("Request {} could not be continued: {}", request.request_id, e);
                }
            }
        });
    }
}

/// One browser tab
#[derive(Debug)]
pub struct ChromePage {
    target_id: String,
    client: Arc<dyn CdpClient>,
    browser: Arc<dyn CdpBrowser>,
    input: Arc<Input>,
    context: Arc<ContextState>,
    /// Page-level headers, merged over the context's
    headers: RwLock<HashMap<String, String>>,
    main_frame: String,
    events: broadcast::Sender<PageEvent>,
    closed: Arc<AtomicBool>,
}

impl ChromePage {
    /// Attach to a page target, prepare its session and start the event pump
    pub(crate) async fn attach(
        browser: Arc<dyn CdpBrowser>,
        target_id: String,
        context: Arc<ContextState>,
    ) -> Result<Arc<Self>> {
        let client = browser.attach(&target_id).await?;
        let raw = client.subscribe_events("*").await?;

        for domain in ["Page", "Runtime", "Network"] {
            client.enable_domain(domain).await?;
        }
        client
            .call_method("Page.setLifecycleEventsEnabled", json!({ "enabled": true }))
            .await?;

        let tree = client.call_method("Page.getFrameTree", json!({})).await?;
        let tree: FrameTree = serde_json::from_value(tree.get("frameTree").cloned().unwrap_or(Value::Null))?;

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let page = Arc::new(Self {
            input: Arc::new(Input::new(Arc::clone(&client))),
            target_id: target_id.clone(),
            client: Arc::clone(&client),
            browser,
            context: Arc::clone(&context),
            headers: RwLock::new(HashMap::new()),
            main_frame: tree.frame.id.clone(),
            events: events.clone(),
            closed: Arc::new(AtomicBool::new(false)),
        });

        page.apply_context_options().await?;

        let pump = Pump {
            client,
            context,
            events,
            closed: Arc::clone(&page.closed),
            main_frame: tree.frame.id,
            target_id,
        };
        tokio::spawn(pump.run(raw));

        info!("Page {} ready", page.target_id);
        Ok(page)
    }

    async fn apply_context_options(&self) -> Result<()> {
        let options = &self.context.options;
        if let Some(viewport) = options.viewport {
            self.set_viewport(viewport).await?;
        }
        if let Some(user_agent) = &options.user_agent {
            self.client
                .call_method("Emulation.setUserAgentOverride", json!({ "userAgent": user_agent }))
                .await?;
        }
        if options.has_touch {
            self.client
                .call_method("Emulation.setTouchEmulationEnabled", json!({ "enabled": true }))
                .await?;
        }
        self.apply_headers().await?;
        if let Some(geolocation) = self.context.geolocation()? {
            self.apply_geolocation(Some(geolocation)).await?;
        }
        if self.context.route()?.is_some() {
            self.enable_routing().await?;
        }
        Ok(())
    }

    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Context headers overlaid with this page's own
    pub(crate) async fn apply_headers(&self) -> Result<()> {
        let mut headers = self.context.headers()?;
        let own = self
            .headers
            .read()
            .map_err(|e| Error::internal(format!("Lock error: {}", e)))?
            .clone();
        headers.extend(own);
        if headers.is_empty() {
            return Ok(());
        }
        self.client
            .call_method("Network.setExtraHTTPHeaders", json!({ "headers": headers }))
            .await?;
        Ok(())
    }

    pub(crate) async fn apply_geolocation(&self, geolocation: Option<Geolocation>) -> Result<()> {
        let params = match geolocation {
            Some(g) => json!({
                "latitude": g.latitude,
                "longitude": g.longitude,
                "accuracy": g.accuracy.unwrap_or(0.0),
            }),
            None => json!({}),
        };
        self.client.call_method("Emulation.setGeolocationOverride", params).await?;
        Ok(())
    }

    pub(crate) async fn enable_routing(&self) -> Result<()> {
        self.client
            .call_method("Fetch.enable", json!({ "patterns": [ { "urlPattern": "*" } ] }))
            .await?;
        Ok(())
    }

    pub(crate) async fn disable_routing(&self) -> Result<()> {
        self.client.call_method("Fetch.disable", json!({})).await?;
        Ok(())
    }

    async fn eval_string(&self, expression: &str) -> Result<String> {
        let remote = self.client.evaluate(expression, None, true).await?;
        Ok(remote
            .value
            .as_ref()
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string())
    }

    /// Wait for the main frame to reach `wait_until` for the given loader.
    /// Without a known loader, the next `init` lifecycle event names it, and
    /// a same-document navigation completes immediately.
    async fn wait_for_lifecycle(
        &self,
        mut raw: mpsc::UnboundedReceiver<CdpEvent>,
        loader: Option<String>,
        options: &NavigationOptions,
    ) -> Result<()> {
        let target = lifecycle_name(options.wait_until);
        let mut loader = loader;
        let watch = async {
            while let Some(event) = raw.recv().await {
                let params = &event.params;
                match event.method.as_str() {
                    "Page.lifecycleEvent" if str_at(params, "/frameId") == self.main_frame => {
                        let name = str_at(params, "/name");
                        let event_loader = str_at(params, "/loaderId");
                        if name == "init" && loader.is_none() {
                            loader = Some(event_loader.to_string());
                        }
                        if name == target && loader.as_deref() == Some(event_loader) {
                            return Ok(());
                        }
                    }
                    "Page.navigatedWithinDocument"
                        if loader.is_none() && str_at(params, "/frameId") == self.main_frame =>
                    {
                        return Ok(());
                    }
                    "Inspector.detached" => {
                        return Err(Error::navigation_failed("Page closed during navigation"));
                    }
                    _ => {}
                }
            }
            Err(Error::websocket("Connection closed during navigation"))
        };

        tokio::time::timeout(options.timeout, watch).await.map_err(|_| {
            Error::timeout(format!(
                "Navigation timeout of {}ms exceeded waiting for {}",
                options.timeout.as_millis(),
                options.wait_until.as_str()
            ))
        })?
    }

    /// Navigate `delta` steps through session history; false when there is no such entry
    async fn traverse(&self, delta: i64, options: &NavigationOptions) -> Result<bool> {
        let history = self.client.call_method("Page.getNavigationHistory", json!({})).await?;
        let history: NavigationHistory = serde_json::from_value(history)?;
        let index = history.current_index as i64 + delta;
        let entry = match usize::try_from(index).ok().and_then(|i| history.entries.get(i)) {
            Some(entry) => entry,
            None => return Ok(false),
        };

        let raw = self.client.subscribe_events("*").await?;
        self.client
            .call_method("Page.navigateToHistoryEntry", json!({ "entryId": entry.id }))
            .await?;
        self.wait_for_lifecycle(raw, None, options).await?;
        Ok(true)
    }
}

#[async_trait]
impl PageHandle for ChromePage {
    fn id(&self) -> &str {
        &self.target_id
    }

    async fn url(&self) -> Result<String> {
        self.eval_string("location.href").await
    }

    async fn title(&self) -> Result<String> {
        self.eval_string("document.title").await
    }

    async fn goto(&self, url: &str, options: &NavigationOptions) -> Result<()> {
        debug!("Page {} navigating to {}", self.target_id, url);
        let raw = self.client.subscribe_events("*").await?;
        let result = self.client.call_method("Page.navigate", json!({ "url": url })).await?;

        if let Some(error) = result.get("errorText").and_then(|v| v.as_str()).filter(|e| !e.is_empty()) {
            return Err(Error::navigation_failed(format!("{} at {}", error, url)));
        }
        match result.get("loaderId").and_then(|v| v.as_str()) {
            Some(loader) => self.wait_for_lifecycle(raw, Some(loader.to_string()), options).await,
            // same-document navigation
            None => Ok(()),
        }
    }

    async fn reload(&self, options: &NavigationOptions) -> Result<()> {
        let raw = self.client.subscribe_events("*").await?;
        self.client.call_method("Page.reload", json!({})).await?;
        self.wait_for_lifecycle(raw, None, options).await
    }

    async fn go_back(&self, options: &NavigationOptions) -> Result<bool> {
        self.traverse(-1, options).await
    }

    async fn go_forward(&self, options: &NavigationOptions) -> Result<bool> {
        self.traverse(1, options).await
    }

    async fn frames(&self) -> Result<Vec<Arc<dyn FrameHandle>>> {
        let tree = self.client.call_method("Page.getFrameTree", json!({})).await?;
        let tree: FrameTree = serde_json::from_value(tree.get("frameTree").cloned().unwrap_or(Value::Null))?;
        Ok(tree
            .flatten()
            .into_iter()
            .enumerate()
            .map(|(index, frame)| {
                Arc::new(ChromeFrame::new(
                    Arc::clone(&self.client),
                    Arc::clone(&self.input),
                    frame.id,
                    index == 0,
                )) as Arc<dyn FrameHandle>
            })
            .collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.events.subscribe()
    }

    async fn evaluate(&self, function: &str, args: &[Value]) -> Result<Value> {
        let expression = invocation(function, args)?;
        let remote = self.client.evaluate(&expression, None, true).await?;
        Ok(remote.value.unwrap_or(Value::Null))
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        self.input.type_text(text).await
    }

    async fn key_down(&self, key: &str) -> Result<()> {
        self.input.key_down(key).await
    }

    async fn key_up(&self, key: &str) -> Result<()> {
        self.input.key_up(key).await
    }

    async fn mouse_move(&self, x: f64, y: f64) -> Result<()> {
        self.input.mouse_move(x, y).await
    }

    async fn mouse_down(&self, x: f64, y: f64, button: MouseButton) -> Result<()> {
        self.input.mouse_down(x, y, button, 1).await
    }

    async fn mouse_up(&self, x: f64, y: f64, button: MouseButton) -> Result<()> {
        self.input.mouse_up(x, y, button, 1).await
    }

    async fn set_viewport(&self, viewport: Viewport) -> Result<()> {
        let options = &self.context.options;
        self.client
            .call_method(
                "Emulation.setDeviceMetricsOverride",
                json!({
                    "width": viewport.width,
                    "height": viewport.height,
                    "deviceScaleFactor": options.device_scale_factor.unwrap_or(0.0),
                    "mobile": options.is_mobile,
                }),
            )
            .await?;
        Ok(())
    }

    async fn set_extra_http_headers(&self, headers: &HashMap<String, String>) -> Result<()> {
        *self
            .headers
            .write()
            .map_err(|e| Error::internal(format!("Lock error: {}", e)))? = headers.clone();
        self.apply_headers().await
    }

    async fn screenshot(&self, clip: Option<BoundingBox>) -> Result<Vec<u8>> {
        let clip = clip.map(|b| Clip {
            x: b.x,
            y: b.y,
            width: b.width,
            height: b.height,
            scale: 1.0,
        });
        self.client.screenshot(clip).await
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.browser.close_target(&self.target_id).await?;
        info!("Page {} closed", self.target_id);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
