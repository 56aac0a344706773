//! Browser context handle
//!
//! A CDP browser context is an isolated profile (cookies, storage, permissions).
//! State that every page of the context must see (routing, geolocation, extra
//! headers) lives in [`ContextState`] and is re-applied to each new page.

use async_trait::async_trait;
use phf::phf_map;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::page::ChromePage;
use crate::cdp::CdpBrowser;
use crate::session::traits::{ContextHandle, ContextOptions, Cookie, Geolocation, PageHandle, RouteHandler};
use crate::{Error, Result};

/// Permission names accepted by `grant_permissions`, mapped to protocol permission types
static PERMISSIONS: phf::Map<&'static str, &'static str> = phf_map! {
    "geolocation" => "geolocation",
    "notifications" => "notifications",
    "camera" => "videoCapture",
    "microphone" => "audioCapture",
    "midi" => "midi",
    "midi-sysex" => "midiSysex",
    "clipboard-read" => "clipboardReadWrite",
    "clipboard-write" => "clipboardSanitizedWrite",
    "background-sync" => "backgroundSync",
    "accelerometer" => "sensors",
    "gyroscope" => "sensors",
    "magnetometer" => "sensors",
    "ambient-light-sensor" => "sensors",
    "payment-handler" => "paymentHandler",
    "storage-access" => "storageAccess",
    "idle-detection" => "idleDetection",
};

fn lock_error<E: std::fmt::Display>(e: E) -> Error {
    Error::internal(format!("Lock error: {}", e))
}

/// Context-wide settings shared with every page
pub(crate) struct ContextState {
    pub(crate) options: ContextOptions,
    route: RwLock<Option<RouteHandler>>,
    geolocation: RwLock<Option<Geolocation>>,
    headers: RwLock<HashMap<String, String>>,
}

impl std::fmt::Debug for ContextState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextState")
            .field("options", &self.options)
            .field("routed", &self.route.read().map(|r| r.is_some()).unwrap_or(false))
            .finish()
    }
}

impl ContextState {
    pub(crate) fn new(options: ContextOptions) -> Self {
        let headers = options.extra_http_headers.clone();
        Self {
            options,
            route: RwLock::new(None),
            geolocation: RwLock::new(None),
            headers: RwLock::new(headers),
        }
    }

    pub(crate) fn route(&self) -> Result<Option<RouteHandler>> {
        Ok(self.route.read().map_err(lock_error)?.clone())
    }

    fn set_route(&self, handler: Option<RouteHandler>) -> Result<()> {
        *self.route.write().map_err(lock_error)? = handler;
        Ok(())
    }

    pub(crate) fn geolocation(&self) -> Result<Option<Geolocation>> {
        Ok(*self.geolocation.read().map_err(lock_error)?)
    }

    pub(crate) fn headers(&self) -> Result<HashMap<String, String>> {
        Ok(self.headers.read().map_err(lock_error)?.clone())
    }
}

/// Cookie as reported by `Storage.getCookies`; session cookies carry `expires: -1`
fn cookie_from_protocol(value: Value) -> Result<Cookie> {
    let mut cookie: Cookie = serde_json::from_value(value)?;
    if cookie.expires.is_some_and(|e| e < 0.0) {
        cookie.expires = None;
    }
    Ok(cookie)
}

/// Isolated browser context
#[derive(Debug)]
pub struct ChromeContext {
    id: String,
    browser: Arc<dyn CdpBrowser>,
    state: Arc<ContextState>,
    pages: Mutex<Vec<Arc<ChromePage>>>,
    closed: AtomicBool,
}

impl ChromeContext {
    pub fn new(id: String, browser: Arc<dyn CdpBrowser>, options: ContextOptions) -> Self {
        Self {
            id,
            browser,
            state: Arc::new(ContextState::new(options)),
            pages: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::context_not_found(format!("Context {} is closed", self.id)));
        }
        Ok(())
    }

    async fn live_pages(&self) -> Vec<Arc<ChromePage>> {
        self.pages.lock().await.iter().filter(|p| !p.is_closed()).cloned().collect()
    }

    /// Attach pages of this context opened by the pages themselves (popups)
    async fn adopt_new_targets(&self) -> Result<()> {
        let targets = self.browser.get_targets().await?;
        let mut pages = self.pages.lock().await;
        for target in targets {
            let ours = target.r#type == "page" && target.browser_context_id.as_deref() == Some(self.id.as_str());
            if !ours || pages.iter().any(|p| p.id() == target.target_id) {
                continue;
            }
            debug!("Adopting page {} ({}) opened in context {}", target.target_id, target.url, self.id);
            match ChromePage::attach(Arc::clone(&self.browser), target.target_id.clone(), Arc::clone(&self.state)).await {
                Ok(page) => pages.push(page),
                // the popup may already be gone
                Err(e) => warn!("Failed to attach to page {}: {}", target.target_id, e),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ContextHandle for ChromeContext {
    fn id(&self) -> &str {
        &self.id
    }

    async fn new_page(&self) -> Result<Arc<dyn PageHandle>> {
        self.check_open()?;
        let target_id = self.browser.create_target("about:blank", Some(&self.id)).await?;
        let page = ChromePage::attach(Arc::clone(&self.browser), target_id, Arc::clone(&self.state)).await?;
        self.pages.lock().await.push(Arc::clone(&page));
        Ok(page)
    }

    async fn pages(&self) -> Result<Vec<Arc<dyn PageHandle>>> {
        self.check_open()?;
        self.adopt_new_targets().await?;
        Ok(self
            .live_pages()
            .await
            .into_iter()
            .map(|p| p as Arc<dyn PageHandle>)
            .collect())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        for page in self.pages.lock().await.drain(..) {
            page.mark_closed();
        }
        self.browser.dispose_browser_context(&self.id).await?;
        info!("Context {} disposed", self.id);
        Ok(())
    }

    async fn route(&self, handler: RouteHandler) -> Result<()> {
        self.check_open()?;
        self.state.set_route(Some(handler))?;
        for page in self.live_pages().await {
            page.enable_routing().await?;
        }
        Ok(())
    }

    async fn unroute(&self) -> Result<()> {
        self.state.set_route(None)?;
        for page in self.live_pages().await {
            page.disable_routing().await?;
        }
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<Cookie>> {
        self.check_open()?;
        let result = self
            .browser
            .client()
            .call_method("Storage.getCookies", json!({ "browserContextId": self.id }))
            .await?;
        let cookies = match result.get("cookies") {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        };
        cookies.into_iter().map(cookie_from_protocol).collect()
    }

    async fn add_cookies(&self, cookies: &[Cookie]) -> Result<()> {
        self.check_open()?;
        self.browser
            .client()
            .call_method(
                "Storage.setCookies",
                json!({ "cookies": cookies, "browserContextId": self.id }),
            )
            .await?;
        Ok(())
    }

    async fn clear_cookies(&self) -> Result<()> {
        self.check_open()?;
        self.browser
            .client()
            .call_method("Storage.clearCookies", json!({ "browserContextId": self.id }))
            .await?;
        Ok(())
    }

    async fn grant_permissions(&self, permissions: &[String], origin: Option<&str>) -> Result<()> {
        self.check_open()?;
        let mut types = Vec::with_capacity(permissions.len());
        for name in permissions {
            let protocol = PERMISSIONS
                .get(name.as_str())
                .ok_or_else(|| Error::invalid_argument(format!("Unknown permission: {}", name)))?;
            if !types.contains(protocol) {
                types.push(*protocol);
            }
        }

        let mut params = json!({ "permissions": types, "browserContextId": self.id });
        if let Some(origin) = origin {
            params["origin"] = json!(origin);
        }
        self.browser.client().call_method("Browser.grantPermissions", params).await?;
        Ok(())
    }

    async fn clear_permissions(&self) -> Result<()> {
        self.check_open()?;
        self.browser
            .client()
            .call_method("Browser.resetPermissions", json!({ "browserContextId": self.id }))
            .await?;
        Ok(())
    }

    async fn set_geolocation(&self, geolocation: Option<Geolocation>) -> Result<()> {
        self.check_open()?;
        *self.state.geolocation.write().map_err(lock_error)? = geolocation;
        for page in self.live_pages().await {
            page.apply_geolocation(geolocation).await?;
        }
        Ok(())
    }

    async fn set_extra_http_headers(&self, headers: &HashMap<String, String>) -> Result<()> {
        self.check_open()?;
        *self.state.headers.write().map_err(lock_error)? = headers.clone();
        for page in self.live_pages().await {
            page.apply_headers().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdp::{CdpBrowserImpl, MockCdpConnection};

    fn context(connection: &Arc<MockCdpConnection>) -> ChromeContext {
        let browser = Arc::new(CdpBrowserImpl::from_connection("ws://mock", connection.clone()));
        ChromeContext::new("CTX".to_string(), browser, ContextOptions::default())
    }

    #[test]
    fn test_session_cookie_has_no_expiry() {
        let cookie = cookie_from_protocol(json!({
            "name": "sid", "value": "1", "domain": "a.test", "path": "/",
            "expires": -1, "size": 4, "httpOnly": true, "secure": false,
            "session": true, "sameSite": "Lax"
        }))
        .unwrap();
        assert_eq!(cookie.expires, None);
        assert!(cookie.http_only);
        assert_eq!(cookie.same_site, Some(crate::session::traits::SameSite::Lax));
    }

    #[tokio::test]
    async fn test_permissions_are_mapped_and_scoped() {
        let connection = Arc::new(MockCdpConnection::new());
        let context = context(&connection);
        context
            .grant_permissions(&["camera".into(), "geolocation".into()], Some("https://a.test"))
            .await
            .unwrap();

        let call = &connection.calls_to("Browser.grantPermissions")[0];
        assert_eq!(call.params["permissions"], json!(["videoCapture", "geolocation"]));
        assert_eq!(call.params["browserContextId"], "CTX");
        assert_eq!(call.params["origin"], "https://a.test");

        let err = context.grant_permissions(&["telepathy".into()], None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_cookies_are_scoped_to_context() {
        let connection = Arc::new(MockCdpConnection::new());
        connection.respond("Storage.getCookies", |params| {
            assert_eq!(params["browserContextId"], "CTX");
            Ok(json!({ "cookies": [ { "name": "a", "value": "1", "domain": "x.test", "expires": 1.7e9 } ] }))
        });
        let cookies = context(&connection).cookies().await.unwrap();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].expires, Some(1.7e9));
    }

    #[tokio::test]
    async fn test_closed_context_rejects_calls() {
        let connection = Arc::new(MockCdpConnection::new());
        let context = context(&connection);
        context.close().await.unwrap();
        context.close().await.unwrap();
        assert_eq!(connection.calls_to("Target.disposeBrowserContext").len(), 1);
        assert!(context.new_page().await.is_err());
    }
}
