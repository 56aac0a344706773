//! Engine handle traits
//!
//! This module defines the abstract interfaces the driver uses to talk to a browser engine:
//! browser, browsing context, page, frame, element and routed request.

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Options for launching (or attaching to) a browser
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Headless mode (no GUI)
    pub headless: bool,
    /// Additional arguments passed to the browser
    pub args: Vec<String>,
    /// Browser executable path
    pub executable_path: Option<String>,
    /// CDP endpoint of an already running browser (e.g. "http://localhost:9222")
    pub cdp_endpoint: Option<String>,
}

/// Viewport size in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Options for creating a browsing context
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    pub viewport: Option<Viewport>,
    pub user_agent: Option<String>,
    pub device_scale_factor: Option<f64>,
    pub is_mobile: bool,
    pub has_touch: bool,
    /// Headers added to every request of the context
    pub extra_http_headers: HashMap<String, String>,
}

/// Page load state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    #[default]
    Load,
    DomContentLoaded,
    #[serde(alias = "networkidle0", alias = "networkidle2")]
    NetworkIdle,
}

impl LoadState {
    /// Event name as reported by the page
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadState::Load => "load",
            LoadState::DomContentLoaded => "domcontentloaded",
            LoadState::NetworkIdle => "networkidle",
        }
    }
}

/// Navigation options
#[derive(Debug, Clone)]
pub struct NavigationOptions {
    /// Overall deadline
    pub timeout: Duration,
    /// Lifecycle event that marks the navigation as complete
    pub wait_until: LoadState,
}

impl Default for NavigationOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(30000),
            wait_until: LoadState::Load,
        }
    }
}

/// Element bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// Center point
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Mouse button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MouseButton {
    #[default]
    Left,
    Middle,
    Right,
}

impl MouseButton {
    pub fn as_str(&self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Middle => "middle",
            MouseButton::Right => "right",
        }
    }
}

/// Click options
#[derive(Debug, Clone)]
pub struct ClickOptions {
    pub button: MouseButton,
    pub click_count: u32,
}

impl Default for ClickOptions {
    fn default() -> Self {
        Self {
            button: MouseButton::Left,
            click_count: 1,
        }
    }
}

/// Geolocation override
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geolocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub accuracy: Option<f64>,
}

/// Cookie SameSite attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

/// A browser cookie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Either `url` or `domain` must be set when adding a cookie
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Expiry as seconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<SameSite>,
}

/// A network request observed on a page
#[derive(Debug, Clone, PartialEq)]
pub struct RequestInfo {
    pub url: String,
    pub method: String,
}

/// A network response observed on a page
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseInfo {
    pub url: String,
    pub status: u16,
}

/// Page events fanned out to subscribers
#[derive(Debug, Clone)]
pub enum PageEvent {
    Request(RequestInfo),
    Response(ResponseInfo),
    Lifecycle(LoadState),
    FrameNavigated { url: String },
    /// Anything else the engine reports (console, dialog, popup, close...)
    Other { name: String, payload: Value },
}

impl PageEvent {
    /// Event name as used in `waitForEvent`
    pub fn name(&self) -> &str {
        match self {
            PageEvent::Request(_) => "request",
            PageEvent::Response(_) => "response",
            PageEvent::Lifecycle(state) => state.as_str(),
            PageEvent::FrameNavigated { .. } => "framenavigated",
            PageEvent::Other { name, .. } => name,
        }
    }
}

/// Element lookup strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Css(String),
    XPath(String),
    /// Elements whose own text contains the string
    Text(String),
}

impl Query {
    /// Classify a raw pattern: `//`, `(` and `./` start XPath, `text=` starts a text search
    pub fn parse(pattern: &str) -> Query {
        if let Some(text) = pattern.strip_prefix("text=") {
            Query::Text(text.to_string())
        } else if pattern.starts_with("//") || pattern.starts_with("./") || pattern.starts_with('(') {
            Query::XPath(pattern.to_string())
        } else {
            Query::Css(pattern.to_string())
        }
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Query::Css(s) | Query::XPath(s) => f.write_str(s),
            Query::Text(s) => write!(f, "text={}", s),
        }
    }
}

/// Response used to fulfil a routed request
#[derive(Debug, Clone, PartialEq)]
pub struct FulfillResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

/// Handler invoked for every request of a routed context
pub type RouteHandler =
    Arc<dyn Fn(Arc<dyn RoutedRequest>) -> BoxFuture<'static, Result<(), crate::Error>> + Send + Sync>;

/// A paused request waiting for a routing decision
#[async_trait]
pub trait RoutedRequest: Send + Sync + std::fmt::Debug {
    /// Request URL
    fn url(&self) -> &str;

    /// HTTP method
    fn method(&self) -> &str;

    /// Request headers
    fn headers(&self) -> &HashMap<String, String>;

    /// Request body, if any
    fn post_data(&self) -> Option<&str>;

    /// Fail the request as blocked by the client
    async fn abort(&self) -> Result<(), crate::Error>;

    /// Answer the request without touching the network
    async fn fulfill(&self, response: FulfillResponse) -> Result<(), crate::Error>;

    /// Let the request proceed unmodified
    async fn proceed(&self) -> Result<(), crate::Error>;
}

/// Browser launcher
#[async_trait]
pub trait BrowserLauncher: Send + Sync + std::fmt::Debug {
    /// Launch a browser (or attach to a running one)
    async fn launch(&self, options: &LaunchOptions) -> Result<Arc<dyn BrowserHandle>, crate::Error>;
}

/// A running browser
#[async_trait]
pub trait BrowserHandle: Send + Sync + std::fmt::Debug {
    /// Create an isolated browsing context
    async fn new_context(&self, options: &ContextOptions) -> Result<Arc<dyn ContextHandle>, crate::Error>;

    /// Browser product/version string
    async fn version(&self) -> Result<String, crate::Error>;

    /// Close the browser and everything in it
    async fn close(&self) -> Result<(), crate::Error>;

    /// Whether the browser is still reachable
    fn is_connected(&self) -> bool;
}

/// An isolated browsing context (own cookies and storage)
#[async_trait]
pub trait ContextHandle: Send + Sync + std::fmt::Debug {
    /// Engine identifier
    fn id(&self) -> &str;

    /// Open a blank page
    async fn new_page(&self) -> Result<Arc<dyn PageHandle>, crate::Error>;

    /// Live pages in creation order
    async fn pages(&self) -> Result<Vec<Arc<dyn PageHandle>>, crate::Error>;

    /// Close the context and its pages
    async fn close(&self) -> Result<(), crate::Error>;

    /// Route every request of every page through `handler`
    async fn route(&self, handler: RouteHandler) -> Result<(), crate::Error>;

    /// Remove the routing handler
    async fn unroute(&self) -> Result<(), crate::Error>;

    /// All cookies of the context
    async fn cookies(&self) -> Result<Vec<Cookie>, crate::Error>;

    /// Add or replace cookies
    async fn add_cookies(&self, cookies: &[Cookie]) -> Result<(), crate::Error>;

    /// Remove every cookie
    async fn clear_cookies(&self) -> Result<(), crate::Error>;

    /// Grant permissions, optionally for a single origin
    async fn grant_permissions(&self, permissions: &[String], origin: Option<&str>) -> Result<(), crate::Error>;

    /// Drop all permission overrides
    async fn clear_permissions(&self) -> Result<(), crate::Error>;

    /// Override (or with `None` clear) the geolocation
    async fn set_geolocation(&self, geolocation: Option<Geolocation>) -> Result<(), crate::Error>;

    /// Replace the extra headers sent with every request
    async fn set_extra_http_headers(&self, headers: &HashMap<String, String>) -> Result<(), crate::Error>;
}

/// A single tab
#[async_trait]
pub trait PageHandle: Send + Sync + std::fmt::Debug {
    /// Engine identifier
    fn id(&self) -> &str;

    /// Current URL
    async fn url(&self) -> Result<String, crate::Error>;

    /// Document title
    async fn title(&self) -> Result<String, crate::Error>;

    /// Navigate and wait for `options.wait_until`
    async fn goto(&self, url: &str, options: &NavigationOptions) -> Result<(), crate::Error>;

    /// Reload the page
    async fn reload(&self, options: &NavigationOptions) -> Result<(), crate::Error>;

    /// Go back in history; `false` when there is nothing to go back to
    async fn go_back(&self, options: &NavigationOptions) -> Result<bool, crate::Error>;

    /// Go forward in history; `false` when there is nothing to go forward to
    async fn go_forward(&self, options: &NavigationOptions) -> Result<bool, crate::Error>;

    /// Main frame followed by every nested frame
    async fn frames(&self) -> Result<Vec<Arc<dyn FrameHandle>>, crate::Error>;

    /// Subscribe to page events
    fn subscribe(&self) -> broadcast::Receiver<PageEvent>;

    /// Call `function` in the page with JSON arguments and return its JSON result
    async fn evaluate(&self, function: &str, args: &[Value]) -> Result<Value, crate::Error>;

    /// Type text into the focused element
    async fn type_text(&self, text: &str) -> Result<(), crate::Error>;

    /// Press and hold a key
    async fn key_down(&self, key: &str) -> Result<(), crate::Error>;

    /// Release a key
    async fn key_up(&self, key: &str) -> Result<(), crate::Error>;

    /// Move the mouse
    async fn mouse_move(&self, x: f64, y: f64) -> Result<(), crate::Error>;

    /// Press a mouse button at a position
    async fn mouse_down(&self, x: f64, y: f64, button: MouseButton) -> Result<(), crate::Error>;

    /// Release a mouse button at a position
    async fn mouse_up(&self, x: f64, y: f64, button: MouseButton) -> Result<(), crate::Error>;

    /// Resize the viewport
    async fn set_viewport(&self, viewport: Viewport) -> Result<(), crate::Error>;

    /// Replace the extra headers sent with this page's requests
    async fn set_extra_http_headers(&self, headers: &HashMap<String, String>) -> Result<(), crate::Error>;

    /// PNG screenshot, optionally clipped
    async fn screenshot(&self, clip: Option<BoundingBox>) -> Result<Vec<u8>, crate::Error>;

    /// Close the page
    async fn close(&self) -> Result<(), crate::Error>;

    /// Whether the page has been closed
    fn is_closed(&self) -> bool;
}

/// A frame of a page
#[async_trait]
pub trait FrameHandle: Send + Sync + std::fmt::Debug {
    /// Engine identifier
    fn id(&self) -> &str;

    /// Whether this is the top-level frame
    fn is_main(&self) -> bool;

    /// All elements matching the query, in document order
    async fn query_all(&self, query: &Query) -> Result<Vec<Arc<dyn ElementHandle>>, crate::Error>;

    /// Call `function` in the frame
    async fn evaluate(&self, function: &str, args: &[Value]) -> Result<Value, crate::Error>;
}

/// A live DOM element
#[async_trait]
pub trait ElementHandle: Send + Sync + std::fmt::Debug {
    /// Descendants matching the query
    async fn query_all(&self, query: &Query) -> Result<Vec<Arc<dyn ElementHandle>>, crate::Error>;

    /// Whether the element is still connected to its document
    async fn is_attached(&self) -> Result<bool, crate::Error>;

    /// Whether the element is rendered and not hidden
    async fn is_visible(&self) -> Result<bool, crate::Error>;

    /// Text content
    async fn text(&self) -> Result<String, crate::Error>;

    /// Form value (`""` for elements without one)
    async fn value(&self) -> Result<String, crate::Error>;

    /// Click the element center
    async fn click(&self, options: &ClickOptions) -> Result<(), crate::Error>;

    /// Move the mouse over the element
    async fn hover(&self) -> Result<(), crate::Error>;

    /// Focus the element
    async fn focus(&self) -> Result<(), crate::Error>;

    /// Replace the element's value with `text`
    async fn fill(&self, text: &str) -> Result<(), crate::Error>;

    /// Select the options of a `<select>` whose value or label is `value`
    async fn select_option(&self, value: &str) -> Result<Vec<String>, crate::Error>;

    /// Check or uncheck a checkbox/radio
    async fn set_checked(&self, checked: bool) -> Result<(), crate::Error>;

    /// Checked state
    async fn is_checked(&self) -> Result<bool, crate::Error>;

    /// Set the files of an `<input type=file>`
    async fn set_input_files(&self, files: &[PathBuf]) -> Result<(), crate::Error>;

    /// Box in viewport coordinates; `None` when not rendered
    async fn bounding_box(&self) -> Result<Option<BoundingBox>, crate::Error>;

    /// Scroll the element into view if needed
    async fn scroll_into_view(&self) -> Result<(), crate::Error>;

    /// Call `function(element, ...args)` and return its JSON result
    async fn evaluate(&self, function: &str, args: &[Value]) -> Result<Value, crate::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_parse() {
        assert_eq!(Query::parse("#login"), Query::Css("#login".to_string()));
        assert_eq!(Query::parse("//div[@id='a']"), Query::XPath("//div[@id='a']".to_string()));
        assert_eq!(Query::parse("(//a)[2]"), Query::XPath("(//a)[2]".to_string()));
        assert_eq!(Query::parse("text=Sign in"), Query::Text("Sign in".to_string()));
    }

    #[test]
    fn test_load_state_names() {
        let state: LoadState = serde_json::from_value(serde_json::json!("networkidle0")).unwrap();
        assert_eq!(state, LoadState::NetworkIdle);
        assert_eq!(PageEvent::Lifecycle(LoadState::DomContentLoaded).name(), "domcontentloaded");
    }

    #[test]
    fn test_bounding_box_center() {
        let b = BoundingBox { x: 10.0, y: 20.0, width: 100.0, height: 50.0 };
        assert_eq!(b.center(), (60.0, 45.0));
    }
}
