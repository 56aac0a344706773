//! Mock engine implementation for testing
//!
//! An in-memory browser: contexts, pages, frames and elements whose state can be
//! scripted and inspected from tests. Navigation and requests go through the same
//! routing path as a real context, so interception rules can be exercised end to end.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::traits::{
    BoundingBox, BrowserHandle, BrowserLauncher, ClickOptions, ContextHandle, ContextOptions, Cookie,
    ElementHandle, FrameHandle, FulfillResponse, Geolocation, LaunchOptions, LoadState, MouseButton,
    NavigationOptions, PageEvent, PageHandle, Query, RequestInfo, ResponseInfo, RouteHandler, RoutedRequest,
    Viewport,
};
use crate::keys;
use crate::Error;

const DETACHED: &str = "Element is not attached to the DOM";
const MAX_REDIRECTS: usize = 10;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Scripted evaluation: `(function source, args) -> result`
pub type Evaluator = Arc<dyn Fn(&str, &[Value]) -> Result<Value, Error> + Send + Sync>;

/// A page served by the mock network
#[derive(Debug, Clone)]
pub struct MockSite {
    pub title: String,
    pub status: u16,
    /// Delay between commit and the `load` event
    pub load_delay: Duration,
}

impl Default for MockSite {
    fn default() -> Self {
        Self {
            title: String::new(),
            status: 200,
            load_delay: Duration::ZERO,
        }
    }
}

/// Registry of known URLs shared by every page of a launcher
#[derive(Debug, Clone, Default)]
pub struct MockWeb {
    sites: Arc<Mutex<HashMap<String, MockSite>>>,
}

impl MockWeb {
    /// Serve `url` with the given document title
    pub fn add_site(&self, url: &str, title: &str) {
        self.add_site_with(
            url,
            MockSite {
                title: title.to_string(),
                ..Default::default()
            },
        );
    }

    /// Serve `url` with full control over the response
    pub fn add_site_with(&self, url: &str, site: MockSite) {
        lock(&self.sites).insert(url.to_string(), site);
    }

    fn lookup(&self, url: &str) -> MockSite {
        lock(&self.sites).get(url).cloned().unwrap_or_default()
    }
}

/// What happened to a request sent through [`MockPage::fetch`]
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Blocked by a route handler
    Aborted,
    /// Answered by a route handler
    Fulfilled(FulfillResponse),
    /// Went to the (mock) network
    Continued { status: u16 },
}

/// Mock launcher
#[derive(Debug, Default)]
pub struct MockLauncher {
    web: MockWeb,
    browsers: Mutex<Vec<Arc<MockBrowser>>>,
    launches: Mutex<Vec<LaunchOptions>>,
}

impl MockLauncher {
    /// Create a new mock launcher
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared URL registry
    pub fn web(&self) -> &MockWeb {
        &self.web
    }

    /// Options of every launch so far
    pub fn launches(&self) -> Vec<LaunchOptions> {
        lock(&self.launches).clone()
    }

    /// Most recently launched browser
    pub fn browser(&self) -> Option<Arc<MockBrowser>> {
        lock(&self.browsers).last().cloned()
    }

    /// Find a live page by engine id across every browser
    pub fn page(&self, id: &str) -> Option<Arc<MockPage>> {
        let browsers = lock(&self.browsers).clone();
        browsers.iter().find_map(|b| b.find_page(id))
    }
}

#[async_trait]
impl BrowserLauncher for MockLauncher {
    async fn launch(&self, options: &LaunchOptions) -> Result<Arc<dyn BrowserHandle>, Error> {
        lock(&self.launches).push(options.clone());
        let browser = MockBrowser::new(self.web.clone());
        lock(&self.browsers).push(Arc::clone(&browser));
        Ok(browser)
    }
}

/// Mock browser
#[derive(Debug)]
pub struct MockBrowser {
    web: MockWeb,
    contexts: Mutex<Vec<Arc<MockContext>>>,
    connected: AtomicBool,
}

impl MockBrowser {
    fn new(web: MockWeb) -> Arc<Self> {
        Arc::new(Self {
            web,
            contexts: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
        })
    }

    /// Open contexts in creation order
    pub fn contexts(&self) -> Vec<Arc<MockContext>> {
        lock(&self.contexts).clone()
    }

    fn find_page(&self, id: &str) -> Option<Arc<MockPage>> {
        self.contexts()
            .iter()
            .find_map(|c| c.mock_pages().into_iter().find(|p| p.id == id))
    }
}

#[async_trait]
impl BrowserHandle for MockBrowser {
    async fn new_context(&self, options: &ContextOptions) -> Result<Arc<dyn ContextHandle>, Error> {
        if !self.is_connected() {
            return Err(Error::cdp("Browser has been closed"));
        }
        let context = MockContext::new(self.web.clone(), options.clone());
        lock(&self.contexts).push(Arc::clone(&context));
        Ok(context)
    }

    async fn version(&self) -> Result<String, Error> {
        Ok("MockBrowser/1.0".to_string())
    }

    async fn close(&self) -> Result<(), Error> {
        self.connected.store(false, Ordering::SeqCst);
        let contexts: Vec<_> = lock(&self.contexts).drain(..).collect();
        for context in contexts {
            context.close().await?;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Mock browsing context
pub struct MockContext {
    id: String,
    me: Weak<MockContext>,
    web: MockWeb,
    options: ContextOptions,
    pages: Mutex<Vec<Arc<MockPage>>>,
    route: Mutex<Option<RouteHandler>>,
    cookies: Mutex<Vec<Cookie>>,
    permissions: Mutex<Vec<(Option<String>, Vec<String>)>>,
    geolocation: Mutex<Option<Geolocation>>,
    extra_headers: Mutex<HashMap<String, String>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for MockContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockContext")
            .field("id", &self.id)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl MockContext {
    fn new(web: MockWeb, options: ContextOptions) -> Arc<Self> {
        let extra = options.extra_http_headers.clone();
        Arc::new_cyclic(|me| Self {
            id: Uuid::new_v4().to_string(),
            me: me.clone(),
            web,
            options,
            pages: Mutex::new(Vec::new()),
            route: Mutex::new(None),
            cookies: Mutex::new(Vec::new()),
            permissions: Mutex::new(Vec::new()),
            geolocation: Mutex::new(None),
            extra_headers: Mutex::new(extra),
            closed: AtomicBool::new(false),
        })
    }

    /// Options the context was created with
    pub fn options(&self) -> &ContextOptions {
        &self.options
    }

    /// Live pages
    pub fn mock_pages(&self) -> Vec<Arc<MockPage>> {
        lock(&self.pages).clone()
    }

    /// Whether a routing handler is installed
    pub fn is_routed(&self) -> bool {
        lock(&self.route).is_some()
    }

    /// Granted permissions as `(origin, permissions)` pairs
    pub fn permissions(&self) -> Vec<(Option<String>, Vec<String>)> {
        lock(&self.permissions).clone()
    }

    /// Current geolocation override
    pub fn geolocation(&self) -> Option<Geolocation> {
        *lock(&self.geolocation)
    }

    /// Current extra headers
    pub fn extra_headers(&self) -> HashMap<String, String> {
        lock(&self.extra_headers).clone()
    }

    /// Whether the context has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Open a page without going through the driver, as a popup would
    pub fn open_popup(&self, url: &str) -> Arc<MockPage> {
        let page = MockPage::new(self.me.clone(), self.web.clone());
        page.commit(url);
        lock(&self.pages).push(Arc::clone(&page));
        page
    }

    fn remove_page(&self, id: &str) {
        lock(&self.pages).retain(|p| p.id != id);
    }

    fn route_handler(&self) -> Option<RouteHandler> {
        lock(&self.route).clone()
    }
}

fn normalize_cookie(mut cookie: Cookie) -> Result<Cookie, Error> {
    if cookie.domain.is_none() {
        let url = cookie
            .url
            .as_deref()
            .ok_or_else(|| Error::invalid_argument("Cookie should have a url or a domain"))?;
        let parsed = url::Url::parse(url).map_err(|e| Error::invalid_argument(format!("Invalid cookie url: {}", e)))?;
        cookie.domain = parsed.host_str().map(str::to_string);
        if cookie.path.is_none() {
            cookie.path = Some("/".to_string());
        }
    }
    cookie.url = None;
    if cookie.path.is_none() {
        cookie.path = Some("/".to_string());
    }
    Ok(cookie)
}

#[async_trait]
impl ContextHandle for MockContext {
    fn id(&self) -> &str {
        &self.id
    }

    async fn new_page(&self) -> Result<Arc<dyn PageHandle>, Error> {
        if self.is_closed() {
            return Err(Error::cdp("Context has been closed"));
        }
        let page = MockPage::new(self.me.clone(), self.web.clone());
        lock(&self.pages).push(Arc::clone(&page));
        Ok(page)
    }

    async fn pages(&self) -> Result<Vec<Arc<dyn PageHandle>>, Error> {
        Ok(self
            .mock_pages()
            .into_iter()
            .map(|p| p as Arc<dyn PageHandle>)
            .collect())
    }

    async fn close(&self) -> Result<(), Error> {
        self.closed.store(true, Ordering::SeqCst);
        let pages: Vec<_> = lock(&self.pages).drain(..).collect();
        for page in pages {
            page.closed.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn route(&self, handler: RouteHandler) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::cdp("Context has been closed"));
        }
        *lock(&self.route) = Some(handler);
        Ok(())
    }

    async fn unroute(&self) -> Result<(), Error> {
        *lock(&self.route) = None;
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<Cookie>, Error> {
        Ok(lock(&self.cookies).clone())
    }

    async fn add_cookies(&self, cookies: &[Cookie]) -> Result<(), Error> {
        let normalized = cookies
            .iter()
            .cloned()
            .map(normalize_cookie)
            .collect::<Result<Vec<_>, _>>()?;
        let mut jar = lock(&self.cookies);
        for cookie in normalized {
            jar.retain(|c| !(c.name == cookie.name && c.domain == cookie.domain && c.path == cookie.path));
            jar.push(cookie);
        }
        Ok(())
    }

    async fn clear_cookies(&self) -> Result<(), Error> {
        lock(&self.cookies).clear();
        Ok(())
    }

    async fn grant_permissions(&self, permissions: &[String], origin: Option<&str>) -> Result<(), Error> {
        lock(&self.permissions).push((origin.map(str::to_string), permissions.to_vec()));
        Ok(())
    }

    async fn clear_permissions(&self) -> Result<(), Error> {
        lock(&self.permissions).clear();
        Ok(())
    }

    async fn set_geolocation(&self, geolocation: Option<Geolocation>) -> Result<(), Error> {
        *lock(&self.geolocation) = geolocation;
        Ok(())
    }

    async fn set_extra_http_headers(&self, headers: &HashMap<String, String>) -> Result<(), Error> {
        *lock(&self.extra_headers) = headers.clone();
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Document {
    url: String,
    title: String,
    history: Vec<String>,
    index: usize,
}

#[derive(Debug, Default)]
struct Keyboard {
    held: Vec<String>,
    select_all: bool,
}

/// Recorded mouse action
#[derive(Debug, Clone, PartialEq)]
pub enum MouseRecord {
    Move(f64, f64),
    Down(f64, f64, MouseButton),
    Up(f64, f64, MouseButton),
}

/// Mock page
pub struct MockPage {
    id: String,
    me: Weak<MockPage>,
    context: Weak<MockContext>,
    web: MockWeb,
    events: broadcast::Sender<PageEvent>,
    document: Mutex<Document>,
    frames: Mutex<Vec<Arc<MockFrame>>>,
    keyboard: Mutex<Keyboard>,
    focused: Mutex<Option<Arc<MockElement>>>,
    typed: Mutex<String>,
    mouse: Mutex<Vec<MouseRecord>>,
    viewport: Mutex<Option<Viewport>>,
    extra_headers: Mutex<HashMap<String, String>>,
    evaluator: Mutex<Option<Evaluator>>,
    evaluations: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for MockPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPage")
            .field("id", &self.id)
            .field("document", &self.document)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl MockPage {
    fn new(context: Weak<MockContext>, web: MockWeb) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new_cyclic(|me: &Weak<MockPage>| Self {
            id: Uuid::new_v4().to_string(),
            me: me.clone(),
            context,
            web,
            events,
            document: Mutex::new(Document {
                url: "about:blank".to_string(),
                ..Default::default()
            }),
            frames: Mutex::new(vec![MockFrame::new(me.clone(), true)]),
            keyboard: Mutex::new(Keyboard::default()),
            focused: Mutex::new(None),
            typed: Mutex::new(String::new()),
            mouse: Mutex::new(Vec::new()),
            viewport: Mutex::new(None),
            extra_headers: Mutex::new(HashMap::new()),
            evaluator: Mutex::new(None),
            evaluations: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Top-level frame of the current document
    pub fn main_frame(&self) -> Arc<MockFrame> {
        let frames = lock(&self.frames);
        Arc::clone(&frames[0])
    }

    /// Attach a nested frame to the current document
    pub fn add_frame(&self) -> Arc<MockFrame> {
        let frame = MockFrame::new(self.me.clone(), false);
        lock(&self.frames).push(Arc::clone(&frame));
        frame
    }

    /// Add an element to the main frame
    pub fn add_element(&self, element: MockElement) -> Arc<MockElement> {
        self.main_frame().add_element(element)
    }

    /// Script the result of page/frame evaluations
    pub fn set_evaluator(&self, evaluator: Evaluator) {
        *lock(&self.evaluator) = Some(evaluator);
    }

    /// Every function source evaluated so far
    pub fn evaluations(&self) -> Vec<String> {
        lock(&self.evaluations).clone()
    }

    /// Everything typed through the keyboard
    pub fn typed(&self) -> String {
        lock(&self.typed).clone()
    }

    /// Recorded mouse actions
    pub fn mouse_records(&self) -> Vec<MouseRecord> {
        lock(&self.mouse).clone()
    }

    /// Current viewport override
    pub fn viewport(&self) -> Option<Viewport> {
        *lock(&self.viewport)
    }

    /// Current page-level extra headers
    pub fn extra_headers(&self) -> HashMap<String, String> {
        lock(&self.extra_headers).clone()
    }

    /// Emit an arbitrary named event
    pub fn emit(&self, name: &str, payload: Value) {
        let _ = self.events.send(PageEvent::Other {
            name: name.to_string(),
            payload,
        });
    }

    /// Send a request from the page, as a script would
    pub async fn fetch(&self, url: &str, method: &str) -> Result<FetchOutcome, Error> {
        if self.is_closed() {
            return Err(Error::cdp("Target page has been closed"));
        }

        let _ = self.events.send(PageEvent::Request(RequestInfo {
            url: url.to_string(),
            method: method.to_string(),
        }));

        let handler = self.context.upgrade().and_then(|c| c.route_handler());
        let outcome = match handler {
            Some(handler) => {
                let request = Arc::new(MockRequest::new(url, method));
                handler(Arc::clone(&request) as Arc<dyn RoutedRequest>).await?;
                match request.outcome() {
                    Some(FetchOutcome::Continued { .. }) | None => FetchOutcome::Continued {
                        status: self.web.lookup(url).status,
                    },
                    Some(decided) => decided,
                }
            }
            None => FetchOutcome::Continued {
                status: self.web.lookup(url).status,
            },
        };

        let status = match &outcome {
            FetchOutcome::Aborted => None,
            FetchOutcome::Fulfilled(response) => Some(response.status),
            FetchOutcome::Continued { status } => Some(*status),
        };
        if let Some(status) = status {
            let _ = self.events.send(PageEvent::Response(ResponseInfo {
                url: url.to_string(),
                status,
            }));
        }

        Ok(outcome)
    }

    fn commit(&self, url: &str) {
        let site = self.web.lookup(url);
        {
            let mut doc = lock(&self.document);
            let keep = if doc.history.is_empty() { 0 } else { doc.index + 1 };
            doc.history.truncate(keep);
            doc.history.push(url.to_string());
            doc.index = doc.history.len() - 1;
            doc.url = url.to_string();
            doc.title = site.title;
        }
        self.reset_document();
    }

    fn reset_document(&self) {
        *lock(&self.frames) = vec![MockFrame::new(self.me.clone(), true)];
        *lock(&self.focused) = None;
        let url = lock(&self.document).url.clone();
        let _ = self.events.send(PageEvent::FrameNavigated { url });
        let _ = self.events.send(PageEvent::Lifecycle(LoadState::DomContentLoaded));
    }

    async fn finish_load(&self, url: &str) {
        let site = self.web.lookup(url);
        if !site.load_delay.is_zero() {
            tokio::time::sleep(site.load_delay).await;
        }
        let _ = self.events.send(PageEvent::Lifecycle(LoadState::Load));
        let _ = self.events.send(PageEvent::Lifecycle(LoadState::NetworkIdle));
    }

    async fn navigate(&self, url: &str) -> Result<(), Error> {
        let mut target = url.to_string();
        for _ in 0..MAX_REDIRECTS {
            match self.fetch(&target, "GET").await? {
                FetchOutcome::Aborted => {
                    return Err(Error::navigation_failed(format!(
                        "net::ERR_BLOCKED_BY_CLIENT at {}",
                        target
                    )))
                }
                FetchOutcome::Fulfilled(response) if (300..400).contains(&response.status) => {
                    let location = response
                        .headers
                        .iter()
                        .find(|(k, _)| k.eq_ignore_ascii_case("location"))
                        .map(|(_, v)| v.clone());
                    match location {
                        Some(location) => target = location,
                        None => break,
                    }
                }
                _ => break,
            }
        }
        self.commit(&target);
        self.finish_load(&target).await;
        Ok(())
    }

    fn find_element(&self, target: &MockElement) -> Option<Arc<MockElement>> {
        let frames = lock(&self.frames).clone();
        frames.iter().find_map(|f| f.find_arc(target))
    }

    fn focused(&self) -> Option<Arc<MockElement>> {
        lock(&self.focused).clone()
    }

    fn set_focus(&self, element: &Arc<MockElement>) {
        *lock(&self.focused) = Some(Arc::clone(element));
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.is_closed() {
            Err(Error::cdp("Target page has been closed"))
        } else {
            Ok(())
        }
    }

    fn run_evaluator(&self, function: &str, args: &[Value]) -> Result<Value, Error> {
        lock(&self.evaluations).push(function.to_string());
        let evaluator = lock(&self.evaluator).clone();
        match evaluator {
            Some(evaluator) => evaluator(function, args),
            None => Ok(Value::Null),
        }
    }
}

#[async_trait]
impl PageHandle for MockPage {
    fn id(&self) -> &str {
        &self.id
    }

    async fn url(&self) -> Result<String, Error> {
        self.ensure_open()?;
        Ok(lock(&self.document).url.clone())
    }

    async fn title(&self) -> Result<String, Error> {
        self.ensure_open()?;
        Ok(lock(&self.document).title.clone())
    }

    async fn goto(&self, url: &str, options: &NavigationOptions) -> Result<(), Error> {
        self.ensure_open()?;
        tokio::time::timeout(options.timeout, self.navigate(url))
            .await
            .map_err(|_| {
                Error::timeout(format!(
                    "Navigation to {} exceeded {}ms",
                    url,
                    options.timeout.as_millis()
                ))
            })?
    }

    async fn reload(&self, _options: &NavigationOptions) -> Result<(), Error> {
        self.ensure_open()?;
        let url = lock(&self.document).url.clone();
        self.reset_document();
        self.finish_load(&url).await;
        Ok(())
    }

    async fn go_back(&self, _options: &NavigationOptions) -> Result<bool, Error> {
        self.ensure_open()?;
        let url = {
            let mut doc = lock(&self.document);
            if doc.index == 0 {
                return Ok(false);
            }
            doc.index -= 1;
            doc.url = doc.history[doc.index].clone();
            doc.title = self.web.lookup(&doc.url).title;
            doc.url.clone()
        };
        self.reset_document();
        self.finish_load(&url).await;
        Ok(true)
    }

    async fn go_forward(&self, _options: &NavigationOptions) -> Result<bool, Error> {
        self.ensure_open()?;
        let url = {
            let mut doc = lock(&self.document);
            if doc.index + 1 >= doc.history.len() {
                return Ok(false);
            }
            doc.index += 1;
            doc.url = doc.history[doc.index].clone();
            doc.title = self.web.lookup(&doc.url).title;
            doc.url.clone()
        };
        self.reset_document();
        self.finish_load(&url).await;
        Ok(true)
    }

    async fn frames(&self) -> Result<Vec<Arc<dyn FrameHandle>>, Error> {
        self.ensure_open()?;
        Ok(lock(&self.frames)
            .iter()
            .map(|f| Arc::clone(f) as Arc<dyn FrameHandle>)
            .collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.events.subscribe()
    }

    async fn evaluate(&self, function: &str, args: &[Value]) -> Result<Value, Error> {
        self.ensure_open()?;
        self.run_evaluator(function, args)
    }

    async fn type_text(&self, text: &str) -> Result<(), Error> {
        self.ensure_open()?;
        lock(&self.typed).push_str(text);
        if let Some(element) = self.focused() {
            element.check_attached()?;
            lock(&element.state).value.push_str(text);
        }
        Ok(())
    }

    async fn key_down(&self, key: &str) -> Result<(), Error> {
        self.ensure_open()?;
        let stroke = keys::describe(key)?;
        let focused = self.focused();
        let mut keyboard = lock(&self.keyboard);
        let modified = keyboard.held.iter().any(|k| k == "Control" || k == "Meta");

        match stroke.key.as_str() {
            "Delete" | "Backspace" => {
                if let Some(element) = &focused {
                    let mut state = lock(&element.state);
                    if keyboard.select_all {
                        state.value.clear();
                    } else {
                        state.value.pop();
                    }
                }
                keyboard.select_all = false;
            }
            _ if modified && stroke.code == "KeyA" => keyboard.select_all = true,
            _ if stroke.modifier_bit() == 0 && !modified => {
                if let (Some(text), Some(element)) = (&stroke.text, &focused) {
                    if text != "\r" {
                        lock(&element.state).value.push_str(text);
                    }
                }
                keyboard.select_all = false;
            }
            _ => {}
        }

        keyboard.held.push(stroke.key);
        Ok(())
    }

    async fn key_up(&self, key: &str) -> Result<(), Error> {
        self.ensure_open()?;
        let stroke = keys::describe(key)?;
        let mut keyboard = lock(&self.keyboard);
        if let Some(pos) = keyboard.held.iter().rposition(|k| *k == stroke.key) {
            keyboard.held.remove(pos);
        }
        Ok(())
    }

    async fn mouse_move(&self, x: f64, y: f64) -> Result<(), Error> {
        self.ensure_open()?;
        lock(&self.mouse).push(MouseRecord::Move(x, y));
        Ok(())
    }

    async fn mouse_down(&self, x: f64, y: f64, button: MouseButton) -> Result<(), Error> {
        self.ensure_open()?;
        lock(&self.mouse).push(MouseRecord::Down(x, y, button));
        Ok(())
    }

    async fn mouse_up(&self, x: f64, y: f64, button: MouseButton) -> Result<(), Error> {
        self.ensure_open()?;
        lock(&self.mouse).push(MouseRecord::Up(x, y, button));
        Ok(())
    }

    async fn set_viewport(&self, viewport: Viewport) -> Result<(), Error> {
        self.ensure_open()?;
        *lock(&self.viewport) = Some(viewport);
        Ok(())
    }

    async fn set_extra_http_headers(&self, headers: &HashMap<String, String>) -> Result<(), Error> {
        self.ensure_open()?;
        *lock(&self.extra_headers) = headers.clone();
        Ok(())
    }

    async fn screenshot(&self, _clip: Option<BoundingBox>) -> Result<Vec<u8>, Error> {
        self.ensure_open()?;
        Ok(b"\x89PNG\r\n\x1a\n".to_vec())
    }

    async fn close(&self) -> Result<(), Error> {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(context) = self.context.upgrade() {
            context.remove_page(&self.id);
        }
        self.emit("close", Value::Null);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Mock frame
#[derive(Debug)]
pub struct MockFrame {
    id: String,
    main: bool,
    page: Weak<MockPage>,
    elements: Mutex<Vec<Arc<MockElement>>>,
    query_delay: Mutex<Duration>,
    queries: AtomicUsize,
}

impl MockFrame {
    fn new(page: Weak<MockPage>, main: bool) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            main,
            page,
            elements: Mutex::new(Vec::new()),
            query_delay: Mutex::new(Duration::ZERO),
            queries: AtomicUsize::new(0),
        })
    }

    /// Add a top-level element to this frame
    pub fn add_element(&self, element: MockElement) -> Arc<MockElement> {
        let element = Arc::new(element);
        element.bind(&self.page);
        lock(&self.elements).push(Arc::clone(&element));
        element
    }

    /// Delay every lookup in this frame
    pub fn set_query_delay(&self, delay: Duration) {
        *lock(&self.query_delay) = delay;
    }

    /// Number of lookups performed
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameHandle for MockFrame {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_main(&self) -> bool {
        self.main
    }

    async fn query_all(&self, query: &Query) -> Result<Vec<Arc<dyn ElementHandle>>, Error> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.query_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let roots = lock(&self.elements).clone();
        let mut found = Vec::new();
        for root in roots {
            root.collect_matches(query, true, &mut found);
        }
        Ok(found)
    }

    async fn evaluate(&self, function: &str, args: &[Value]) -> Result<Value, Error> {
        match self.page.upgrade() {
            Some(page) => page.run_evaluator(function, args),
            None => Err(Error::cdp("Frame was detached")),
        }
    }
}

/// Side effect of clicking a mock element
#[derive(Debug, Clone)]
pub enum ClickEffect {
    /// Navigate the page
    Navigate(String),
    /// Issue a request, optionally after a delay
    Request { url: String, method: String, delay: Duration },
    /// Remove the element from the document
    Detach,
}

#[derive(Debug, Clone)]
struct ElementState {
    text: String,
    value: String,
    attributes: HashMap<String, String>,
    visible: bool,
    attached: bool,
    checked: bool,
    options: Vec<String>,
    selected: Vec<String>,
    files: Vec<PathBuf>,
    bounding_box: BoundingBox,
    eval_result: Value,
}

impl Default for ElementState {
    fn default() -> Self {
        Self {
            text: String::new(),
            value: String::new(),
            attributes: HashMap::new(),
            visible: true,
            attached: true,
            checked: false,
            options: Vec::new(),
            selected: Vec::new(),
            files: Vec::new(),
            bounding_box: BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 100.0,
                height: 20.0,
            },
            eval_result: Value::Null,
        }
    }
}

/// Mock DOM element, built with chained setters before being added to a frame
#[derive(Debug)]
pub struct MockElement {
    tag: String,
    selectors: Vec<String>,
    state: Mutex<ElementState>,
    children: Vec<Arc<MockElement>>,
    effects: Vec<ClickEffect>,
    page: Mutex<Weak<MockPage>>,
    clicks: AtomicUsize,
    hovers: AtomicUsize,
    evaluations: Mutex<Vec<String>>,
}

impl MockElement {
    /// New element with a tag name
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            selectors: Vec::new(),
            state: Mutex::new(ElementState::default()),
            children: Vec::new(),
            effects: Vec::new(),
            page: Mutex::new(Weak::new()),
            clicks: AtomicUsize::new(0),
            hovers: AtomicUsize::new(0),
            evaluations: Mutex::new(Vec::new()),
        }
    }

    fn state_mut(&mut self) -> &mut ElementState {
        self.state.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make the element answer to a CSS or XPath selector
    pub fn selector(mut self, selector: &str) -> Self {
        self.selectors.push(selector.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.state_mut().text = text.to_string();
        self
    }

    pub fn value(mut self, value: &str) -> Self {
        self.state_mut().value = value.to_string();
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.state_mut().attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.state_mut().visible = false;
        self
    }

    pub fn checked(mut self, checked: bool) -> Self {
        self.state_mut().checked = checked;
        self
    }

    /// `<option>` values of a select element
    pub fn options(mut self, options: &[&str]) -> Self {
        self.state_mut().options = options.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn bounding_box(mut self, bounding_box: BoundingBox) -> Self {
        self.state_mut().bounding_box = bounding_box;
        self
    }

    /// Result returned by element evaluations
    pub fn eval_result(mut self, value: Value) -> Self {
        self.state_mut().eval_result = value;
        self
    }

    pub fn child(mut self, child: MockElement) -> Self {
        self.children.push(Arc::new(child));
        self
    }

    pub fn on_click(mut self, effect: ClickEffect) -> Self {
        self.effects.push(effect);
        self
    }

    /// Remove the element from its document
    pub fn detach(&self) {
        lock(&self.state).attached = false;
    }

    /// Show or hide the element
    pub fn set_visible(&self, visible: bool) {
        lock(&self.state).visible = visible;
    }

    pub fn current_value(&self) -> String {
        lock(&self.state).value.clone()
    }

    pub fn is_checked_now(&self) -> bool {
        lock(&self.state).checked
    }

    pub fn selected_options(&self) -> Vec<String> {
        lock(&self.state).selected.clone()
    }

    pub fn files(&self) -> Vec<PathBuf> {
        lock(&self.state).files.clone()
    }

    pub fn click_count(&self) -> usize {
        self.clicks.load(Ordering::SeqCst)
    }

    pub fn hover_count(&self) -> usize {
        self.hovers.load(Ordering::SeqCst)
    }

    /// Function sources evaluated against this element
    pub fn evaluations(&self) -> Vec<String> {
        lock(&self.evaluations).clone()
    }

    fn bind(&self, page: &Weak<MockPage>) {
        *lock(&self.page) = page.clone();
        for child in &self.children {
            child.bind(page);
        }
    }

    fn check_attached(&self) -> Result<(), Error> {
        if lock(&self.state).attached {
            Ok(())
        } else {
            Err(Error::cdp(DETACHED))
        }
    }

    fn matches(&self, query: &Query) -> bool {
        let state = lock(&self.state);
        match query {
            Query::Css(selector) => self.selectors.iter().any(|s| s == selector) || self.tag == *selector,
            Query::XPath(xpath) => {
                if self.selectors.iter().any(|s| s == xpath) {
                    return true;
                }
                if let Some(text) = xpath_literal(xpath, "//*[text()=\"") {
                    return state.text == text;
                }
                if let Some(value) = xpath_literal(xpath, "//*[@*=\"") {
                    return state.attributes.values().any(|v| *v == value);
                }
                false
            }
            Query::Text(text) => state.text.contains(text.as_str()),
        }
    }

    fn collect_matches(self: &Arc<Self>, query: &Query, include_self: bool, found: &mut Vec<Arc<dyn ElementHandle>>) {
        if !lock(&self.state).attached {
            return;
        }
        if include_self && self.matches(query) {
            found.push(Arc::clone(self) as Arc<dyn ElementHandle>);
        }
        for child in &self.children {
            child.collect_matches(query, true, found);
        }
    }

    fn page(&self) -> Result<Arc<MockPage>, Error> {
        lock(&self.page)
            .upgrade()
            .ok_or_else(|| Error::cdp(DETACHED))
    }
}

fn xpath_literal(xpath: &str, prefix: &str) -> Option<String> {
    xpath
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_suffix("\"]"))
        .map(str::to_string)
}

#[async_trait]
impl ElementHandle for MockElement {
    async fn query_all(&self, query: &Query) -> Result<Vec<Arc<dyn ElementHandle>>, Error> {
        self.check_attached()?;
        let mut found = Vec::new();
        for child in &self.children {
            child.collect_matches(query, true, &mut found);
        }
        Ok(found)
    }

    async fn is_attached(&self) -> Result<bool, Error> {
        Ok(lock(&self.state).attached)
    }

    async fn is_visible(&self) -> Result<bool, Error> {
        let state = lock(&self.state);
        Ok(state.attached && state.visible)
    }

    async fn text(&self) -> Result<String, Error> {
        self.check_attached()?;
        Ok(lock(&self.state).text.clone())
    }

    async fn value(&self) -> Result<String, Error> {
        self.check_attached()?;
        Ok(lock(&self.state).value.clone())
    }

    async fn click(&self, _options: &ClickOptions) -> Result<(), Error> {
        self.check_attached()?;
        let page = self.page()?;
        self.clicks.fetch_add(1, Ordering::SeqCst);

        {
            let mut state = lock(&self.state);
            let kind = state.attributes.get("type").cloned().unwrap_or_default();
            if kind == "checkbox" {
                state.checked = !state.checked;
            } else if kind == "radio" {
                state.checked = true;
            }
        }
        if let Some(me) = page.find_element(self) {
            page.set_focus(&me);
        }

        for effect in self.effects.clone() {
            match effect {
                ClickEffect::Navigate(url) => page.navigate(&url).await?,
                ClickEffect::Request { url, method, delay } if delay.is_zero() => {
                    page.fetch(&url, &method).await?;
                }
                ClickEffect::Request { url, method, delay } => {
                    let page = Arc::clone(&page);
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = page.fetch(&url, &method).await;
                    });
                }
                ClickEffect::Detach => self.detach(),
            }
        }
        Ok(())
    }

    async fn hover(&self) -> Result<(), Error> {
        self.check_attached()?;
        self.hovers.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn focus(&self) -> Result<(), Error> {
        self.check_attached()?;
        let page = self.page()?;
        if let Some(me) = page.find_element(self) {
            page.set_focus(&me);
        }
        Ok(())
    }

    async fn fill(&self, text: &str) -> Result<(), Error> {
        self.check_attached()?;
        lock(&self.state).value = text.to_string();
        Ok(())
    }

    async fn select_option(&self, value: &str) -> Result<Vec<String>, Error> {
        self.check_attached()?;
        let mut state = lock(&self.state);
        if !state.options.iter().any(|o| o == value) {
            return Ok(Vec::new());
        }
        state.selected = vec![value.to_string()];
        state.value = value.to_string();
        Ok(state.selected.clone())
    }

    async fn set_checked(&self, checked: bool) -> Result<(), Error> {
        self.check_attached()?;
        lock(&self.state).checked = checked;
        Ok(())
    }

    async fn is_checked(&self) -> Result<bool, Error> {
        self.check_attached()?;
        Ok(lock(&self.state).checked)
    }

    async fn set_input_files(&self, files: &[PathBuf]) -> Result<(), Error> {
        self.check_attached()?;
        lock(&self.state).files = files.to_vec();
        Ok(())
    }

    async fn bounding_box(&self) -> Result<Option<BoundingBox>, Error> {
        self.check_attached()?;
        let state = lock(&self.state);
        Ok(state.visible.then_some(state.bounding_box))
    }

    async fn scroll_into_view(&self) -> Result<(), Error> {
        self.check_attached()
    }

    async fn evaluate(&self, function: &str, _args: &[Value]) -> Result<Value, Error> {
        self.check_attached()?;
        lock(&self.evaluations).push(function.to_string());
        Ok(lock(&self.state).eval_result.clone())
    }
}

impl MockFrame {
    fn find_arc(&self, target: &MockElement) -> Option<Arc<MockElement>> {
        fn walk(element: &Arc<MockElement>, target: *const MockElement) -> Option<Arc<MockElement>> {
            if std::ptr::eq(Arc::as_ptr(element), target) {
                return Some(Arc::clone(element));
            }
            element.children.iter().find_map(|c| walk(c, target))
        }
        lock(&self.elements)
            .iter()
            .find_map(|e| walk(e, target as *const MockElement))
    }
}

/// Routed request handed to route handlers by [`MockPage::fetch`]
#[derive(Debug)]
pub struct MockRequest {
    url: String,
    method: String,
    headers: HashMap<String, String>,
    outcome: Mutex<Option<FetchOutcome>>,
}

impl MockRequest {
    fn new(url: &str, method: &str) -> Self {
        Self {
            url: url.to_string(),
            method: method.to_string(),
            headers: HashMap::new(),
            outcome: Mutex::new(None),
        }
    }

    fn outcome(&self) -> Option<FetchOutcome> {
        lock(&self.outcome).clone()
    }

    fn decide(&self, outcome: FetchOutcome) -> Result<(), Error> {
        let mut slot = lock(&self.outcome);
        if slot.is_some() {
            return Err(Error::cdp("Route is already handled"));
        }
        *slot = Some(outcome);
        Ok(())
    }
}

#[async_trait]
impl RoutedRequest for MockRequest {
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
        None
    }

    async fn abort(&self) -> Result<(), Error> {
        self.decide(FetchOutcome::Aborted)
    }

    async fn fulfill(&self, response: FulfillResponse) -> Result<(), Error> {
        self.decide(FetchOutcome::Fulfilled(response))
    }

    async fn proceed(&self) -> Result<(), Error> {
        self.decide(FetchOutcome::Continued { status: 200 })
    }
}
