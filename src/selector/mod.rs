//! 元素选择器模块
//!
//! A [`Selector`] is a deferred reference to a DOM element. It holds a pattern
//! (or an already resolved handle) and is resolved against the live frames of
//! its page only when an operation needs the element.

pub mod poll;
pub mod resolver;

use crate::config::Settings;
use crate::session::traits::{ElementHandle, PageHandle};
use crate::{Error, Result};
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

const ELEMENTS_ABOVE_JS: &str = r#"function () {
    const rect = this.getBoundingClientRect();
    const inset = 1;
    const points = [
        [rect.left + inset, rect.top + inset],
        [rect.right - inset, rect.top + inset],
        [rect.left + inset, rect.bottom - inset],
        [rect.right - inset, rect.bottom - inset],
    ];
    return points.some(([x, y]) => {
        const top = document.elementFromPoint(x, y);
        return top !== null && top !== this && !this.contains(top) && !top.contains(this);
    });
}"#;

/// How a selector looks for its element
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolveOptions {
    /// Retry until found instead of failing on the first miss
    pub implicit_wait: bool,
    pub retry_interval: Duration,
    pub retry_timeout: Duration,
    /// Also match elements that are not rendered
    pub match_hidden: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            implicit_wait: false,
            retry_interval: Duration::from_millis(100),
            retry_timeout: Duration::from_millis(10000),
            match_hidden: false,
        }
    }
}

impl From<&Settings> for ResolveOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            implicit_wait: settings.implicit_wait,
            retry_interval: settings.retry_interval,
            retry_timeout: settings.retry_timeout,
            match_hidden: settings.match_hidden_element,
        }
    }
}

#[derive(Debug, Clone)]
enum Target {
    Pattern(String),
    Bound(Arc<dyn ElementHandle>),
    Child { parent: Selector, pattern: String },
}

#[derive(Debug)]
struct SelectorInner {
    target: Target,
    page: Arc<dyn PageHandle>,
    options: ResolveOptions,
    cache: OnceCell<Arc<dyn ElementHandle>>,
}

/// Lazy element reference
#[derive(Debug, Clone)]
pub struct Selector {
    inner: Arc<SelectorInner>,
}

impl Selector {
    fn with_target(page: Arc<dyn PageHandle>, target: Target, options: ResolveOptions) -> Self {
        Self {
            inner: Arc::new(SelectorInner {
                target,
                page,
                options,
                cache: OnceCell::new(),
            }),
        }
    }

    /// Selector for a CSS/XPath/text pattern
    pub fn new<S: Into<String>>(page: Arc<dyn PageHandle>, pattern: S, options: ResolveOptions) -> Self {
        Self::with_target(page, Target::Pattern(pattern.into()), options)
    }

    /// Selector wrapping an element that is already resolved
    pub fn bound(page: Arc<dyn PageHandle>, element: Arc<dyn ElementHandle>, options: ResolveOptions) -> Self {
        Self::with_target(page, Target::Bound(element), options)
    }

    /// Selector for `pattern` inside this selector's element (`$`)
    pub fn child<S: Into<String>>(&self, pattern: S) -> Selector {
        Self::with_target(
            Arc::clone(&self.inner.page),
            Target::Child {
                parent: self.clone(),
                pattern: pattern.into(),
            },
            self.inner.options,
        )
    }

    /// Alias of [`Selector::child`]
    pub fn dollar<S: Into<String>>(&self, pattern: S) -> Selector {
        self.child(pattern)
    }

    /// Page this selector resolves against
    pub fn page(&self) -> &Arc<dyn PageHandle> {
        &self.inner.page
    }

    pub fn options(&self) -> ResolveOptions {
        self.inner.options
    }

    /// Whether the selector wraps a fixed element
    pub fn is_bound(&self) -> bool {
        matches!(self.inner.target, Target::Bound(_))
    }

    /// Human readable form used in messages
    pub fn description(&self) -> String {
        match &self.inner.target {
            Target::Pattern(pattern) => pattern.clone(),
            Target::Bound(_) => "bound element".to_string(),
            Target::Child { parent, pattern } => format!("{} >> {}", parent.description(), pattern),
        }
    }

    // boxed: child selectors resolve their parent first
    fn lookup_all(&self) -> BoxFuture<'_, Result<Vec<Arc<dyn ElementHandle>>>> {
        Box::pin(async move {
            let match_hidden = self.inner.options.match_hidden;
            match &self.inner.target {
                Target::Pattern(pattern) => resolver::resolve_all(&self.inner.page, pattern, match_hidden).await,
                Target::Bound(element) => Ok(vec![Arc::clone(element)]),
                Target::Child { parent, pattern } => {
                    let parent = parent.element_handle().await?;
                    resolver::resolve_within(&parent, pattern, match_hidden).await
                }
            }
        })
    }

    async fn lookup_first(&self) -> Result<Arc<dyn ElementHandle>> {
        self.lookup_all()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::element_not_found(self.description()))
    }

    /// Resolve once, or poll when implicit wait is on. Never touches the cache.
    pub async fn locate(&self) -> Result<Arc<dyn ElementHandle>> {
        let options = self.inner.options;
        if options.implicit_wait {
            poll::poll_until(options.retry_interval, options.retry_timeout, || self.lookup_first()).await
        } else {
            self.lookup_first().await
        }
    }

    /// The resolved element, cached after the first success
    #[instrument(skip(self), fields(selector = %self.description()))]
    pub async fn element_handle(&self) -> Result<Arc<dyn ElementHandle>> {
        if let Target::Bound(element) = &self.inner.target {
            return Ok(Arc::clone(element));
        }
        let element = self.inner.cache.get_or_try_init(|| self.locate()).await?;
        Ok(Arc::clone(element))
    }

    /// Whether the element can be found.
    ///
    /// A miss is `false` on an eager selector; with implicit wait the miss
    /// surfaces as a timeout once the retry budget is spent.
    pub async fn exists(&self) -> Result<bool> {
        if let Target::Bound(element) = &self.inner.target {
            return element.is_attached().await;
        }
        match self.element_handle().await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() && !self.inner.options.implicit_wait => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Every matching element as a bound selector
    pub async fn elements(&self) -> Result<Vec<Selector>> {
        let found = match self.lookup_all().await {
            Ok(found) => found,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e),
        };
        debug!("{} resolved to {} element(s)", self.description(), found.len());
        Ok(found
            .into_iter()
            .map(|element| Selector::bound(Arc::clone(&self.inner.page), element, self.inner.options))
            .collect())
    }

    /// Text content
    pub async fn text(&self) -> Result<String> {
        self.element_handle().await?.text().await
    }

    /// Form value
    pub async fn value(&self) -> Result<String> {
        self.element_handle().await?.value().await
    }

    /// Select the `<option>` whose value or label is `value`; returns the selected values
    pub async fn select(&self, value: &str) -> Result<Vec<String>> {
        self.element_handle().await?.select_option(value).await
    }

    pub async fn check(&self) -> Result<()> {
        self.element_handle().await?.set_checked(true).await
    }

    pub async fn uncheck(&self) -> Result<()> {
        self.element_handle().await?.set_checked(false).await
    }

    pub async fn is_checked(&self) -> Result<bool> {
        self.element_handle().await?.is_checked().await
    }

    /// Whether the element is rendered; a missing element is not visible
    pub async fn is_visible(&self) -> Result<bool> {
        match self.element_handle().await {
            Ok(element) => element.is_visible().await,
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Call `function` with the element as `this` (and first argument)
    pub async fn evaluate(&self, function: &str, args: &[Value]) -> Result<Value> {
        self.element_handle().await?.evaluate(function, args).await
    }

    /// Whether another element covers one of this element's corners
    pub async fn has_element_above(&self) -> Result<bool> {
        let element = self.element_handle().await?;
        element.scroll_into_view().await?;
        let covered = element.evaluate(ELEMENTS_ABOVE_JS, &[]).await?;
        Ok(covered.as_bool().unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::mock::{MockElement, MockLauncher, MockPage};
    use crate::session::traits::{BrowserLauncher, ContextOptions, LaunchOptions};

    async fn page() -> (Arc<MockPage>, Arc<dyn PageHandle>) {
        let launcher = MockLauncher::new();
        let browser = launcher.launch(&LaunchOptions::default()).await.unwrap();
        let context = browser.new_context(&ContextOptions::default()).await.unwrap();
        let page = context.new_page().await.unwrap();
        let mock = launcher.page(page.id()).unwrap();
        (mock, page)
    }

    fn implicit(timeout_ms: u64) -> ResolveOptions {
        ResolveOptions {
            implicit_wait: true,
            retry_interval: Duration::from_millis(100),
            retry_timeout: Duration::from_millis(timeout_ms),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_exists_eager() {
        let (mock, page) = page().await;
        mock.add_element(MockElement::new("button").selector("#go").text("Go"));

        let present = Selector::new(Arc::clone(&page), "#go", ResolveOptions::default());
        let absent = Selector::new(page, "#missing", ResolveOptions::default());
        assert!(present.exists().await.unwrap());
        assert!(!absent.exists().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exists_implicit_wait_times_out() {
        let (_mock, page) = page().await;
        let absent = Selector::new(page, "#missing", implicit(1000));
        let err = absent.exists().await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_implicit_wait_finds_late_element() {
        let (mock, page) = page().await;
        let selector = Selector::new(page, "#late", implicit(5000));

        let adder = Arc::clone(&mock);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(450)).await;
            adder.add_element(MockElement::new("div").selector("#late").text("here"));
        });

        assert_eq!(selector.text().await.unwrap(), "here");
    }

    #[tokio::test]
    async fn test_fallback_to_text_and_attribute() {
        let (mock, page) = page().await;
        mock.add_element(MockElement::new("a").text("Sign in"));
        mock.add_element(MockElement::new("input").attr("placeholder", "Email").value("x@y.z"));

        let by_text = Selector::new(Arc::clone(&page), "Sign in", ResolveOptions::default());
        let by_attr = Selector::new(page, "Email", ResolveOptions::default());
        assert_eq!(by_text.text().await.unwrap(), "Sign in");
        assert_eq!(by_attr.value().await.unwrap(), "x@y.z");
    }

    #[tokio::test]
    async fn test_hidden_elements_skipped_unless_requested() {
        let (mock, page) = page().await;
        mock.add_element(MockElement::new("div").selector(".ghost").hidden());

        let strict = Selector::new(Arc::clone(&page), ".ghost", ResolveOptions::default());
        assert!(!strict.exists().await.unwrap());

        let lenient = Selector::new(
            page,
            ".ghost",
            ResolveOptions {
                match_hidden: true,
                ..Default::default()
            },
        );
        assert!(lenient.exists().await.unwrap());
        assert!(!lenient.is_visible().await.unwrap());
    }

    #[tokio::test]
    async fn test_nested_frame_is_searched() {
        let (mock, page) = page().await;
        let frame = mock.add_frame();
        frame.add_element(MockElement::new("span").selector("#inner").text("framed"));

        let selector = Selector::new(page, "#inner", ResolveOptions::default());
        assert_eq!(selector.text().await.unwrap(), "framed");
    }

    #[tokio::test]
    async fn test_child_and_elements() {
        let (mock, page) = page().await;
        mock.add_element(
            MockElement::new("ul")
                .selector("#list")
                .child(MockElement::new("li").text("one"))
                .child(MockElement::new("li").text("two")),
        );
        mock.add_element(MockElement::new("li").text("outside"));

        let list = Selector::new(Arc::clone(&page), "#list", ResolveOptions::default());
        let items = list.child("li").elements().await.unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(Selector::is_bound));
        assert_eq!(items[1].text().await.unwrap(), "two");

        let all = Selector::new(page, "li", ResolveOptions::default()).elements().await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_cached_handle_survives_detach() {
        let (mock, page) = page().await;
        let element = mock.add_element(MockElement::new("input").selector("#name"));
        let selector = Selector::new(page, "#name", ResolveOptions::default());

        selector.element_handle().await.unwrap();
        element.detach();

        let err = selector.value().await.unwrap_err();
        assert!(matches!(err, Error::Cdp(_)));
    }

    #[tokio::test]
    async fn test_check_uncheck_select() {
        let (mock, page) = page().await;
        let checkbox = mock.add_element(MockElement::new("input").selector("#agree").attr("type", "checkbox"));
        let select = mock.add_element(MockElement::new("select").selector("#size").options(&["s", "m", "l"]));

        let agree = Selector::new(Arc::clone(&page), "#agree", ResolveOptions::default());
        agree.check().await.unwrap();
        assert!(checkbox.is_checked_now());
        assert!(agree.is_checked().await.unwrap());
        agree.uncheck().await.unwrap();
        assert!(!checkbox.is_checked_now());

        let size = Selector::new(page, "#size", ResolveOptions::default());
        assert_eq!(size.select("m").await.unwrap(), vec!["m".to_string()]);
        assert_eq!(select.selected_options(), vec!["m".to_string()]);
    }

    #[tokio::test]
    async fn test_has_element_above_uses_element_script() {
        let (mock, page) = page().await;
        let covered = mock.add_element(
            MockElement::new("button")
                .selector("#covered")
                .eval_result(serde_json::json!(true)),
        );
        let selector = Selector::new(page, "#covered", ResolveOptions::default());
        assert!(selector.has_element_above().await.unwrap());
        assert!(covered.evaluations()[0].contains("elementFromPoint"));
    }
}
