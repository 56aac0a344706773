//! Network interception table
//!
//! Each browsing context owns one [`InterceptTable`]. The first rule added to a
//! context installs a single catch-all route handler ([`InterceptTable::route_handler`]);
//! from then on every request is matched against the rules in registration order
//! and the first match decides what happens to it.

mod response;

pub use response::{MockResponse, ResponseBody};

use crate::matcher::Matcher;
use crate::session::traits::{FulfillResponse, RouteHandler, RoutedRequest};
use crate::Result;
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// How many more requests a rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    Unlimited,
    Times(u32),
}

impl Remaining {
    /// `None` and `Some(0)` mean unlimited
    pub fn from_count(count: Option<u32>) -> Self {
        match count {
            None | Some(0) => Remaining::Unlimited,
            Some(n) => Remaining::Times(n),
        }
    }
}

/// What to do with a matched request
#[derive(Clone)]
pub enum ResponseSpec {
    /// Fail the request as if the network blocked it
    Block,
    /// Answer with a canned response
    Fulfill(MockResponse),
    /// Answer with a redirect to this URL
    Redirect(String),
    /// Hand the raw request to a function
    Handler(RouteHandler),
}

impl std::fmt::Debug for ResponseSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseSpec::Block => f.write_str("Block"),
            ResponseSpec::Fulfill(response) => f.debug_tuple("Fulfill").field(response).finish(),
            ResponseSpec::Redirect(url) => f.debug_tuple("Redirect").field(url).finish(),
            ResponseSpec::Handler(_) => f.write_str("Handler(..)"),
        }
    }
}

impl ResponseSpec {
    /// Wrap an async closure as a handler spec
    pub fn handler<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<dyn RoutedRequest>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        ResponseSpec::Handler(Arc::new(move |request| -> BoxFuture<'static, Result<()>> {
            Box::pin(f(request))
        }))
    }
}

/// A registered interception rule
#[derive(Debug, Clone)]
pub struct InterceptRule {
    pub matcher: Matcher,
    pub spec: ResponseSpec,
    pub remaining: Remaining,
}

/// Ordered rules of one context, shared with its route handler
#[derive(Debug, Clone, Default)]
pub struct InterceptTable {
    rules: Arc<Mutex<Vec<InterceptRule>>>,
}

impl InterceptTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    fn rules(&self) -> MutexGuard<'_, Vec<InterceptRule>> {
        self.rules.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a rule; earlier rules take precedence
    pub fn add(&self, rule: InterceptRule) {
        info!("Intercepting {} ({:?})", rule.matcher, rule.remaining);
        self.rules().push(rule);
    }

    /// Remove the first rule registered with `matcher`, or every rule when `None`.
    ///
    /// Returns the number of removed rules.
    pub fn clear(&self, matcher: Option<&Matcher>) -> usize {
        let mut rules = self.rules();
        match matcher {
            None => {
                let removed = rules.len();
                rules.clear();
                removed
            }
            Some(matcher) => match rules.iter().position(|r| &r.matcher == matcher) {
                Some(index) => {
                    rules.remove(index);
                    1
                }
                None => 0,
            },
        }
    }

    /// Number of live rules
    pub fn len(&self) -> usize {
        self.rules().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules().is_empty()
    }

    /// Matchers of the live rules, in order
    pub fn matchers(&self) -> Vec<Matcher> {
        self.rules().iter().map(|r| r.matcher.clone()).collect()
    }

    /// Find the first rule matching `url`, consume one use of it and return its spec.
    ///
    /// A finite rule whose count drops to zero is evicted before returning.
    pub fn take_match(&self, url: &str) -> Option<ResponseSpec> {
        let mut rules = self.rules();
        let index = rules.iter().position(|r| r.matcher.is_match(url))?;
        let spec = rules[index].spec.clone();

        if let Remaining::Times(n) = rules[index].remaining {
            if n <= 1 {
                let evicted = rules.remove(index);
                debug!("Intercept rule {} exhausted", evicted.matcher);
            } else {
                rules[index].remaining = Remaining::Times(n - 1);
            }
        }

        Some(spec)
    }

    /// Catch-all route handler dispatching every request through this table
    pub fn route_handler(&self) -> RouteHandler {
        let table = self.clone();
        Arc::new(move |request: Arc<dyn RoutedRequest>| -> BoxFuture<'static, Result<()>> {
            let table = table.clone();
            Box::pin(async move {
                match table.take_match(request.url()) {
                    Some(spec) => apply(spec, request).await,
                    None => request.proceed().await,
                }
            })
        })
    }
}

/// Apply a response spec to a paused request
pub async fn apply(spec: ResponseSpec, request: Arc<dyn RoutedRequest>) -> Result<()> {
    match spec {
        ResponseSpec::Block => {
            debug!("Blocking {}", request.url());
            request.abort().await
        }
        ResponseSpec::Fulfill(response) => {
            debug!("Fulfilling {} with status {}", request.url(), response.status);
            request.fulfill(response.to_fulfill()?).await
        }
        ResponseSpec::Redirect(location) => {
            let status = if request.method().eq_ignore_ascii_case("GET") { 301 } else { 308 };
            debug!("Redirecting {} to {} ({})", request.url(), location, status);
            request
                .fulfill(FulfillResponse {
                    status,
                    headers: vec![("Location".to_string(), location)],
                    body: bytes::Bytes::new(),
                })
                .await
        }
        ResponseSpec::Handler(handler) => handler(request).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(pattern: &str, spec: ResponseSpec, count: Option<u32>) -> InterceptRule {
        InterceptRule {
            matcher: Matcher::parse(pattern).unwrap(),
            spec,
            remaining: Remaining::from_count(count),
        }
    }

    #[test]
    fn test_finite_rule_evicted_after_n_matches() {
        let table = InterceptTable::new();
        table.add(rule("https://a.test/api", ResponseSpec::Block, Some(2)));

        assert!(table.take_match("https://a.test/api").is_some());
        assert_eq!(table.len(), 1);
        assert!(table.take_match("https://a.test/api").is_some());
        assert!(table.is_empty());
        assert!(table.take_match("https://a.test/api").is_none());
    }

    #[test]
    fn test_unlimited_rule_never_evicted() {
        let table = InterceptTable::new();
        table.add(rule("/a\\.test/", ResponseSpec::Block, None));
        table.add(rule("https://b.test/", ResponseSpec::Block, Some(0)));

        for _ in 0..50 {
            assert!(table.take_match("https://a.test/x").is_some());
            assert!(table.take_match("https://b.test/").is_some());
        }
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_first_match_wins_then_falls_through() {
        let table = InterceptTable::new();
        table.add(rule("https://a.test/", ResponseSpec::Redirect("https://x.test/".into()), Some(1)));
        table.add(rule("/a\\.test/", ResponseSpec::Block, None));

        assert!(matches!(table.take_match("https://a.test/"), Some(ResponseSpec::Redirect(_))));
        assert!(matches!(table.take_match("https://a.test/"), Some(ResponseSpec::Block)));
    }

    #[test]
    fn test_unmatched_url_consumes_nothing() {
        let table = InterceptTable::new();
        table.add(rule("https://a.test/", ResponseSpec::Block, Some(1)));
        assert!(table.take_match("https://other.test/").is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_clear_one_or_all() {
        let table = InterceptTable::new();
        table.add(rule("https://a.test/", ResponseSpec::Block, None));
        table.add(rule("https://b.test/", ResponseSpec::Block, None));
        table.add(rule("https://a.test/", ResponseSpec::Block, None));

        assert_eq!(table.clear(Some(&Matcher::exact("https://a.test/"))), 1);
        assert_eq!(
            table.matchers(),
            vec![Matcher::exact("https://b.test/"), Matcher::exact("https://a.test/")]
        );
        assert_eq!(table.clear(Some(&Matcher::exact("https://nope.test/"))), 0);
        assert_eq!(table.clear(None), 2);
        assert!(table.is_empty());
    }

    #[test]
    fn test_count_conventions() {
        assert_eq!(Remaining::from_count(None), Remaining::Unlimited);
        assert_eq!(Remaining::from_count(Some(0)), Remaining::Unlimited);
        assert_eq!(Remaining::from_count(Some(3)), Remaining::Times(3));
    }

    #[test]
    fn test_spec_from_json_response() {
        let response = MockResponse::from_value(json!({"status": 201, "body": {"ok": true}})).unwrap();
        let fulfill = response.to_fulfill().unwrap();
        assert_eq!(fulfill.status, 201);
        assert_eq!(&fulfill.body[..], br#"{"ok":true}"#);
    }
}
