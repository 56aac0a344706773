//! Action + wait join, and explicit waits

use futures::future::{try_join_all, BoxFuture};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::{debug, info, instrument, warn};

use super::{Driver, Locator};
use crate::config::{Options, Settings};
use crate::matcher::Matcher;
use crate::selector::poll::poll_until;
use crate::selector::{ResolveOptions, Selector};
use crate::session::traits::{PageEvent, PageHandle};
use crate::{Error, Result};

/// Delay always joined with an action to absorb events fired right after it
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Interval between evaluations of a wait predicate
pub const PREDICATE_INTERVAL: Duration = Duration::from_millis(1000);

/// State an element is waited into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ElementState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

/// What `wait_for` waits for
#[derive(Debug, Clone)]
pub enum WaitTarget {
    /// Just sleep
    Duration(Duration),
    /// An element reaching a state
    Element { locator: Locator, state: ElementState },
    /// A page function returning something truthy
    Predicate { function: String, args: Vec<Value> },
}

impl WaitTarget {
    /// Element in the default (`visible`) state
    pub fn element<L: Into<Locator>>(locator: L) -> Self {
        WaitTarget::Element {
            locator: locator.into(),
            state: ElementState::Visible,
        }
    }

    pub fn predicate<S: Into<String>>(function: S, args: Vec<Value>) -> Self {
        WaitTarget::Predicate {
            function: function.into(),
            args,
        }
    }
}

fn wait_event<F>(
    mut events: broadcast::Receiver<PageEvent>,
    what: String,
    timeout: Duration,
    matches: F,
) -> BoxFuture<'static, Result<()>>
where
    F: Fn(&PageEvent) -> bool + Send + Sync + 'static,
{
    Box::pin(async move {
        let watch = async {
            loop {
                match events.recv().await {
                    Ok(event) if matches(&event) => {
                        debug!("Wait for {} satisfied", what);
                        return Ok(());
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Event stream lagged by {} while waiting for {}", skipped, what);
                        continue;
                    }
                    Err(RecvError::Closed) => {
                        return Err(Error::cdp(format!("Page closed while waiting for {}", what)))
                    }
                }
            }
        };
        tokio::time::timeout(timeout, watch).await.map_err(|_| {
            Error::timeout(format!("Waiting for {} exceeded {}ms", what, timeout.as_millis()))
        })?
    })
}

/// Subscribe to every wait condition in `settings`.
///
/// Must run before the action starts so that no event is missed.
fn wait_conditions(page: &Arc<dyn PageHandle>, settings: &Settings) -> Vec<BoxFuture<'static, Result<()>>> {
    let timeout = settings.timeout;
    let mut waits = Vec::new();

    for name in &settings.wait_for_event {
        let expected = name.clone();
        waits.push(wait_event(page.subscribe(), format!("event {}", name), timeout, move |event| {
            event.name() == expected
        }));
    }

    for matcher in &settings.wait_for_request {
        let matcher: Matcher = matcher.clone();
        waits.push(wait_event(page.subscribe(), format!("request {}", matcher), timeout, move |event| {
            matches!(event, PageEvent::Request(request) if matcher.is_match(&request.url))
        }));
    }

    for matcher in &settings.wait_for_response {
        let matcher: Matcher = matcher.clone();
        waits.push(wait_event(page.subscribe(), format!("response {}", matcher), timeout, move |event| {
            matches!(event, PageEvent::Response(response) if matcher.is_match(&response.url))
        }));
    }

    if settings.wait_for_navigation {
        let until = settings.wait_until;
        waits.push(wait_event(
            page.subscribe(),
            format!("navigation ({})", until.as_str()),
            settings.navigation_timeout,
            move |event| matches!(event, PageEvent::Lifecycle(state) if *state == until),
        ));
    }

    waits
}

/// Run `action` joined with the waits requested in `settings` and the settle delay.
///
/// All waits are awaited, not raced. The first failure (action or wait) ends
/// the call; otherwise the action's own result is returned.
pub(crate) async fn run_with_waits<T, Fut>(page: &Arc<dyn PageHandle>, settings: &Settings, action: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    let waits = wait_conditions(page, settings);
    if !waits.is_empty() {
        debug!("Joining action with {} wait condition(s)", waits.len());
    }

    let settle = async {
        tokio::time::sleep(SETTLE_DELAY).await;
        Ok::<(), Error>(())
    };
    let (result, _, _) = tokio::try_join!(action, try_join_all(waits), settle)?;

    observe(settings).await;
    Ok(result)
}

/// Pause after an action when observe mode is on
pub(crate) async fn observe(settings: &Settings) {
    if settings.observe {
        tokio::time::sleep(settings.observe_time).await;
    }
}

/// Log the named page events of `page` until it goes away
pub(crate) fn spawn_event_logger(page: &Arc<dyn PageHandle>, names: &[String]) {
    if names.is_empty() {
        return;
    }
    let names = names.to_vec();
    let page_id = page.id().to_string();
    let events = BroadcastStream::new(page.subscribe())
        .filter_map(|event| event.ok())
        .filter(move |event| names.iter().any(|n| n == event.name()));
    tokio::spawn(async move {
        tokio::pin!(events);
        while let Some(event) = events.next().await {
            info!(page = %page_id, "event {}: {:?}", event.name(), event);
        }
    });
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

async fn element_in_state(selector: &Selector, state: ElementState) -> Result<()> {
    // a fresh lookup each attempt; hidden elements must be found to be judged
    let found = match selector.locate().await {
        Ok(element) => Some(element),
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e),
    };
    let reached = match (&found, state) {
        (Some(element), ElementState::Visible) => element.is_visible().await?,
        (Some(element), ElementState::Hidden) => !element.is_visible().await?,
        (Some(element), ElementState::Attached) => element.is_attached().await?,
        (Some(element), ElementState::Detached) => !element.is_attached().await?,
        (None, ElementState::Visible | ElementState::Attached) => false,
        (None, ElementState::Hidden | ElementState::Detached) => true,
    };
    if reached {
        Ok(())
    } else {
        Err(Error::element_not_found(format!(
            "{} is not {:?}",
            selector.description(),
            state
        )))
    }
}

impl Driver {
    /// Sleep, wait for an element state, or poll a page predicate
    #[instrument(skip(self, options))]
    pub async fn wait_for(&self, target: WaitTarget, options: &Options) -> Result<()> {
        let settings = self.settings(options);
        match target {
            WaitTarget::Duration(duration) => {
                tokio::time::sleep(duration).await;
                Ok(())
            }
            WaitTarget::Element { locator, state } => {
                let page = self.page()?;
                let selector = match locator {
                    Locator::Selector(selector) => selector,
                    Locator::Pattern(pattern) => Selector::new(
                        page,
                        pattern,
                        ResolveOptions {
                            implicit_wait: false,
                            match_hidden: true,
                            ..ResolveOptions::from(&settings)
                        },
                    ),
                };
                poll_until(settings.retry_interval, settings.timeout, || {
                    element_in_state(&selector, state)
                })
                .await
            }
            WaitTarget::Predicate { function, args } => {
                let page = self.page()?;
                poll_until(PREDICATE_INTERVAL, settings.timeout, || {
                    let page = Arc::clone(&page);
                    let function = function.clone();
                    let args = args.clone();
                    async move {
                        let value = page.evaluate(&function, &args).await?;
                        if is_truthy(&value) {
                            Ok(())
                        } else {
                            Err(Error::element_not_found(format!("predicate returned {}", value)))
                        }
                    }
                })
                .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!("x")));
        assert!(is_truthy(&json!({})));
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!(false)));
    }
}
