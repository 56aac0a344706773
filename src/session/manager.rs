//! Session state
//!
//! Tracks the open browser, the named contexts, the active (context, page)
//! pair and the activation history used to restore the previous page when the
//! active one goes away. All engine calls happen in the driver; this type only
//! keeps the bookkeeping consistent.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::intercept::InterceptTable;
use crate::session::traits::{BrowserHandle, ContextHandle, PageHandle};
use crate::{Error, Result};

pub const NOT_INITIALIZED: &str = "Browser or page not initialized. Call `openBrowser()` before using this API";
pub const CONTEXT_NOT_INITIALIZED: &str = "Context not initialized. Call `openContext()` before using this API";
pub const BROWSER_NOT_OPENED: &str = "Browser not opened";

/// A named browsing context
#[derive(Debug, Clone)]
pub struct ContextEntry {
    pub name: String,
    pub handle: Arc<dyn ContextHandle>,
    /// Context that was active when this one was opened
    pub opener: Option<String>,
    pub intercepts: InterceptTable,
    /// Whether the catch-all route is installed on the engine context
    pub route_installed: bool,
}

/// A page together with its generated identifier
#[derive(Debug, Clone)]
pub struct PageRef {
    pub uid: Uuid,
    pub handle: Arc<dyn PageHandle>,
}

impl PageRef {
    fn same_page(&self, other: &Arc<dyn PageHandle>) -> bool {
        self.handle.id() == other.id()
    }
}

/// One activation of a page
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub context: String,
    pub page: PageRef,
}

/// Browser, contexts, active pair and history of one driver
#[derive(Debug, Default)]
pub struct Session {
    browser: Option<Arc<dyn BrowserHandle>>,
    contexts: Vec<ContextEntry>,
    current_context: Option<String>,
    current_page: Option<PageRef>,
    history: Vec<HistoryEntry>,
    page_ids: HashMap<String, Uuid>,
}

impl Session {
    /// Empty session
    pub fn new() -> Self {
        Self::default()
    }

    pub fn browser(&self) -> Option<&Arc<dyn BrowserHandle>> {
        self.browser.as_ref()
    }

    /// Record a freshly launched browser
    pub fn set_browser(&mut self, browser: Arc<dyn BrowserHandle>) -> Result<()> {
        if self.browser.is_some() {
            return Err(Error::already_open("Browser already opened"));
        }
        self.browser = Some(browser);
        Ok(())
    }

    /// Forget everything, returning the browser if one was open
    pub fn reset(&mut self) -> Option<Arc<dyn BrowserHandle>> {
        self.contexts.clear();
        self.current_context = None;
        self.current_page = None;
        self.history.clear();
        self.page_ids.clear();
        self.browser.take()
    }

    pub fn require_browser(&self) -> Result<Arc<dyn BrowserHandle>> {
        self.browser
            .clone()
            .ok_or_else(|| Error::not_initialized(BROWSER_NOT_OPENED))
    }

    /// Active context; fails when no browser or context is open
    pub fn require_context(&self) -> Result<&ContextEntry> {
        if self.browser.is_none() {
            return Err(Error::not_initialized(CONTEXT_NOT_INITIALIZED));
        }
        self.current_context()
            .ok_or_else(|| Error::not_initialized(CONTEXT_NOT_INITIALIZED))
    }

    /// Active context and page; the precondition of every page action
    pub fn validate(&self) -> Result<(&ContextEntry, &PageRef)> {
        match (&self.browser, self.current_context(), &self.current_page) {
            (Some(_), Some(context), Some(page)) if !page.handle.is_closed() => Ok((context, page)),
            _ => Err(Error::not_initialized(NOT_INITIALIZED)),
        }
    }

    pub fn current_context(&self) -> Option<&ContextEntry> {
        let name = self.current_context.as_deref()?;
        self.context(name)
    }

    pub fn current_context_mut(&mut self) -> Option<&mut ContextEntry> {
        let name = self.current_context.clone()?;
        self.context_mut(&name)
    }

    pub fn current_page(&self) -> Option<&PageRef> {
        self.current_page.as_ref()
    }

    pub fn context(&self, name: &str) -> Option<&ContextEntry> {
        self.contexts.iter().find(|c| c.name == name)
    }

    pub fn context_mut(&mut self, name: &str) -> Option<&mut ContextEntry> {
        self.contexts.iter_mut().find(|c| c.name == name)
    }

    /// Open contexts in creation order
    pub fn contexts(&self) -> &[ContextEntry] {
        &self.contexts
    }

    /// The single context named `name`, or "Found N matching name"
    pub fn context_named(&self, name: &str) -> Result<&ContextEntry> {
        let matching: Vec<_> = self.contexts.iter().filter(|c| c.name == name).collect();
        match matching.as_slice() {
            [single] => Ok(single),
            other => Err(Error::context_not_found(format!("Found {} matching {}", other.len(), name))),
        }
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Register a new context and make it current. The active page is cleared
    /// until a page of the new context is opened.
    pub fn add_context(&mut self, name: String, handle: Arc<dyn ContextHandle>) -> Result<&ContextEntry> {
        if self.context(&name).is_some() {
            return Err(Error::already_open(format!("Context {} already opened", name)));
        }
        info!("Context {} opened", name);
        let opener = self.current_context.clone();
        self.contexts.push(ContextEntry {
            name: name.clone(),
            handle,
            opener,
            intercepts: InterceptTable::new(),
            route_installed: false,
        });
        self.current_context = Some(name);
        self.current_page = None;
        self.context_named_last()
    }

    fn context_named_last(&self) -> Result<&ContextEntry> {
        self.contexts
            .last()
            .ok_or_else(|| Error::internal("context list is empty"))
    }

    /// Stable identifier of a page, generated on first sight
    pub fn page_ref(&mut self, handle: Arc<dyn PageHandle>) -> PageRef {
        let uid = *self
            .page_ids
            .entry(handle.id().to_string())
            .or_insert_with(Uuid::new_v4);
        PageRef { uid, handle }
    }

    /// Make `page` of context `context` the active pair and record it
    pub fn activate(&mut self, context: &str, page: Arc<dyn PageHandle>) -> PageRef {
        let page = self.page_ref(page);
        debug!("Activating page {} in context {}", page.uid, context);
        self.history.push(HistoryEntry {
            context: context.to_string(),
            page: page.clone(),
        });
        self.current_context = Some(context.to_string());
        self.current_page = Some(page.clone());
        page
    }

    /// Most recent page of `context` in the history
    pub fn latest_page_of(&self, context: &str) -> Option<&PageRef> {
        self.history
            .iter()
            .rev()
            .find(|e| e.context == context && !e.page.handle.is_closed())
            .map(|e| &e.page)
    }

    /// Drop the context and its history; restores the previous pair when it was current
    pub fn remove_context(&mut self, name: &str) -> Option<ContextEntry> {
        let index = self.contexts.iter().position(|c| c.name == name)?;
        let removed = self.contexts.remove(index);
        self.history.retain(|e| e.context != name);
        if self.current_context.as_deref() == Some(name) {
            self.restore_from_history();
        }
        Some(removed)
    }

    /// Drop closed pages from the history.
    ///
    /// Returns whether the active page was among them, in which case the most
    /// recent remaining entry becomes active.
    pub fn remove_pages(&mut self, pages: &[Arc<dyn PageHandle>]) -> bool {
        self.history
            .retain(|e| !pages.iter().any(|p| e.page.same_page(p)));
        for page in pages {
            self.page_ids.remove(page.id());
        }
        let current_closed = self
            .current_page
            .as_ref()
            .is_some_and(|current| pages.iter().any(|p| current.same_page(p)));
        if current_closed {
            self.restore_from_history();
        }
        current_closed
    }

    /// Make the most recent live history entry current, or clear the active pair
    pub fn restore_from_history(&mut self) {
        self.history.retain(|e| !e.page.handle.is_closed());
        match self.history.last() {
            Some(entry) => {
                debug!("Restoring page {} in context {}", entry.page.uid, entry.context);
                self.current_context = Some(entry.context.clone());
                self.current_page = Some(entry.page.clone());
            }
            None => {
                debug!("History is empty, no active page");
                self.current_context = None;
                self.current_page = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::mock::MockLauncher;
    use crate::session::traits::{BrowserLauncher, ContextOptions, LaunchOptions};

    async fn session_with_context(name: &str) -> (Session, Arc<dyn ContextHandle>) {
        let launcher = MockLauncher::new();
        let browser = launcher.launch(&LaunchOptions::default()).await.unwrap();
        let context = browser.new_context(&ContextOptions::default()).await.unwrap();
        let mut session = Session::new();
        session.set_browser(browser).unwrap();
        session.add_context(name.to_string(), Arc::clone(&context)).unwrap();
        (session, context)
    }

    #[tokio::test]
    async fn test_validate_requires_page() {
        let mut session = Session::new();
        let err = session.validate().unwrap_err();
        assert_eq!(err.to_string(), NOT_INITIALIZED);

        let launcher = MockLauncher::new();
        session
            .set_browser(launcher.launch(&LaunchOptions::default()).await.unwrap())
            .unwrap();
        assert_eq!(session.require_context().unwrap_err().to_string(), CONTEXT_NOT_INITIALIZED);
        assert!(session.validate().is_err());
    }

    #[tokio::test]
    async fn test_browser_opened_twice() {
        let (mut session, _) = session_with_context("main").await;
        let launcher = MockLauncher::new();
        let second = launcher.launch(&LaunchOptions::default()).await.unwrap();
        let err = session.set_browser(second).unwrap_err();
        assert!(matches!(err, Error::AlreadyOpen(_)));
    }

    #[tokio::test]
    async fn test_remove_current_page_restores_previous() {
        let (mut session, context) = session_with_context("main").await;
        let first = context.new_page().await.unwrap();
        let second = context.new_page().await.unwrap();
        let first_ref = session.activate("main", Arc::clone(&first));
        session.activate("main", Arc::clone(&second));

        second.close().await.unwrap();
        assert!(session.remove_pages(&[second]));
        let (_, current) = session.validate().unwrap();
        assert_eq!(current.uid, first_ref.uid);
    }

    #[tokio::test]
    async fn test_remove_other_page_keeps_current() {
        let (mut session, context) = session_with_context("main").await;
        let first = context.new_page().await.unwrap();
        let second = context.new_page().await.unwrap();
        session.activate("main", Arc::clone(&first));
        let second_ref = session.activate("main", Arc::clone(&second));

        assert!(!session.remove_pages(&[first]));
        assert_eq!(session.current_page().unwrap().uid, second_ref.uid);
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_context_clears_history() {
        let (mut session, context) = session_with_context("main").await;
        let page = context.new_page().await.unwrap();
        session.activate("main", page);

        let launcher = MockLauncher::new();
        let browser = launcher.launch(&LaunchOptions::default()).await.unwrap();
        let other = browser.new_context(&ContextOptions::default()).await.unwrap();
        let entry = session.add_context("other".to_string(), Arc::clone(&other)).unwrap();
        assert_eq!(entry.opener.as_deref(), Some("main"));
        let other_page = other.new_page().await.unwrap();
        session.activate("other", other_page);

        session.remove_context("other").unwrap();
        assert!(session.history().iter().all(|e| e.context == "main"));
        assert_eq!(session.current_context().unwrap().name, "main");

        session.remove_context("main").unwrap();
        assert!(session.current_page().is_none());
        assert!(session.current_context().is_none());
    }

    #[tokio::test]
    async fn test_context_named_counts_matches() {
        let (session, _) = session_with_context("main").await;
        assert!(session.context_named("main").is_ok());
        let err = session.context_named("nope").unwrap_err();
        assert_eq!(err.to_string(), "Found 0 matching nope");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_page_uid_is_stable() {
        let (mut session, context) = session_with_context("main").await;
        let page = context.new_page().await.unwrap();
        let a = session.page_ref(Arc::clone(&page));
        let b = session.activate("main", page);
        assert_eq!(a.uid, b.uid);
    }
}
