//! Browser handle
//!
//! Owns the browser-level CDP connection and, when the browser was spawned
//! locally, the child process and its temporary profile directory.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::process::Child;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::context::ChromeContext;
use crate::cdp::CdpBrowser;
use crate::session::traits::{BrowserHandle, ContextHandle, ContextOptions};
use crate::Result;

/// Running Chrome instance
#[derive(Debug)]
pub struct ChromeBrowser {
    cdp: Arc<dyn CdpBrowser>,
    process: Mutex<Option<Child>>,
    user_data_dir: Option<PathBuf>,
}

impl ChromeBrowser {
    /// Browser reached over an existing endpoint; closing it leaves the process alone
    pub fn connected(cdp: Arc<dyn CdpBrowser>) -> Self {
        Self {
            cdp,
            process: Mutex::new(None),
            user_data_dir: None,
        }
    }

    /// Browser spawned by us
    pub fn spawned(cdp: Arc<dyn CdpBrowser>, process: Child, user_data_dir: PathBuf) -> Self {
        Self {
            cdp,
            process: Mutex::new(Some(process)),
            user_data_dir: Some(user_data_dir),
        }
    }

    pub fn cdp(&self) -> Arc<dyn CdpBrowser> {
        Arc::clone(&self.cdp)
    }
}

#[async_trait]
impl BrowserHandle for ChromeBrowser {
    async fn new_context(&self, options: &ContextOptions) -> Result<Arc<dyn ContextHandle>> {
        let id = self.cdp.create_browser_context().await?;
        debug!("Created browser context {}", id);
        Ok(Arc::new(ChromeContext::new(id, Arc::clone(&self.cdp), options.clone())))
    }

    async fn version(&self) -> Result<String> {
        Ok(self.cdp.get_version().await?.product)
    }

    async fn close(&self) -> Result<()> {
        let mut process = self.process.lock().await;
        match process.take() {
            Some(mut child) => {
                if let Err(e) = self.cdp.close().await {
                    warn!("Browser.close failed, killing process: {}", e);
                }
                if let Err(e) = child.kill().await {
                    debug!("Browser process already gone: {}", e);
                }
                if let Some(dir) = &self.user_data_dir {
                    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
                        debug!("Could not remove profile {}: {}", dir.display(), e);
                    }
                }
                info!("Browser process stopped");
            }
            // attached browsers keep running; only the connection goes away
            None => self.cdp.client().connection().close().await?,
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.cdp.client().connection().is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdp::{CdpBrowserImpl, MockCdpConnection};
    use serde_json::json;

    fn browser(connection: &Arc<MockCdpConnection>) -> ChromeBrowser {
        ChromeBrowser::connected(Arc::new(CdpBrowserImpl::from_connection("ws://mock", connection.clone())))
    }

    #[tokio::test]
    async fn test_new_context_creates_browser_context() {
        let connection = Arc::new(MockCdpConnection::new());
        connection.respond("Target.createBrowserContext", |_| Ok(json!({ "browserContextId": "CTX1" })));
        let context = browser(&connection).new_context(&ContextOptions::default()).await.unwrap();
        assert_eq!(context.id(), "CTX1");
    }

    #[tokio::test]
    async fn test_version_is_product() {
        let connection = Arc::new(MockCdpConnection::new());
        connection.respond("Browser.getVersion", |_| {
            Ok(json!({ "protocolVersion": "1.3", "product": "HeadlessChrome/126.0", "userAgent": "", "jsVersion": "" }))
        });
        assert_eq!(browser(&connection).version().await.unwrap(), "HeadlessChrome/126.0");
    }

    #[tokio::test]
    async fn test_close_attached_browser_keeps_it_running() {
        let connection = Arc::new(MockCdpConnection::new());
        let browser = browser(&connection);
        assert!(browser.is_connected());
        browser.close().await.unwrap();
        assert!(connection.calls_to("Browser.close").is_empty());
        assert!(!browser.is_connected());
    }
}
