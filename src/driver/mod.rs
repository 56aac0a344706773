//! # 驱动层
//!
//! `Driver` is the action vocabulary of the crate: open a browser, navigate,
//! interact with elements, wait, intercept the network, manage cookies.
//! Each driver owns its own session state and option store, so several
//! drivers can live in one process.
//!
//! ## 模块结构
//! - `lifecycle`: browser, context and page lifecycle, switching
//! - `navigation`: goto, reload, history
//! - `interaction`: element and keyboard/mouse actions
//! - `wait`: action + wait join, `wait_for`
//! - `network`: interception, cookies, permissions, geolocation, emulation
//!
//! ## 使用示例
//! ```rust,no_run
//! use oxidrums::config::Options;
//! use oxidrums::driver::Driver;
//!
//! # async fn example() -> oxidrums::Result<()> {
//! let mut driver = Driver::new();
//! driver
//!     .open_browser(&Options {
//!         headless: Some(true),
//!         url: Some("https://example.com".into()),
//!         ..Default::default()
//!     })
//!     .await?;
//! driver.click("More information...", &Options::default()).await?;
//! println!("{}", driver.title().await?);
//! driver.close_browser().await?;
//! # Ok(())
//! # }
//! ```

mod interaction;
mod lifecycle;
mod navigation;
mod network;
mod wait;

pub use interaction::MouseAction;
pub use network::CookieFilter;
pub use wait::{ElementState, WaitTarget};

use std::sync::Arc;
use serde_json::Value;

use crate::config::{ConfigStore, Options, Settings};
use crate::selector::{ResolveOptions, Selector};
use crate::session::launcher::ChromeLauncher;
use crate::session::manager::Session;
use crate::session::traits::{BrowserLauncher, PageHandle};
use crate::Result;

/// Something that designates an element: a raw pattern or a built selector
#[derive(Debug, Clone)]
pub enum Locator {
    Pattern(String),
    Selector(Selector),
}

impl From<&str> for Locator {
    fn from(pattern: &str) -> Self {
        Locator::Pattern(pattern.to_string())
    }
}

impl From<String> for Locator {
    fn from(pattern: String) -> Self {
        Locator::Pattern(pattern)
    }
}

impl From<Selector> for Locator {
    fn from(selector: Selector) -> Self {
        Locator::Selector(selector)
    }
}

impl From<&Selector> for Locator {
    fn from(selector: &Selector) -> Self {
        Locator::Selector(selector.clone())
    }
}

/// Browser-automation facade
#[derive(Debug)]
pub struct Driver {
    launcher: Arc<dyn BrowserLauncher>,
    session: Session,
    config: ConfigStore,
}

impl Default for Driver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver {
    /// Driver for a local (or `cdpEndpoint`) Chrome
    pub fn new() -> Self {
        Self::with_launcher(Arc::new(ChromeLauncher::new()))
    }

    /// Driver for any engine
    pub fn with_launcher(launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self {
            launcher,
            session: Session::new(),
            config: ConfigStore::default(),
        }
    }

    /// Seed the option store
    pub fn with_config(mut self, options: Options) -> Self {
        self.config = ConfigStore::new(options);
        self
    }

    /// Session state, read-only
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Shallow-merge options into the store
    pub fn set_config(&mut self, partial: &Options) {
        self.config.set(partial);
    }

    /// Shallow-merge a JSON option bag into the store
    pub fn set_config_json(&mut self, partial: Value) -> Result<()> {
        self.config.set_json(partial)
    }

    /// One effective option by name (`defaultTimeout` is an alias of `timeout`)
    pub fn get_config(&self, name: &str) -> Result<Option<Value>> {
        self.config.get(name)
    }

    /// Every effective option
    pub fn get_config_all(&self) -> Options {
        self.config.all()
    }

    fn settings(&self, call: &Options) -> Settings {
        self.config.resolve(call)
    }

    /// Active page; fails when nothing is open
    fn page(&self) -> Result<Arc<dyn PageHandle>> {
        let (_, page) = self.session.validate()?;
        Ok(Arc::clone(&page.handle))
    }

    /// Lazy selector on the active page
    pub fn select(&self, pattern: &str) -> Result<Selector> {
        self.select_with(pattern, &Options::default())
    }

    /// Lazy selector with call-site resolution options
    pub fn select_with(&self, pattern: &str, options: &Options) -> Result<Selector> {
        let page = self.page()?;
        let settings = self.settings(options);
        Ok(Selector::new(page, pattern, ResolveOptions::from(&settings)))
    }

    fn locate(&self, locator: Locator, settings: &Settings) -> Result<Selector> {
        match locator {
            Locator::Selector(selector) => Ok(selector),
            Locator::Pattern(pattern) => Ok(Selector::new(self.page()?, pattern, ResolveOptions::from(settings))),
        }
    }
}

/// Prefix `http://` to scheme-less URLs and normalise the rest
pub fn normalize_url(raw: &str) -> Result<String> {
    let has_scheme = raw.contains("://")
        || ["about:", "data:", "file:", "javascript:", "blob:"]
            .iter()
            .any(|prefix| raw.starts_with(prefix));
    let candidate = if has_scheme {
        raw.to_string()
    } else {
        format!("http://{}", raw)
    };
    url::Url::parse(&candidate)
        .map(|url| url.to_string())
        .map_err(|e| crate::Error::invalid_argument(format!("Invalid URL {}: {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("example.com").unwrap(), "http://example.com/");
        assert_eq!(normalize_url("https://a.test/api?q=1").unwrap(), "https://a.test/api?q=1");
        assert_eq!(normalize_url("localhost:8080/x").unwrap(), "http://localhost:8080/x");
        assert_eq!(normalize_url("about:blank").unwrap(), "about:blank");
        assert!(normalize_url("http://").is_err());
    }
}
