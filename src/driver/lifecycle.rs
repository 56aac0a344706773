//! Browser, context and page lifecycle

use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::wait::spawn_event_logger;
use super::Driver;
use crate::config::{BrowserType, Options, Settings};
use crate::devices;
use crate::matcher::Matcher;
use crate::session::traits::{ContextHandle, ContextOptions, LaunchOptions, PageHandle};
use crate::{Error, Result};

/// Live pages of `context` whose URL or title matches
async fn matching_pages(context: &Arc<dyn ContextHandle>, matcher: &Matcher) -> Result<Vec<Arc<dyn PageHandle>>> {
    let mut found = Vec::new();
    for page in context.pages().await? {
        if page.is_closed() {
            continue;
        }
        let url = page.url().await?;
        let title = page.title().await?;
        if matcher.matches_any(&[url.as_str(), title.as_str()]) {
            found.push(page);
        }
    }
    Ok(found)
}

fn context_options(settings: &Settings) -> Result<ContextOptions> {
    let mut options = ContextOptions {
        extra_http_headers: settings.extra_http_headers.clone(),
        ..Default::default()
    };
    if let Some(name) = &settings.device {
        let device = devices::get_device(name)?;
        options.viewport = Some(device.viewport);
        options.user_agent = Some(device.user_agent.to_string());
        options.device_scale_factor = Some(device.device_scale_factor);
        options.is_mobile = device.is_mobile;
        options.has_touch = device.has_touch;
    }
    Ok(options)
}

impl Driver {
    /// Launch the browser; with `url` set also opens a context and a page on it
    #[instrument(skip(self, options))]
    pub async fn open_browser(&mut self, options: &Options) -> Result<()> {
        if self.session.browser().is_some() {
            return Err(Error::already_open("Browser already opened"));
        }
        let settings = self.settings(options);
        if settings.browser_type != BrowserType::Chromium {
            return Err(Error::configuration(format!(
                "Browser type {} is not supported by the CDP engine",
                String::from(settings.browser_type)
            )));
        }

        let launch = LaunchOptions {
            headless: settings.headless,
            args: settings.args.clone(),
            executable_path: settings.executable_path.clone(),
            cdp_endpoint: settings.cdp_endpoint.clone(),
        };
        let browser = self.launcher.launch(&launch).await?;
        info!("Browser opened: {}", browser.version().await.unwrap_or_default());
        self.session.set_browser(browser)?;

        if settings.url.is_some() {
            self.open_context(options).await?;
        }
        Ok(())
    }

    /// Open a new named context and make it current; with `url` set also opens a page
    #[instrument(skip(self, options))]
    pub async fn open_context(&mut self, options: &Options) -> Result<()> {
        let browser = self.session.require_browser()?;
        let settings = self.settings(options);

        let name = match &settings.context_name {
            Some(name) => {
                if self.session.context(name).is_some() {
                    return Err(Error::already_open(format!("Context {} already opened", name)));
                }
                name.clone()
            }
            None => self.default_context_name(),
        };

        let context = browser.new_context(&context_options(&settings)?).await?;
        self.session.add_context(name, context)?;

        if settings.url.is_some() {
            self.open_page(options).await?;
        }
        Ok(())
    }

    fn default_context_name(&self) -> String {
        let base = format!("defaultContext-{}", chrono::Utc::now().timestamp_millis());
        let mut name = base.clone();
        let mut n = 1;
        while self.session.context(&name).is_some() {
            name = format!("{}-{}", base, n);
            n += 1;
        }
        name
    }

    /// Open a tab in the current context and make it current; with `url` set navigates to it
    #[instrument(skip(self, options))]
    pub async fn open_page(&mut self, options: &Options) -> Result<()> {
        let settings = self.settings(options);
        let context = self.session.require_context()?;
        let context_name = context.name.clone();
        let page = context.handle.new_page().await?;

        if !settings.extra_http_headers.is_empty() {
            page.set_extra_http_headers(&settings.extra_http_headers).await?;
        }
        spawn_event_logger(&page, &settings.debug_events);
        let page_ref = self.session.activate(&context_name, page);
        info!("Page {} opened in context {}", page_ref.uid, context_name);

        if let Some(url) = &settings.url {
            self.goto(url, options).await?;
        }
        Ok(())
    }

    /// Close everything. Closing when nothing is open is a no-op.
    #[instrument(skip(self))]
    pub async fn close_browser(&mut self) -> Result<()> {
        match self.session.reset() {
            Some(browser) => {
                info!("Closing browser");
                browser.close().await
            }
            None => Ok(()),
        }
    }

    /// Close a context (the current one by default) and restore the previous page
    #[instrument(skip(self))]
    pub async fn close_context(&mut self, name: Option<&str>) -> Result<()> {
        self.session.validate()?;
        let name = match name {
            Some(name) => name.to_string(),
            None => self.session.require_context()?.name.clone(),
        };
        let handle = Arc::clone(&self.session.context_named(&name)?.handle);

        handle.close().await?;
        self.session.remove_context(&name);
        info!("Context {} closed", name);
        Ok(())
    }

    /// Close the current page, or every page matching `matcher`, in the current or named context
    #[instrument(skip(self))]
    pub async fn close_page(&mut self, matcher: Option<&Matcher>, context_name: Option<&str>) -> Result<()> {
        let (current, current_page) = self.session.validate()?;
        let current_name = current.name.clone();
        let current_page = Arc::clone(&current_page.handle);

        let target_name = context_name.unwrap_or(current_name.as_str()).to_string();
        let target = Arc::clone(&self.session.context_named(&target_name)?.handle);

        let pages = match matcher {
            None if target_name == current_name => vec![current_page],
            None => match self.session.latest_page_of(&target_name) {
                Some(page) => vec![Arc::clone(&page.handle)],
                None => {
                    return Err(Error::page_not_found(format!("No page open in context {}", target_name)))
                }
            },
            Some(matcher) => {
                let found = matching_pages(&target, matcher).await?;
                if found.is_empty() {
                    return Err(Error::page_not_found(format!("Unable to find tab matching {}", matcher)));
                }
                found
            }
        };

        for page in &pages {
            if let Err(e) = page.close().await {
                warn!("Failed to close page {}: {}", page.id(), e);
                return Err(e);
            }
        }
        if self.session.remove_pages(&pages) {
            info!("Active page closed, restored previous page");
        }
        Ok(())
    }

    /// Switch to the first page of the current context whose URL or title matches
    #[instrument(skip(self))]
    pub async fn switch_page(&mut self, matcher: &Matcher) -> Result<()> {
        let (context, _) = self.session.validate()?;
        let name = context.name.clone();
        let handle = Arc::clone(&context.handle);

        let page = matching_pages(&handle, matcher)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::page_not_found(format!("Cannot find title or URL matching {}", matcher)))?;
        self.session.activate(&name, page);
        Ok(())
    }

    /// Switch to the first matching page across every context, or only in context `name`
    #[instrument(skip(self))]
    pub async fn switch_context(&mut self, matcher: &Matcher, name: Option<&str>) -> Result<()> {
        self.session.validate()?;
        let candidates: Vec<(String, Arc<dyn ContextHandle>)> = match name {
            Some(name) => {
                let context = self.session.context_named(name)?;
                vec![(context.name.clone(), Arc::clone(&context.handle))]
            }
            None => self
                .session
                .contexts()
                .iter()
                .map(|c| (c.name.clone(), Arc::clone(&c.handle)))
                .collect(),
        };

        for (context_name, handle) in candidates {
            if let Some(page) = matching_pages(&handle, matcher).await?.into_iter().next() {
                self.session.activate(&context_name, page);
                return Ok(());
            }
        }
        Err(Error::page_not_found(format!("Cannot find title or URL matching {}", matcher)))
    }
}
