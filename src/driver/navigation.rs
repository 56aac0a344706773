//! Navigation actions

use tracing::{debug, instrument};

use super::wait::run_with_waits;
use super::{normalize_url, Driver};
use crate::config::{Options, Settings};
use crate::session::traits::NavigationOptions;
use crate::Result;

fn navigation_options(settings: &Settings) -> NavigationOptions {
    NavigationOptions {
        timeout: settings.navigation_timeout,
        wait_until: settings.wait_until,
    }
}

impl Driver {
    /// Navigate the current page. A URL without a scheme gets `http://`.
    #[instrument(skip(self, options))]
    pub async fn goto(&self, url: &str, options: &Options) -> Result<()> {
        let page = self.page()?;
        let settings = self.settings(options);
        let url = normalize_url(url)?;

        if !settings.extra_http_headers.is_empty() {
            page.set_extra_http_headers(&settings.extra_http_headers).await?;
        }

        let navigation = navigation_options(&settings);
        debug!("Navigating to {} (until {})", url, navigation.wait_until.as_str());
        run_with_waits(&page, &settings, page.goto(&url, &navigation)).await
    }

    #[instrument(skip(self, options))]
    pub async fn reload(&self, options: &Options) -> Result<()> {
        let page = self.page()?;
        let settings = self.settings(options);
        let navigation = navigation_options(&settings);
        run_with_waits(&page, &settings, page.reload(&navigation)).await
    }

    /// Go back in history; `false` when there was nothing to go back to
    #[instrument(skip(self, options))]
    pub async fn go_back(&self, options: &Options) -> Result<bool> {
        let page = self.page()?;
        let settings = self.settings(options);
        let navigation = navigation_options(&settings);
        run_with_waits(&page, &settings, page.go_back(&navigation)).await
    }

    /// Go forward in history; `false` when there was nothing to go forward to
    #[instrument(skip(self, options))]
    pub async fn go_forward(&self, options: &Options) -> Result<bool> {
        let page = self.page()?;
        let settings = self.settings(options);
        let navigation = navigation_options(&settings);
        run_with_waits(&page, &settings, page.go_forward(&navigation)).await
    }

    /// URL of the current page
    pub async fn current_url(&self) -> Result<String> {
        self.page()?.url().await
    }

    /// Title of the current page
    pub async fn title(&self) -> Result<String> {
        self.page()?.title().await
    }
}
