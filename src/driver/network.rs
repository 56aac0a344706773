//! Interception, cookies, permissions, geolocation and emulation

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::Driver;
use crate::devices::{self, Device};
use crate::intercept::{InterceptRule, Remaining, ResponseSpec};
use crate::matcher::Matcher;
use crate::session::traits::{Cookie, Geolocation, Viewport};
use crate::{Error, Result};

/// Partial cookie used to select cookies: every field that is set must be equal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieFilter {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

impl CookieFilter {
    /// Filter on the cookie name only
    pub fn name<S: Into<String>>(name: S) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn matches(&self, cookie: &Cookie) -> bool {
        let same = |want: &Option<String>, have: Option<&str>| want.as_deref().map_or(true, |w| Some(w) == have);
        same(&self.name, Some(&cookie.name))
            && same(&self.value, Some(&cookie.value))
            && same(&self.domain, cookie.domain.as_deref())
            && same(&self.path, cookie.path.as_deref())
    }
}

impl From<&str> for CookieFilter {
    fn from(name: &str) -> Self {
        CookieFilter::name(name)
    }
}

impl std::fmt::Display for CookieFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => f.write_str(name),
            None => write!(f, "{:?}", self),
        }
    }
}

impl Driver {
    /// Apply `spec` to requests of the current context matching `matcher`.
    ///
    /// `count` of `None` or `Some(0)` keeps the rule forever.
    #[instrument(skip(self, spec))]
    pub async fn intercept(&mut self, matcher: Matcher, spec: ResponseSpec, count: Option<u32>) -> Result<()> {
        let name = self.session.require_context()?.name.clone();
        let entry = self
            .session
            .context_mut(&name)
            .ok_or_else(|| Error::context_not_found(format!("Found 0 matching {}", name)))?;

        // the handler reads the shared table, so it can go in before the rule
        if !entry.route_installed {
            debug!("Installing route handler on context {}", entry.name);
            entry.handle.route(entry.intercepts.route_handler()).await?;
            entry.route_installed = true;
        }

        entry.intercepts.add(InterceptRule {
            matcher,
            spec,
            remaining: Remaining::from_count(count),
        });
        Ok(())
    }

    /// Remove the first rule registered with `matcher`, or every rule. Returns how many were removed.
    #[instrument(skip(self))]
    pub async fn clear_intercept(&mut self, matcher: Option<&Matcher>) -> Result<usize> {
        let name = self.session.require_context()?.name.clone();
        let entry = self
            .session
            .context_mut(&name)
            .ok_or_else(|| Error::context_not_found(format!("Found 0 matching {}", name)))?;

        let removed = entry.intercepts.clear(matcher);
        if entry.intercepts.is_empty() && entry.route_installed {
            entry.handle.unroute().await?;
            entry.route_installed = false;
        }
        info!("Removed {} intercept rule(s)", removed);
        Ok(removed)
    }

    /// Add a cookie to the current context; `url` or `domain` is required
    #[instrument(skip(self, cookie), fields(name = %cookie.name))]
    pub async fn set_cookie(&self, cookie: Cookie) -> Result<()> {
        let (context, _) = self.session.validate()?;
        if cookie.url.is_none() && cookie.domain.is_none() {
            return Err(Error::invalid_argument(
                "At least URL or domain needs to be specified for setting cookies",
            ));
        }
        context.handle.add_cookies(&[cookie]).await
    }

    /// Delete every cookie, or the ones matching `filter`
    #[instrument(skip(self))]
    pub async fn delete_cookies(&self, filter: Option<&CookieFilter>) -> Result<()> {
        let (context, _) = self.session.validate()?;
        let handle = Arc::clone(&context.handle);
        let Some(filter) = filter else {
            return handle.clear_cookies().await;
        };

        let cookies = handle.cookies().await?;
        let (removed, kept): (Vec<Cookie>, Vec<Cookie>) = cookies.into_iter().partition(|c| filter.matches(c));
        if removed.is_empty() {
            return Err(Error::cookie_not_found(format!("Found no cookie(s) matching name {}", filter)));
        }
        debug!("Deleting {} cookie(s)", removed.len());
        handle.clear_cookies().await?;
        if !kept.is_empty() {
            handle.add_cookies(&kept).await?;
        }
        Ok(())
    }

    /// Cookies of the current context, optionally filtered
    pub async fn get_cookies(&self, filter: Option<&CookieFilter>) -> Result<Vec<Cookie>> {
        let (context, _) = self.session.validate()?;
        let cookies = context.handle.cookies().await?;
        Ok(match filter {
            Some(filter) => cookies.into_iter().filter(|c| filter.matches(c)).collect(),
            None => cookies,
        })
    }

    /// Grant permissions to the current context, optionally for one origin
    #[instrument(skip(self))]
    pub async fn override_permissions(&self, origin: Option<&str>, permissions: &[String]) -> Result<()> {
        let (context, _) = self.session.validate()?;
        context.handle.grant_permissions(permissions, origin).await
    }

    pub async fn clear_permission_overrides(&self) -> Result<()> {
        let (context, _) = self.session.validate()?;
        context.handle.clear_permissions().await
    }

    /// Override the geolocation of the current context
    #[instrument(skip(self))]
    pub async fn set_location(&self, location: Geolocation) -> Result<()> {
        let (context, _) = self.session.validate()?;
        if !(-90.0..=90.0).contains(&location.latitude) || !(-180.0..=180.0).contains(&location.longitude) {
            return Err(Error::invalid_argument(format!(
                "Invalid geolocation: {}, {}",
                location.latitude, location.longitude
            )));
        }
        context.handle.set_geolocation(Some(location)).await
    }

    /// Resize the current page
    pub async fn set_viewport(&self, viewport: Viewport) -> Result<()> {
        self.page()?.set_viewport(viewport).await
    }

    /// Named emulation profile
    pub fn get_device(name: &str) -> Result<Device> {
        devices::get_device(name)
    }
}
