//! Configuration management for Oxidrums
//!
//! [`Options`] is a partial option bag: every field is optional so bags can be
//! layered. The layers are built-in defaults, the values stored in a
//! [`ConfigStore`] and the per-call overrides, later layers winning key by key.
//! [`Settings`] is the fully resolved result handed to every action.

use crate::matcher::Matcher;
use crate::session::traits::LoadState;
use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::env;
use std::time::Duration;

/// Engine family selected at launch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(try_from = "String", into = "String")]
pub enum BrowserType {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl std::str::FromStr for BrowserType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "chromium" | "chrome" => Ok(BrowserType::Chromium),
            "firefox" => Ok(BrowserType::Firefox),
            "webkit" => Ok(BrowserType::Webkit),
            _ => Err(Error::configuration(
                "Unknown browser, Please set one of the given browser\nchromium\nfirefox\nwebkit",
            )),
        }
    }
}

impl TryFrom<String> for BrowserType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<BrowserType> for String {
    fn from(value: BrowserType) -> Self {
        match value {
            BrowserType::Chromium => "chromium",
            BrowserType::Firefox => "firefox",
            BrowserType::Webkit => "webkit",
        }
        .to_string()
    }
}

/// Partial option bag
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Options {
    /// Launch without a visible window
    #[serde(default, deserialize_with = "bool_like", skip_serializing_if = "Option::is_none")]
    pub headless: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_type: Option<BrowserType>,

    /// Navigation timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation_timeout: Option<u64>,

    /// Default per-action timeout in milliseconds
    #[serde(default, alias = "defaultTimeout", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Pause after every action
    #[serde(default, deserialize_with = "bool_like", skip_serializing_if = "Option::is_none")]
    pub observe: Option<bool>,

    /// Pause length in milliseconds when observing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observe_time: Option<u64>,

    /// Implicit-wait polling interval in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_interval: Option<u64>,

    /// Implicit-wait deadline in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_timeout: Option<u64>,

    /// Count hidden elements as selector matches
    #[serde(default, deserialize_with = "bool_like", skip_serializing_if = "Option::is_none")]
    pub match_hidden_element: Option<bool>,

    /// Retry selector resolution until `retryTimeout`
    #[serde(default, deserialize_with = "bool_like", skip_serializing_if = "Option::is_none")]
    pub implicit_wait: Option<bool>,

    /// Page events to await alongside an action
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub wait_for_event: Option<Vec<String>>,

    /// Requests to await alongside an action
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub wait_for_request: Option<Vec<Matcher>>,

    /// Responses to await alongside an action
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub wait_for_response: Option<Vec<Matcher>>,

    /// Await the `waitUntil` lifecycle event alongside an action
    #[serde(default, deserialize_with = "bool_like", skip_serializing_if = "Option::is_none")]
    pub wait_for_navigation: Option<bool>,

    /// Named device profile, see [`crate::devices`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,

    #[serde(default, rename = "extraHTTPHeaders", skip_serializing_if = "Option::is_none")]
    pub extra_http_headers: Option<HashMap<String, String>>,

    /// URL opened right after a context/page is created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_until: Option<LoadState>,

    /// Name for a newly opened context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_name: Option<String>,

    /// Attach to an already running browser instead of launching one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdp_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable_path: Option<String>,

    /// Extra command line arguments for a launched browser
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,

    /// Page events to trace at debug level
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub debug_events: Option<Vec<String>>,
}

impl Options {
    /// Built-in defaults
    pub fn defaults() -> Self {
        Self {
            headless: Some(false),
            browser_type: Some(BrowserType::Chromium),
            navigation_timeout: Some(30000),
            timeout: Some(10000),
            observe: Some(false),
            observe_time: Some(3000),
            retry_interval: Some(100),
            retry_timeout: Some(10000),
            match_hidden_element: Some(false),
            implicit_wait: Some(false),
            wait_for_navigation: Some(false),
            wait_until: Some(LoadState::Load),
            ..Default::default()
        }
    }

    /// Shallow merge: every field set in `over` replaces the one in `self`
    pub fn merge(&self, over: &Options) -> Options {
        let base = self.clone();
        let over = over.clone();
        Options {
            headless: over.headless.or(base.headless),
            browser_type: over.browser_type.or(base.browser_type),
            navigation_timeout: over.navigation_timeout.or(base.navigation_timeout),
            timeout: over.timeout.or(base.timeout),
            observe: over.observe.or(base.observe),
            observe_time: over.observe_time.or(base.observe_time),
            retry_interval: over.retry_interval.or(base.retry_interval),
            retry_timeout: over.retry_timeout.or(base.retry_timeout),
            match_hidden_element: over.match_hidden_element.or(base.match_hidden_element),
            implicit_wait: over.implicit_wait.or(base.implicit_wait),
            wait_for_event: over.wait_for_event.or(base.wait_for_event),
            wait_for_request: over.wait_for_request.or(base.wait_for_request),
            wait_for_response: over.wait_for_response.or(base.wait_for_response),
            wait_for_navigation: over.wait_for_navigation.or(base.wait_for_navigation),
            device: over.device.or(base.device),
            extra_http_headers: over.extra_http_headers.or(base.extra_http_headers),
            url: over.url.or(base.url),
            wait_until: over.wait_until.or(base.wait_until),
            context_name: over.context_name.or(base.context_name),
            cdp_endpoint: over.cdp_endpoint.or(base.cdp_endpoint),
            executable_path: over.executable_path.or(base.executable_path),
            args: over.args.or(base.args),
            debug_events: over.debug_events.or(base.debug_events),
        }
    }

    /// Parse a JSON option bag
    pub fn from_json(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| Error::configuration(format!("Invalid options: {}", e)))
    }

    /// Load options from `OXIDRUMS_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut options = Options::default();

        if let Ok(headless) = env::var("OXIDRUMS_HEADLESS") {
            options.headless = Some(
                parse_bool(&headless)
                    .ok_or_else(|| Error::configuration("Invalid OXIDRUMS_HEADLESS"))?,
            );
        }

        if let Ok(browser_type) = env::var("OXIDRUMS_BROWSER_TYPE") {
            options.browser_type = Some(browser_type.parse()?);
        }

        if let Ok(timeout) = env::var("OXIDRUMS_TIMEOUT") {
            options.timeout = Some(
                timeout
                    .parse()
                    .map_err(|_| Error::configuration("Invalid OXIDRUMS_TIMEOUT"))?,
            );
        }

        if let Ok(timeout) = env::var("OXIDRUMS_NAVIGATION_TIMEOUT") {
            options.navigation_timeout = Some(
                timeout
                    .parse()
                    .map_err(|_| Error::configuration("Invalid OXIDRUMS_NAVIGATION_TIMEOUT"))?,
            );
        }

        if let Ok(observe) = env::var("OXIDRUMS_OBSERVE") {
            options.observe = Some(
                parse_bool(&observe)
                    .ok_or_else(|| Error::configuration("Invalid OXIDRUMS_OBSERVE"))?,
            );
        }

        if let Ok(observe_time) = env::var("OXIDRUMS_OBSERVE_TIME") {
            options.observe_time = Some(
                observe_time
                    .parse()
                    .map_err(|_| Error::configuration("Invalid OXIDRUMS_OBSERVE_TIME"))?,
            );
        }

        if let Ok(interval) = env::var("OXIDRUMS_RETRY_INTERVAL") {
            options.retry_interval = Some(
                interval
                    .parse()
                    .map_err(|_| Error::configuration("Invalid OXIDRUMS_RETRY_INTERVAL"))?,
            );
        }

        if let Ok(timeout) = env::var("OXIDRUMS_RETRY_TIMEOUT") {
            options.retry_timeout = Some(
                timeout
                    .parse()
                    .map_err(|_| Error::configuration("Invalid OXIDRUMS_RETRY_TIMEOUT"))?,
            );
        }

        if let Ok(implicit_wait) = env::var("OXIDRUMS_IMPLICIT_WAIT") {
            options.implicit_wait = Some(
                parse_bool(&implicit_wait)
                    .ok_or_else(|| Error::configuration("Invalid OXIDRUMS_IMPLICIT_WAIT"))?,
            );
        }

        if let Ok(endpoint) = env::var("OXIDRUMS_CDP_ENDPOINT") {
            options.cdp_endpoint = Some(endpoint);
        }

        if let Ok(path) = env::var("OXIDRUMS_EXECUTABLE_PATH") {
            options.executable_path = Some(path);
        }

        if let Ok(device) = env::var("OXIDRUMS_DEVICE") {
            options.device = Some(device);
        }

        Ok(options)
    }

    /// Load options from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::configuration(format!("Failed to read config file: {}", e)))?;

        let options: Options = toml::from_str(&content)
            .map_err(|e| Error::configuration(format!("Failed to parse config: {}", e)))?;

        Ok(options)
    }
}

/// Fully resolved settings for one call
#[derive(Debug, Clone)]
pub struct Settings {
    pub headless: bool,
    pub browser_type: BrowserType,
    pub navigation_timeout: Duration,
    pub timeout: Duration,
    pub observe: bool,
    pub observe_time: Duration,
    pub retry_interval: Duration,
    pub retry_timeout: Duration,
    pub match_hidden_element: bool,
    pub implicit_wait: bool,
    pub wait_for_event: Vec<String>,
    pub wait_for_request: Vec<Matcher>,
    pub wait_for_response: Vec<Matcher>,
    pub wait_for_navigation: bool,
    pub device: Option<String>,
    pub extra_http_headers: HashMap<String, String>,
    pub url: Option<String>,
    pub wait_until: LoadState,
    pub context_name: Option<String>,
    pub cdp_endpoint: Option<String>,
    pub executable_path: Option<String>,
    pub args: Vec<String>,
    pub debug_events: Vec<String>,
}

impl Settings {
    /// Resolve `defaults <- stored <- call`, later layers winning
    pub fn resolve(stored: &Options, call: &Options) -> Settings {
        let defaults = Options::defaults();
        let o = defaults.merge(stored).merge(call);
        let ms = |v: Option<u64>, fallback: u64| Duration::from_millis(v.unwrap_or(fallback));

        Settings {
            headless: o.headless.unwrap_or(false),
            browser_type: o.browser_type.unwrap_or_default(),
            navigation_timeout: ms(o.navigation_timeout, 30000),
            timeout: ms(o.timeout, 10000),
            observe: o.observe.unwrap_or(false),
            observe_time: ms(o.observe_time, 3000),
            retry_interval: ms(o.retry_interval, 100),
            retry_timeout: ms(o.retry_timeout, 10000),
            match_hidden_element: o.match_hidden_element.unwrap_or(false),
            implicit_wait: o.implicit_wait.unwrap_or(false),
            wait_for_event: o.wait_for_event.unwrap_or_default(),
            wait_for_request: o.wait_for_request.unwrap_or_default(),
            wait_for_response: o.wait_for_response.unwrap_or_default(),
            wait_for_navigation: o.wait_for_navigation.unwrap_or(false),
            device: o.device,
            extra_http_headers: o.extra_http_headers.unwrap_or_default(),
            url: o.url,
            wait_until: o.wait_until.unwrap_or(LoadState::Load),
            context_name: o.context_name,
            cdp_endpoint: o.cdp_endpoint,
            executable_path: o.executable_path,
            args: o.args.unwrap_or_default(),
            debug_events: o.debug_events.unwrap_or_default(),
        }
    }
}

/// Runtime option store shared by every action of a driver
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    stored: Options,
}

impl ConfigStore {
    /// Create a store seeded with `initial`
    pub fn new(initial: Options) -> Self {
        Self { stored: initial }
    }

    /// Shallow-merge `partial` into the stored options
    pub fn set(&mut self, partial: &Options) {
        self.stored = self.stored.merge(partial);
    }

    /// Shallow-merge a JSON bag
    pub fn set_json(&mut self, partial: Value) -> Result<()> {
        let partial = Options::from_json(partial)?;
        self.set(&partial);
        Ok(())
    }

    /// Stored options layered over the defaults
    pub fn all(&self) -> Options {
        Options::defaults().merge(&self.stored)
    }

    /// A single effective value by its option name
    pub fn get(&self, name: &str) -> Result<Option<Value>> {
        let key = if name == "defaultTimeout" { "timeout" } else { name };
        let bag = serde_json::to_value(self.all())?;
        Ok(bag.get(key).cloned())
    }

    /// Settings for one call
    pub fn resolve(&self, call: &Options) -> Settings {
        Settings::resolve(&self.stored, call)
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn bool_like<'de, D>(deserializer: D) -> std::result::Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolLike {
        Bool(bool),
        Text(String),
    }

    match Option::<BoolLike>::deserialize(deserializer)? {
        None => Ok(None),
        Some(BoolLike::Bool(b)) => Ok(Some(b)),
        Some(BoolLike::Text(s)) => parse_bool(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("expected a boolean, got {:?}", s))),
    }
}

fn one_or_many<'de, D, T>(deserializer: D) -> std::result::Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        One(T),
        Many(Vec<T>),
    }

    Ok(match Option::<OneOrMany<T>>::deserialize(deserializer)? {
        None => None,
        Some(OneOrMany::One(item)) => Some(vec![item]),
        Some(OneOrMany::Many(items)) => Some(items),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let settings = Settings::resolve(&Options::default(), &Options::default());
        assert_eq!(settings.navigation_timeout, Duration::from_millis(30000));
        assert_eq!(settings.timeout, Duration::from_millis(10000));
        assert_eq!(settings.observe_time, Duration::from_millis(3000));
        assert_eq!(settings.retry_interval, Duration::from_millis(100));
        assert!(!settings.headless);
        assert!(!settings.implicit_wait);
        assert_eq!(settings.wait_until, LoadState::Load);
    }

    #[test]
    fn test_set_config_is_shallow_override_wins() {
        let mut store = ConfigStore::default();
        store.set_json(json!({"timeout": 1})).unwrap();
        store.set_json(json!({"retryTimeout": 2})).unwrap();

        assert_eq!(store.get("timeout").unwrap(), Some(json!(1)));
        assert_eq!(store.get("retryTimeout").unwrap(), Some(json!(2)));
        assert_eq!(store.get("defaultTimeout").unwrap(), Some(json!(1)));

        store.set_json(json!({"timeout": 5})).unwrap();
        assert_eq!(store.get("timeout").unwrap(), Some(json!(5)));
        assert_eq!(store.get("retryTimeout").unwrap(), Some(json!(2)));
    }

    #[test]
    fn test_call_site_beats_stored() {
        let mut store = ConfigStore::default();
        store.set(&Options {
            implicit_wait: Some(true),
            retry_timeout: Some(500),
            ..Default::default()
        });

        let call = Options {
            retry_timeout: Some(50),
            ..Default::default()
        };
        let settings = store.resolve(&call);
        assert!(settings.implicit_wait);
        assert_eq!(settings.retry_timeout, Duration::from_millis(50));
    }

    #[test]
    fn test_boolean_strings_coerced() {
        let options = Options::from_json(json!({"headless": "true", "observe": "FALSE"})).unwrap();
        assert_eq!(options.headless, Some(true));
        assert_eq!(options.observe, Some(false));

        assert!(Options::from_json(json!({"headless": "maybe"})).is_err());
    }

    #[test]
    fn test_wait_lists_accept_single_values() {
        let options = Options::from_json(json!({
            "waitForEvent": "load",
            "waitForRequest": ["https://a.test/", "/b\\.test/"],
        }))
        .unwrap();
        assert_eq!(options.wait_for_event, Some(vec!["load".to_string()]));
        let requests = options.wait_for_request.unwrap();
        assert!(!requests[0].is_regex());
        assert!(requests[1].is_regex());
    }

    #[test]
    fn test_unknown_browser_type_rejected() {
        let err = Options::from_json(json!({"browserType": "netscape"})).unwrap_err();
        assert!(err.to_string().contains("Unknown browser"));
    }

    #[test]
    fn test_unknown_key_returns_none() {
        let store = ConfigStore::default();
        assert_eq!(store.get("nope").unwrap(), None);
        assert_eq!(store.get("observeTime").unwrap(), Some(json!(3000)));
    }

    #[test]
    fn test_from_toml() {
        let options: Options = toml::from_str(
            r#"
            headless = true
            timeout = 2000
            extraHTTPHeaders = { "x-test" = "1" }
            "#,
        )
        .unwrap();
        assert_eq!(options.headless, Some(true));
        assert_eq!(options.timeout, Some(2000));
        assert_eq!(options.extra_http_headers.unwrap()["x-test"], "1");
    }
}
