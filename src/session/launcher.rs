//! Chrome launcher
//!
//! Connects to a running browser when `cdp_endpoint` is configured, otherwise
//! spawns a local Chrome with a throwaway profile and reads the DevTools
//! WebSocket URL it prints on stderr.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, Command};
use tracing::{debug, info, trace};
use uuid::Uuid;

use super::browser::ChromeBrowser;
use crate::cdp::CdpBrowserImpl;
use crate::session::traits::{BrowserHandle, BrowserLauncher, LaunchOptions};
use crate::{Error, Result};

const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

const EXECUTABLE_NAMES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

#[cfg(target_os = "macos")]
const KNOWN_PATHS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];

#[cfg(target_os = "windows")]
const KNOWN_PATHS: &[&str] = &[
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
];

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const KNOWN_PATHS: &[&str] = &["/usr/bin/google-chrome", "/usr/bin/chromium", "/snap/bin/chromium"];

/// WebSocket URL from a `DevTools listening on ws://...` stderr line
pub(crate) fn parse_devtools_line(line: &str) -> Option<&str> {
    line.trim()
        .strip_prefix("DevTools listening on ")
        .filter(|url| url.starts_with("ws://"))
}

async fn read_endpoint(lines: &mut Lines<BufReader<ChildStderr>>) -> Result<String> {
    while let Some(line) = lines.next_line().await? {
        trace!("chrome: {}", line);
        if let Some(url) = parse_devtools_line(&line) {
            return Ok(url.to_string());
        }
    }
    Err(Error::browser_not_found("Browser exited before opening the DevTools endpoint"))
}

fn search_path(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Launches Chrome or attaches to a running one
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    startup_timeout: Duration,
}

impl Default for ChromeLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl ChromeLauncher {
    pub fn new() -> Self {
        Self {
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
        }
    }

    /// How long to wait for the DevTools endpoint after spawning
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Explicit path, then `CHROME_PATH`, then well-known install locations, then `PATH`
    pub fn find_executable(explicit: Option<&str>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            let path = PathBuf::from(path);
            if path.is_file() {
                return Ok(path);
            }
            return Err(Error::configuration(format!(
                "Browser executable not found: {}",
                path.display()
            )));
        }
        if let Some(path) = std::env::var_os("CHROME_PATH").map(PathBuf::from) {
            if path.is_file() {
                return Ok(path);
            }
        }
        KNOWN_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|p| p.is_file())
            .or_else(|| EXECUTABLE_NAMES.iter().find_map(|name| search_path(name)))
            .ok_or_else(|| {
                Error::configuration(
                    "No Chrome executable found; set executablePath or CHROME_PATH, or configure cdpEndpoint",
                )
            })
    }

    /// Command-line flags for a spawned browser
    pub fn arguments(options: &LaunchOptions, user_data_dir: &Path) -> Vec<String> {
        let mut args = vec![
            "--remote-debugging-port=0".to_string(),
            format!("--user-data-dir={}", user_data_dir.display()),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--disable-background-networking".to_string(),
            "--disable-sync".to_string(),
        ];
        if options.headless {
            args.extend(["--headless=new", "--hide-scrollbars", "--mute-audio"].map(String::from));
        }
        args.extend(options.args.iter().cloned());
        args.push("about:blank".to_string());
        args
    }

    async fn wait_for_endpoint(&self, stderr: ChildStderr) -> Result<String> {
        let mut lines = BufReader::new(stderr).lines();
        let url = tokio::time::timeout(self.startup_timeout, read_endpoint(&mut lines))
            .await
            .map_err(|_| {
                Error::timeout(format!(
                    "Browser did not open the DevTools endpoint within {}ms",
                    self.startup_timeout.as_millis()
                ))
            })??;

        // drain the rest of stderr
        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                trace!("chrome: {}", line);
            }
        });
        Ok(url)
    }

    async fn spawn(&self, options: &LaunchOptions) -> Result<(Child, String, PathBuf)> {
        let executable = Self::find_executable(options.executable_path.as_deref())?;
        let user_data_dir = std::env::temp_dir().join(format!("oxidrums-{}", Uuid::new_v4()));
        let args = Self::arguments(options, &user_data_dir);
        info!("Launching {} (headless: {})", executable.display(), options.headless);
        debug!("Browser arguments: {:?}", args);

        let mut child = Command::new(&executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::internal("Browser stderr was not captured"))?;

        match self.wait_for_endpoint(stderr).await {
            Ok(url) => Ok((child, url, user_data_dir)),
            Err(e) => {
                let _ = child.kill().await;
                let _ = tokio::fs::remove_dir_all(&user_data_dir).await;
                Err(e)
            }
        }
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self, options: &LaunchOptions) -> Result<Arc<dyn BrowserHandle>> {
        if let Some(endpoint) = &options.cdp_endpoint {
            info!("Connecting to running browser at {}", endpoint);
            let cdp = CdpBrowserImpl::connect(endpoint).await?;
            return Ok(Arc::new(ChromeBrowser::connected(Arc::new(cdp))));
        }

        let (child, url, user_data_dir) = self.spawn(options).await?;
        let cdp = CdpBrowserImpl::connect(&url).await?;
        info!("Browser ready at {}", url);
        Ok(Arc::new(ChromeBrowser::spawned(Arc::new(cdp), child, user_data_dir)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_devtools_line() {
        assert_eq!(
            parse_devtools_line("DevTools listening on ws://127.0.0.1:41234/devtools/browser/abc\n"),
            Some("ws://127.0.0.1:41234/devtools/browser/abc")
        );
        assert_eq!(parse_devtools_line("[0101/000000.000:ERROR:gpu_init.cc] oops"), None);
    }

    #[test]
    fn test_headless_arguments() {
        let options = LaunchOptions {
            headless: true,
            args: vec!["--lang=de".to_string()],
            ..Default::default()
        };
        let args = ChromeLauncher::arguments(&options, Path::new("/tmp/profile"));
        assert_eq!(args[0], "--remote-debugging-port=0");
        assert!(args.contains(&"--user-data-dir=/tmp/profile".to_string()));
        assert!(args.contains(&"--headless=new".to_string()));
        let lang = args.iter().position(|a| a == "--lang=de").unwrap();
        assert_eq!(args.last().map(String::as_str), Some("about:blank"));
        assert!(lang < args.len() - 1);
    }

    #[test]
    fn test_headed_arguments() {
        let args = ChromeLauncher::arguments(&LaunchOptions::default(), Path::new("/tmp/p"));
        assert!(!args.iter().any(|a| a.starts_with("--headless")));
    }

    #[test]
    fn test_missing_explicit_executable() {
        let err = ChromeLauncher::find_executable(Some("/definitely/not/chrome")).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let options = LaunchOptions {
            cdp_endpoint: Some("ws://127.0.0.1:1/devtools/browser/x".to_string()),
            ..Default::default()
        };
        assert!(ChromeLauncher::new().launch(&options).await.is_err());
    }
}
