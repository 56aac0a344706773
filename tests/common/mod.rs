//! Common test utilities
//!
//! Shared helpers for driving the facade over the in-memory engine.

#![allow(dead_code)]

use oxidrums::config::Options;
use oxidrums::session::{MockLauncher, MockPage};
use oxidrums::Driver;
use std::sync::Arc;

/// Options with just `url` set
pub fn at(url: &str) -> Options {
    Options {
        url: Some(url.to_string()),
        ..Default::default()
    }
}

/// Driver over a fresh mock engine, nothing opened yet
pub fn mock_driver() -> (Driver, Arc<MockLauncher>) {
    let launcher = Arc::new(MockLauncher::new());
    let driver = Driver::with_launcher(launcher.clone());
    (driver, launcher)
}

/// Driver with a browser, a context and one blank page open
pub async fn open_driver() -> (Driver, Arc<MockLauncher>) {
    let (mut driver, launcher) = mock_driver();
    driver
        .open_browser(&Options {
            headless: Some(true),
            ..Default::default()
        })
        .await
        .expect("Failed to open browser");
    driver
        .open_context(&Options::default())
        .await
        .expect("Failed to open context");
    driver
        .open_page(&Options::default())
        .await
        .expect("Failed to open page");
    (driver, launcher)
}

/// The engine-side page behind the driver's active page
pub fn active_mock_page(driver: &Driver, launcher: &MockLauncher) -> Arc<MockPage> {
    let current = driver.session().current_page().expect("no active page");
    launcher
        .page(current.handle.id())
        .expect("active page unknown to the mock engine")
}
