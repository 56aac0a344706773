//! Oxidrums: browser automation for test runners
//!
//! A high-level action vocabulary (open, goto, click, write, wait, intercept...)
//! over Chrome, driven through the Chrome DevTools Protocol. Elements are
//! addressed by deferred [`selector::Selector`]s that resolve against the live
//! page when an action runs.

pub mod error;
pub mod config;
pub mod logging;

pub mod matcher;
pub mod devices;
pub mod keys;

pub mod cdp;
pub mod session;
pub mod selector;
pub mod intercept;
pub mod driver;

// Re-exports
pub use error::{Error, Result};
pub use config::Options;
pub use driver::Driver;
pub use selector::Selector;

/// Oxidrums library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
