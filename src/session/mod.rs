//! # 会话层
//!
//! 浏览器、上下文、页面、框架和元素的句柄抽象，以及基于 CDP 的 Chrome 实现。
//!
//! ## 主要功能
//! - **引擎抽象**: `BrowserLauncher` / `BrowserHandle` / `ContextHandle` / `PageHandle` /
//!   `FrameHandle` / `ElementHandle` trait，驱动层只依赖这些接口
//! - **Chrome 实现**: 启动或连接 Chrome，每个页面一个 flatten 会话和事件泵
//! - **会话状态**: 当前上下文与页面、激活历史、页面标识
//! - **内存引擎**: 不需要浏览器的 Mock 实现，用于测试
//!
//! ## 模块结构
//! - `traits`: 句柄 trait 与公共类型
//! - `manager`: 会话状态 (`Session`)
//! - `launcher`: Chrome 启动器
//! - `browser` / `context` / `page` / `frame` / `element`: Chrome 句柄
//! - `input`: 键盘与鼠标输入
//! - `mock`: 内存引擎
//!
//! ## 使用示例
//! ```rust,no_run
//! use oxidrums::session::{BrowserLauncher, ChromeLauncher, ContextOptions, LaunchOptions, NavigationOptions};
//!
//! # async fn example() -> Result<(), oxidrums::Error> {
//! let browser = ChromeLauncher::new()
//!     .launch(&LaunchOptions { headless: true, ..Default::default() })
//!     .await?;
//! let context = browser.new_context(&ContextOptions::default()).await?;
//! let page = context.new_page().await?;
//! page.goto("https://example.com", &NavigationOptions::default()).await?;
//! println!("Title: {}", page.title().await?);
//! # Ok(())
//! # }
//! ```

pub mod traits;
pub mod manager;
pub mod launcher;
pub mod browser;
pub mod context;
pub mod page;
pub mod frame;
pub mod element;
pub mod input;
pub mod mock;

#[cfg(test)]
mod tests;

pub use traits::{
    BoundingBox, BrowserHandle, BrowserLauncher, ClickOptions, ContextHandle, ContextOptions, Cookie,
    ElementHandle, FrameHandle, FulfillResponse, Geolocation, LaunchOptions, LoadState, MouseButton,
    NavigationOptions, PageEvent, PageHandle, Query, RequestInfo, ResponseInfo, RouteHandler, RoutedRequest,
    SameSite, Viewport,
};

pub use manager::Session;

// Chrome implementation
pub use browser::ChromeBrowser;
pub use context::ChromeContext;
pub use element::ChromeElement;
pub use frame::ChromeFrame;
pub use launcher::ChromeLauncher;
pub use page::{ChromePage, ChromeRoutedRequest};

// In-memory engine
pub use mock::{MockBrowser, MockContext, MockElement, MockFrame, MockLauncher, MockPage, MockWeb};
