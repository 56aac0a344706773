//! # Chrome DevTools Protocol (CDP) 层
//!
//! 提供与 Chrome/Chromium 浏览器的 WebSocket 通信接口，是 Chrome 引擎句柄的传输层。
//!
//! ## 主要功能
//! - **WebSocket 连接管理**: 一条浏览器级连接，按 `sessionId` 复用多个目标会话 (flatten 模式)
//! - **协议通信**: 发送 CDP 命令并按 ID 关联响应，按命令类型设置超时
//! - **事件订阅**: 事件按会话过滤后分发给订阅者
//! - **浏览器操作**: 浏览器上下文、目标的创建、附加与关闭
//!
//! ## 模块结构
//! - `traits`: CDP 操作的核心 trait 定义
//! - `types`: CDP 协议相关的数据类型
//! - `connection`: WebSocket 连接实现
//! - `client`: 绑定单个会话的 CDP 客户端
//! - `browser`: 浏览器级别的操作
//! - `mock`: 可编排响应的测试连接
//!
//! ## 使用示例
//! ```rust,no_run
//! use oxidrums::cdp::{CdpBrowser, CdpBrowserImpl, CdpClient};
//!
//! # async fn example() -> Result<(), oxidrums::Error> {
//! let browser = CdpBrowserImpl::connect("http://localhost:9222").await?;
//! let target = browser.create_target("https://example.com", None).await?;
//! let page = browser.attach(&target).await?;
//! let title = page.evaluate("document.title", None, true).await?;
//! println!("Title: {:?}", title.value);
//! # Ok(())
//! # }
//! ```

pub mod traits;
pub mod types;
pub mod connection;
pub mod client;
pub mod browser;
pub mod mock;

#[cfg(test)]
mod tests;

pub use traits::{BrowserVersion, CdpBrowser, CdpClient, CdpConnection, CdpError, CdpEvent, CdpResponse};
pub use types::{CallArgument, Clip, RemoteObject, TargetInfo};

pub use browser::{discover_ws_url, CdpBrowserImpl};
pub use client::CdpClientImpl;
pub use connection::{CdpTimeoutConfig, CdpWebSocketConnection};

pub use mock::MockCdpConnection;
