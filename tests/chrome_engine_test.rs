//! Chrome engine end to end over a mock DevTools server
//!
//! The facade talks to `MockChromeServer` exactly as it would to a browser
//! started elsewhere, through `cdpEndpoint`.

mod mock_chrome;

use mock_chrome::MockChromeServer;
use oxidrums::config::Options;
use oxidrums::matcher::Matcher;
use oxidrums::Driver;
use std::collections::HashMap;

fn attach_to(server: &MockChromeServer, url: Option<&str>) -> Options {
    Options {
        cdp_endpoint: Some(server.ws_endpoint().to_string()),
        url: url.map(str::to_string),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_open_browser_and_navigate() {
    let titles = HashMap::from([("https://a.test/".to_string(), "Ant Site".to_string())]);
    let server = MockChromeServer::start_with_titles(titles).await.unwrap();
    let mut driver = Driver::new();

    driver
        .open_browser(&attach_to(&server, Some("https://a.test/")))
        .await
        .expect("Failed to open browser");

    assert_eq!(driver.current_url().await.unwrap(), "https://a.test/");
    assert_eq!(driver.title().await.unwrap(), "Ant Site");
    driver.close_browser().await.unwrap();
}

#[tokio::test]
async fn test_switch_between_chrome_pages() {
    let titles = HashMap::from([
        ("https://a.test/".to_string(), "Ant Site".to_string()),
        ("https://b.test/".to_string(), "Bee Site".to_string()),
    ]);
    let server = MockChromeServer::start_with_titles(titles).await.unwrap();
    let mut driver = Driver::new();
    driver
        .open_browser(&attach_to(&server, Some("https://a.test/")))
        .await
        .unwrap();
    driver
        .open_page(&Options {
            url: Some("https://b.test/".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(driver.title().await.unwrap(), "Bee Site");

    driver.switch_page(&Matcher::parse("/ant/i").unwrap()).await.unwrap();
    assert_eq!(driver.current_url().await.unwrap(), "https://a.test/");

    driver.close_page(None, None).await.unwrap();
    assert_eq!(driver.current_url().await.unwrap(), "https://b.test/");
    driver.close_browser().await.unwrap();
}

#[tokio::test]
async fn test_open_context_without_url() {
    let server = MockChromeServer::start().await.unwrap();
    let mut driver = Driver::new();
    driver.open_browser(&attach_to(&server, None)).await.unwrap();
    driver
        .open_context(&Options {
            context_name: Some("blank".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    driver.open_page(&Options::default()).await.unwrap();

    assert_eq!(driver.current_url().await.unwrap(), "about:blank");
    assert!(driver.get_cookies(None).await.unwrap().is_empty());

    driver.close_context(None).await.unwrap();
    assert!(driver.session().current_context().is_none());
    driver.close_browser().await.unwrap();
}
