//! Request interception through the facade
//!
//! Requests are issued from the in-memory page with `MockPage::fetch`, which runs
//! the context's route handler exactly like the Chrome engine's Fetch pump.

mod common;

use common::{active_mock_page, open_driver};
use oxidrums::config::Options;
use oxidrums::intercept::{MockResponse, ResponseSpec};
use oxidrums::matcher::Matcher;
use oxidrums::session::mock::FetchOutcome;
use oxidrums::session::ContextHandle;
use oxidrums::Error;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

fn body_of(outcome: &FetchOutcome) -> String {
    match outcome {
        FetchOutcome::Fulfilled(response) => String::from_utf8_lossy(&response.body).into_owned(),
        other => panic!("expected a fulfilled request, got {:?}", other),
    }
}

#[tokio::test]
async fn test_counted_mock_applies_once() {
    let (mut driver, launcher) = open_driver().await;
    driver
        .intercept(
            Matcher::exact("https://api.test/x"),
            ResponseSpec::Fulfill(MockResponse::json(json!({ "ok": true }))),
            Some(1),
        )
        .await
        .unwrap();
    let page = active_mock_page(&driver, &launcher);

    let first = page.fetch("https://api.test/x", "GET").await.unwrap();
    match &first {
        FetchOutcome::Fulfilled(response) => {
            assert_eq!(response.status, 200);
            assert!(response
                .headers
                .iter()
                .any(|(k, v)| k == "content-type" && v == "application/json"));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(body_of(&first), r#"{"ok":true}"#);

    let second = page.fetch("https://api.test/x", "GET").await.unwrap();
    assert_eq!(second, FetchOutcome::Continued { status: 200 });
}

#[tokio::test]
async fn test_unlimited_mock_is_never_evicted() {
    let (mut driver, launcher) = open_driver().await;
    driver
        .intercept(
            Matcher::parse("/api\\.test/").unwrap(),
            ResponseSpec::Fulfill(MockResponse::text("stub")),
            None,
        )
        .await
        .unwrap();
    let page = active_mock_page(&driver, &launcher);

    for path in ["a", "b", "c", "a"] {
        let outcome = page.fetch(&format!("https://api.test/{}", path), "GET").await.unwrap();
        assert_eq!(body_of(&outcome), "stub");
    }
}

#[tokio::test]
async fn test_exhausted_rule_falls_through_to_next() {
    let (mut driver, launcher) = open_driver().await;
    driver
        .intercept(
            Matcher::exact("https://api.test/x"),
            ResponseSpec::Fulfill(MockResponse::text("first")),
            Some(1),
        )
        .await
        .unwrap();
    driver
        .intercept(
            Matcher::exact("https://api.test/x"),
            ResponseSpec::Fulfill(MockResponse::text("second")),
            None,
        )
        .await
        .unwrap();
    let page = active_mock_page(&driver, &launcher);

    let first = page.fetch("https://api.test/x", "GET").await.unwrap();
    let second = page.fetch("https://api.test/x", "GET").await.unwrap();
    assert_eq!(body_of(&first), "first");
    assert_eq!(body_of(&second), "second");
}

#[tokio::test]
async fn test_block_aborts_requests_and_navigation() {
    let (mut driver, launcher) = open_driver().await;
    driver
        .intercept(Matcher::parse("/blocked\\.test/").unwrap(), ResponseSpec::Block, None)
        .await
        .unwrap();
    let page = active_mock_page(&driver, &launcher);

    let outcome = page.fetch("https://blocked.test/img.png", "GET").await.unwrap();
    assert_eq!(outcome, FetchOutcome::Aborted);

    let err = assert_err!(driver.goto("https://blocked.test/", &Options::default()).await);
    assert!(matches!(err, Error::NavigationFailed(_)));
}

#[tokio::test]
async fn test_redirect_changes_final_url() {
    let (mut driver, launcher) = open_driver().await;
    launcher.web().add_site("https://new.test/", "New");
    driver
        .intercept(
            Matcher::exact("https://old.test/"),
            ResponseSpec::Redirect("https://new.test/".into()),
            None,
        )
        .await
        .unwrap();

    assert_ok!(driver.goto("https://old.test/", &Options::default()).await);
    assert_eq!(driver.current_url().await.unwrap(), "https://new.test/");
    assert_eq!(driver.title().await.unwrap(), "New");
}

#[tokio::test]
async fn test_handler_sees_request() {
    let (mut driver, launcher) = open_driver().await;
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    driver
        .intercept(
            Matcher::parse("/api\\.test/").unwrap(),
            ResponseSpec::handler(move |request| {
                let counter = Arc::clone(&counter);
                async move {
                    assert_eq!(request.method(), "POST");
                    counter.fetch_add(1, Ordering::SeqCst);
                    request.proceed().await
                }
            }),
            None,
        )
        .await
        .unwrap();
    let page = active_mock_page(&driver, &launcher);

    let outcome = page.fetch("https://api.test/save", "POST").await.unwrap();
    assert_eq!(outcome, FetchOutcome::Continued { status: 200 });
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_clear_intercept_removes_route() {
    let (mut driver, launcher) = open_driver().await;
    driver
        .intercept(Matcher::exact("https://a.test/"), ResponseSpec::Block, None)
        .await
        .unwrap();
    driver
        .intercept(Matcher::exact("https://b.test/"), ResponseSpec::Block, None)
        .await
        .unwrap();
    let context = launcher.browser().unwrap().contexts().remove(0);
    assert!(context.is_routed());

    assert_eq!(driver.clear_intercept(Some(&Matcher::exact("https://a.test/"))).await.unwrap(), 1);
    assert!(context.is_routed());

    assert_eq!(driver.clear_intercept(None).await.unwrap(), 1);
    assert!(!context.is_routed());

    let page = active_mock_page(&driver, &launcher);
    let outcome = page.fetch("https://b.test/", "GET").await.unwrap();
    assert_eq!(outcome, FetchOutcome::Continued { status: 200 });
}

#[tokio::test]
async fn test_clear_intercept_respects_regex_flags() {
    let (mut driver, launcher) = open_driver().await;
    driver
        .intercept(Matcher::parse("/api/i").unwrap(), ResponseSpec::Block, None)
        .await
        .unwrap();
    driver
        .intercept(
            Matcher::parse("/api/").unwrap(),
            ResponseSpec::Fulfill(MockResponse::text("stub")),
            None,
        )
        .await
        .unwrap();

    assert_eq!(driver.clear_intercept(Some(&Matcher::parse("/api/").unwrap())).await.unwrap(), 1);

    let page = active_mock_page(&driver, &launcher);
    let outcome = page.fetch("https://API.test/", "GET").await.unwrap();
    assert_eq!(outcome, FetchOutcome::Aborted);
}

#[tokio::test]
async fn test_failed_route_install_keeps_table_empty() {
    let (mut driver, launcher) = open_driver().await;
    let context = launcher.browser().unwrap().contexts().remove(0);
    context.close().await.unwrap();

    let err = driver
        .intercept(Matcher::exact("https://a.test/"), ResponseSpec::Block, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("closed"));
    assert!(!context.is_routed());
    assert_eq!(driver.clear_intercept(None).await.unwrap(), 0);
}
