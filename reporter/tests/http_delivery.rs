use std::time::Duration;

use httpmock::{Method, MockServer};
use reporter::{
    Analytics, AsyncBatchConfig, BatchConfig, DebugConfig, TrackEvent, UserEvent,
};
use serde_json::json;

use common::{completion, outcome};

mod common;

#[tokio::test]
async fn debug_mode_posts_one_form_per_record() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(Method::POST)
                .path("/data_debug")
                .header("content-type", "application/x-www-form-urlencoded")
                .x_www_form_urlencoded_tuple("source", "server")
                .x_www_form_urlencoded_tuple("appid", "app-id")
                .x_www_form_urlencoded_tuple("dryRun", "1")
                .x_www_form_urlencoded_tuple("deviceId", "device-1");
            then.status(200).json_body(json!({"errorLevel": 0}));
        })
        .await;

    let analytics = Analytics::debug(
        &server.base_url(),
        "app-id",
        DebugConfig {
            dry_run: true,
            device_id: Some("device-1".to_owned()),
            ..Default::default()
        },
    )
    .unwrap();

    let (callback, rx) = completion();
    analytics
        .track(
            TrackEvent::new("purchase")
                .distinct_id("device")
                .property("price", 12)
                .on_complete(callback),
        )
        .await;

    assert_eq!(outcome(&rx), Ok(()));
    mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn debug_mode_reports_rejections() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(Method::POST).path("/data_debug");
            then.status(200)
                .json_body(json!({"errorLevel": -1, "errorReasons": "missing #time"}));
        })
        .await;

    let analytics = Analytics::debug(&server.base_url(), "app-id", DebugConfig::default()).unwrap();

    let (callback, rx) = completion();
    analytics
        .track(
            TrackEvent::new("purchase")
                .distinct_id("device")
                .on_complete(callback),
        )
        .await;

    let error = outcome(&rx).unwrap_err();
    assert!(error.starts_with("failed to deliver events: unexpected result code: -1"));
}

#[tokio::test]
async fn batch_mode_sends_full_batches_with_headers() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(Method::POST)
                .path("/sync_server")
                .header("appid", "app-id")
                .header("compress", "none")
                .header("ta-integration-type", "rust")
                .header("ta-integration-count", "2")
                .body_contains(r##""#event_name":"first""##)
                .body_contains(r##""#event_name":"second""##);
            then.status(200).json_body(json!({"code": 0}));
        })
        .await;

    let analytics = Analytics::batch(
        &server.base_url(),
        "app-id",
        BatchConfig {
            batch_size: 2,
            compress: false,
            ..Default::default()
        },
    )
    .unwrap();

    for name in ["first", "second"] {
        analytics
            .track(TrackEvent::new(name).distinct_id("device"))
            .await;
    }

    mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn batch_mode_compresses_by_default() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(Method::POST)
                .path("/sync_server")
                .header("compress", "gzip")
                .header("ta-integration-count", "1");
            then.status(200).json_body(json!({"code": 0}));
        })
        .await;

    let analytics = Analytics::batch(&server.base_url(), "app-id", BatchConfig::default()).unwrap();

    analytics
        .user_set(UserEvent::new().account_id("u1").property("age", 30))
        .await;
    let (callback, rx) = completion();
    analytics.flush(Some(Box::new(callback))).await;

    assert_eq!(outcome(&rx), Ok(()));
    mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn batch_mode_surfaces_receiver_errors() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(Method::POST).path("/sync_server");
            then.status(200)
                .json_body(json!({"code": -1, "msg": "invalid appid"}));
        })
        .await;

    let analytics = Analytics::batch(&server.base_url(), "app-id", BatchConfig::default()).unwrap();

    analytics
        .track(TrackEvent::new("purchase").distinct_id("device"))
        .await;
    let (callback, rx) = completion();
    analytics.close(Some(Box::new(callback))).await;

    assert_eq!(
        outcome(&rx),
        Err("failed to deliver events: unexpected result code: -1, msg: invalid appid".to_owned())
    );
}

#[tokio::test]
async fn server_url_path_is_replaced_by_the_endpoint() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(Method::POST).path("/sync_server");
            then.status(200).json_body(json!({"code": 0}));
        })
        .await;

    let analytics = Analytics::batch(
        &server.url("/some/prefix?x=1"),
        "app-id",
        BatchConfig::default(),
    )
    .unwrap();

    analytics
        .track(TrackEvent::new("purchase").distinct_id("device"))
        .await;
    analytics.flush(None).await;

    mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn async_batch_mode_flushes_on_timer_and_close() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(Method::POST).path("/sync_server");
            then.status(200).json_body(json!({"code": 0}));
        })
        .await;

    let analytics = Analytics::async_batch(
        &server.base_url(),
        "app-id",
        AsyncBatchConfig {
            interval: Duration::from_millis(100),
            ..Default::default()
        },
    )
    .unwrap();

    analytics
        .track(TrackEvent::new("first").distinct_id("device"))
        .await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    mock.assert_hits_async(1).await;

    analytics
        .track(TrackEvent::new("second").distinct_id("device"))
        .await;
    let (callback, rx) = completion();
    analytics.close(Some(Box::new(callback))).await;

    assert_eq!(outcome(&rx), Ok(()));
    mock.assert_hits_async(2).await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    mock.assert_hits_async(2).await;
}

#[test]
fn unsupported_schemes_are_rejected() {
    let result = Analytics::batch("ftp://receiver.example.com", "app-id", BatchConfig::default());
    assert!(matches!(
        result,
        Err(reporter::ConfigError::UnsupportedScheme(_))
    ));
}
