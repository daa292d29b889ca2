use barsync_core::common::time::FixedClock;
use barsync_core::config::Credentials;
use barsync_core::market::error::AuthError;
use barsync_core::market::port::TokenSource;
use barsync_feed::auth::TokenAuthority;
use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn credentials() -> Credentials {
    Credentials::new("client-abc", "secret-xyz", "refresh-123")
}

fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
    ))
}

async fn authority(server: &MockServer, clock: Arc<FixedClock>) -> TokenAuthority {
    let url = format!("{}/oauth/token", server.uri());
    TokenAuthority::new(&url, credentials(), clock).unwrap()
}

#[tokio::test]
async fn test_exchange_posts_refresh_grant_and_caches_token() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("client_id=client-abc"))
        .and(body_string_contains("refresh_token=refresh-123"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "at-1", "expires_in": 1200})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let auth = authority(&server, clock()).await;

    assert_eq!(auth.access_token().await?, "at-1");
    assert_eq!(auth.access_token().await?, "at-1");
    Ok(())
}

#[tokio::test]
async fn test_token_inside_refresh_buffer_is_replaced() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "at", "expires_in": 1200})),
        )
        .expect(2)
        .mount(&server)
        .await;

    let clock = clock();
    let auth = authority(&server, clock.clone()).await;
    auth.access_token().await?;

    // 20 分钟有效期，14 分钟时仍在缓冲期之外
    clock.advance(Duration::minutes(14));
    auth.access_token().await?;

    // 16 分钟时距过期不足 5 分钟
    clock.advance(Duration::minutes(2));
    auth.access_token().await?;
    Ok(())
}

#[tokio::test]
async fn test_missing_expires_in_defaults_to_twenty_minutes() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "at"})))
        .expect(2)
        .mount(&server)
        .await;

    let clock = clock();
    let auth = authority(&server, clock.clone()).await;
    auth.access_token().await?;

    clock.advance(Duration::minutes(14));
    auth.access_token().await?;

    clock.advance(Duration::seconds(61));
    auth.access_token().await?;
    Ok(())
}

#[tokio::test]
async fn test_missing_access_token_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"token_type": "Bearer", "refresh_token": "leak-me"})),
        )
        .mount(&server)
        .await;

    let auth = authority(&server, clock()).await;
    let err = auth.access_token().await.unwrap_err();

    match err {
        AuthError::InvalidResponse(msg) => {
            assert!(msg.contains("token_type"));
            assert!(!msg.contains("leak-me"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_out_of_range_expires_in_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "at", "expires_in": i64::MAX})),
        )
        .mount(&server)
        .await;

    let auth = authority(&server, clock()).await;
    let err = auth.access_token().await.unwrap_err();

    match err {
        AuthError::InvalidResponse(msg) => assert!(msg.contains("expires_in")),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_negative_expires_in_forces_refresh_on_next_call() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "at", "expires_in": -60})),
        )
        .expect(2)
        .mount(&server)
        .await;

    let auth = authority(&server, clock()).await;
    auth.access_token().await?;
    auth.access_token().await?;
    Ok(())
}

#[tokio::test]
async fn test_non_success_status_is_exchange_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
        .mount(&server)
        .await;

    let auth = authority(&server, clock()).await;
    let err = auth.access_token().await.unwrap_err();

    match err {
        AuthError::Exchange(msg) => {
            assert!(msg.contains("400"));
            assert!(msg.contains("invalid_grant"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_invalidate_forces_exchange() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "at", "expires_in": 3600})),
        )
        .expect(2)
        .mount(&server)
        .await;

    let auth = authority(&server, clock()).await;
    auth.access_token().await?;
    auth.invalidate().await;
    auth.access_token().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_exchange() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "shared", "expires_in": 1200}))
                .set_delay(std::time::Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let auth = Arc::new(authority(&server, clock()).await);
    let mut handles = Vec::new();
    for _ in 0..8 {
        let auth = auth.clone();
        handles.push(tokio::spawn(async move { auth.access_token().await }));
    }

    for handle in handles {
        assert_eq!(handle.await??, "shared");
    }
    Ok(())
}
