//! Drives `ApiClient` against a throwaway HTTP server on localhost.

mod common;

use common::{client, login_response, spawn_stub};
use stagehand::api::ApiError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[tokio::test]
async fn stale_token_is_refreshed_once_and_retried() {
    let logins = Arc::new(AtomicUsize::new(0));
    let counter = logins.clone();
    let base = spawn_stub(move |req| match (req.method.as_str(), req.path.as_str()) {
        ("POST", "/auth/login") => login_response(&counter),
        // Only the second token issued is accepted.
        ("GET", "/guilds/1") if req.token.as_deref() == Some("token-2") => {
            (200, r#"{"guild_id":"1"}"#.to_string())
        }
        _ => (401, String::new()),
    })
    .await;

    let api = client(&base);
    api.login().await.unwrap();
    let value: serde_json::Value = api.get("guilds/1").await.unwrap();
    assert_eq!(value["guild_id"], "1");
    assert_eq!(logins.load(Ordering::SeqCst), 2);

    // The refreshed token is kept for later calls.
    let _: serde_json::Value = api.get("guilds/1").await.unwrap();
    assert_eq!(logins.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn persistent_401_gives_up_after_one_retry() {
    let logins = Arc::new(AtomicUsize::new(0));
    let counter = logins.clone();
    let base = spawn_stub(move |req| match (req.method.as_str(), req.path.as_str()) {
        ("POST", "/auth/login") => login_response(&counter),
        _ => (401, String::new()),
    })
    .await;

    let api = client(&base);
    let result = api.get::<serde_json::Value>("guilds/1").await;
    assert!(matches!(result, Err(ApiError::Unauthorized)));
    // One lazy login for the first request, one retry.
    assert_eq!(logins.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn missing_records_are_not_found() {
    let logins = Arc::new(AtomicUsize::new(0));
    let counter = logins.clone();
    let base = spawn_stub(move |req| match (req.method.as_str(), req.path.as_str()) {
        ("POST", "/auth/login") => login_response(&counter),
        ("PUT", "/guilds/1/settings") => (200, String::new()),
        _ => (404, r#"{"error":"not found"}"#.to_string()),
    })
    .await;

    let api = client(&base);
    match api.delete("guilds/1/forms/9").await {
        Err(ApiError::NotFound(path)) => assert_eq!(path, "guilds/1/forms/9"),
        other => panic!("expected NotFound, got {:?}", other),
    }
    api.put("guilds/1/settings", &serde_json::json!({ "guild_id": "1" }))
        .await
        .unwrap();
    assert_eq!(logins.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rejected_credentials_fail_login() {
    let base = spawn_stub(|_| (401, String::new())).await;
    let result = client(&base).login().await;
    assert!(matches!(result, Err(ApiError::Unauthorized)));
}
