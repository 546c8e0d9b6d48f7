use std::fs;

use chrono::{Duration, Utc};
use drive_bucket::auth::{StaticTokenSession, TokenFileSession};
use drive_bucket_core::contract::SessionProvider;
use drive_bucket_core::error::AuthError;
use httpmock::prelude::*;
use serde_json::{json, Value};
use tempfile::tempdir;

#[tokio::test]
async fn fresh_cached_token_is_used_without_refresh() {
    let dir = tempdir().unwrap();
    let token_path = dir.path().join("token.json");
    let expiry = (Utc::now() + Duration::hours(1)).to_rfc3339();
    fs::write(
        &token_path,
        json!({"access_token": "cached", "refresh_token": "r", "expiry": expiry}).to_string(),
    )
    .unwrap();

    let sessions = TokenFileSession::new(&token_path, dir.path().join("client_secret.json"));
    let session = sessions.session().await.expect("session");

    assert_eq!(session.access_token(), "cached");
}

#[tokio::test]
async fn expired_token_is_refreshed_and_persisted() {
    let server = MockServer::start_async().await;
    let refresh = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/token")
                .body_includes("grant_type=refresh_token")
                .body_includes("refresh_token=refresh-me")
                .body_includes("client_id=cid");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"access_token": "renewed", "expires_in": 3600, "token_type": "Bearer"}));
        })
        .await;

    let dir = tempdir().unwrap();
    let token_path = dir.path().join("token.json");
    let secret_path = dir.path().join("client_secret.json");
    let expired = (Utc::now() - Duration::minutes(5)).to_rfc3339();
    fs::write(
        &token_path,
        json!({
            "access_token": "stale",
            "refresh_token": "refresh-me",
            "token_expiry": expired,
            "scopes": ["https://www.googleapis.com/auth/drive.readonly"]
        })
        .to_string(),
    )
    .unwrap();
    fs::write(
        &secret_path,
        json!({"installed": {
            "client_id": "cid",
            "client_secret": "csecret",
            "token_uri": server.url("/token")
        }})
        .to_string(),
    )
    .unwrap();

    let sessions = TokenFileSession::new(&token_path, &secret_path);
    let session = sessions.session().await.expect("refreshed session");
    assert_eq!(session.access_token(), "renewed");

    // Cached in memory: the second call does not hit the token endpoint again.
    let again = sessions.session().await.unwrap();
    assert_eq!(again.access_token(), "renewed");
    refresh.assert_hits_async(1).await;

    let persisted: Value = serde_json::from_str(&fs::read_to_string(&token_path).unwrap()).unwrap();
    assert_eq!(persisted["access_token"], "renewed");
    assert_eq!(persisted["refresh_token"], "refresh-me");
    assert!(persisted["expiry"].is_string());
    assert!(persisted["scopes"].is_array());
}

#[tokio::test]
async fn token_within_expiry_margin_is_refreshed() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/token");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"access_token": "renewed", "expires_in": 3600}));
        })
        .await;

    let dir = tempdir().unwrap();
    let token_path = dir.path().join("token.json");
    let almost = (Utc::now() + Duration::seconds(10)).to_rfc3339();
    fs::write(
        &token_path,
        json!({
            "access_token": "nearly-stale",
            "refresh_token": "r",
            "expiry": almost,
            "client_id": "cid",
            "client_secret": "cs",
            "token_uri": server.url("/token")
        })
        .to_string(),
    )
    .unwrap();

    let sessions = TokenFileSession::new(&token_path, dir.path().join("unused.json"));
    assert_eq!(sessions.session().await.unwrap().access_token(), "renewed");
}

#[tokio::test]
async fn missing_token_file_requires_consent() {
    let dir = tempdir().unwrap();
    let sessions = TokenFileSession::new(
        dir.path().join("token.json"),
        dir.path().join("client_secret.json"),
    );

    let err = sessions.session().await.unwrap_err();
    assert!(matches!(err, AuthError::ConsentRequired { .. }), "{err:?}");
}

#[tokio::test]
async fn rejected_refresh_is_reported() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/token");
            then.status(400).body(r#"{"error":"invalid_grant"}"#);
        })
        .await;

    let dir = tempdir().unwrap();
    let token_path = dir.path().join("token.json");
    fs::write(
        &token_path,
        json!({
            "access_token": "stale",
            "refresh_token": "revoked",
            "expiry": (Utc::now() - Duration::hours(1)).to_rfc3339(),
            "client_id": "cid",
            "client_secret": "cs",
            "token_uri": server.url("/token")
        })
        .to_string(),
    )
    .unwrap();

    let sessions = TokenFileSession::new(&token_path, dir.path().join("unused.json"));
    match sessions.session().await.unwrap_err() {
        AuthError::Rejected { status, body } => {
            assert_eq!(status, 400);
            assert!(body.contains("invalid_grant"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn expired_token_without_refresh_token_fails() {
    let dir = tempdir().unwrap();
    let token_path = dir.path().join("token.json");
    fs::write(
        &token_path,
        json!({"access_token": "stale", "expiry": (Utc::now() - Duration::hours(1)).to_rfc3339()})
            .to_string(),
    )
    .unwrap();

    let sessions = TokenFileSession::new(&token_path, dir.path().join("unused.json"));
    assert!(matches!(
        sessions.session().await.unwrap_err(),
        AuthError::NoRefreshToken
    ));
}

#[tokio::test]
async fn static_session_returns_its_token() {
    let sessions = StaticTokenSession::new("issued");
    assert_eq!(sessions.session().await.unwrap().access_token(), "issued");
}
