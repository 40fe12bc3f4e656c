//! Bearer auth and refresh-and-retry against a mock backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use campusnet_client::{ApiClient, TokenStore};
use campusnet_shared::ApiError;
use futures_util::future::join_all;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn setup(access: &str, refresh: &str) -> (MockServer, TokenStore, ApiClient) {
    let server = MockServer::start().await;
    let tokens = TokenStore::in_memory();
    tokens.set_tokens(access, refresh);
    let api = ApiClient::new(&server.uri(), tokens.clone());
    (server, tokens, api)
}

fn unauthorized() -> ResponseTemplate {
    ResponseTemplate::new(401).set_body_json(json!({ "detail": "Could not validate credentials" }))
}

async fn mount_refresh(server: &MockServer, from: &str, to: (&str, &str), delay: Duration) {
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_json(json!({ "refresh_token": from })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": to.0, "refresh_token": to.1 }))
                .set_delay(delay),
        )
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn requests_carry_the_bearer_token() {
    let (server, _tokens, api) = setup("a1", "r1").await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .and(header("authorization", "Bearer a1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1,
            "email": "ada@campus.example",
            "fullName": "Ada",
            "user_type": "student",
            "profile_completed": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let me = api.me().await.unwrap();
    assert_eq!(me.full_name, "Ada");
}

#[tokio::test]
async fn expired_token_is_refreshed_and_request_retried() {
    let (server, tokens, api) = setup("old", "r1").await;
    Mock::given(method("GET"))
        .and(path("/chats"))
        .and(header("authorization", "Bearer old"))
        .respond_with(unauthorized())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/chats"))
        .and(header("authorization", "Bearer new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh(&server, "r1", ("new", "r2"), Duration::ZERO).await;

    let chats = api.list_chats().await.unwrap();
    assert!(chats.is_empty());
    assert_eq!(tokens.access_token().as_deref(), Some("new"));
    assert_eq!(tokens.refresh_token().as_deref(), Some("r2"));
}

#[tokio::test]
async fn concurrent_401s_share_one_refresh() {
    let (server, _tokens, api) = setup("old", "r1").await;
    Mock::given(method("GET"))
        .and(path("/connections/pending/incoming"))
        .and(header("authorization", "Bearer old"))
        .respond_with(unauthorized())
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/connections/pending/incoming"))
        .and(header("authorization", "Bearer new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(5)
        .mount(&server)
        .await;
    mount_refresh(&server, "r1", ("new", "r2"), Duration::from_millis(200)).await;

    let results = join_all((0..5).map(|_| api.list_pending_incoming())).await;
    assert!(results.iter().all(Result::is_ok));
}

#[tokio::test]
async fn late_401_after_someone_else_refreshed_retries_without_refreshing() {
    let (server, tokens, api) = setup("old", "r1").await;
    // Slow request: its 401 lands after the refresh below has finished.
    Mock::given(method("GET"))
        .and(path("/chats"))
        .and(header("authorization", "Bearer old"))
        .respond_with(unauthorized().set_delay(Duration::from_millis(300)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/chats"))
        .and(header("authorization", "Bearer new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .and(header("authorization", "Bearer old"))
        .respond_with(unauthorized())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .and(header("authorization", "Bearer new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1,
            "email": "ada@campus.example",
            "fullName": "Ada",
            "user_type": "student",
            "profile_completed": true
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh(&server, "r1", ("new", "r2"), Duration::ZERO).await;

    let (chats, me) = tokio::join!(api.list_chats(), api.me());
    assert!(chats.unwrap().is_empty());
    assert_eq!(me.unwrap().full_name, "Ada");
    assert_eq!(tokens.refresh_token().as_deref(), Some("r2"));
}

#[tokio::test]
async fn failed_refresh_fails_every_waiter_and_ends_the_session() {
    let (server, tokens, api) = setup("old", "r1").await;
    let expired = Arc::new(AtomicUsize::new(0));
    let counter = expired.clone();
    let api = api.with_session_expired_hook(move |()| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    Mock::given(method("GET"))
        .and(path("/chats"))
        .respond_with(unauthorized())
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(unauthorized().set_delay(Duration::from_millis(200)))
        .expect(1)
        .mount(&server)
        .await;

    let results = join_all((0..3).map(|_| api.list_chats())).await;
    for result in results {
        assert_eq!(result.unwrap_err(), ApiError::SessionExpired);
    }
    assert_eq!(tokens.access_token(), None);
    assert_eq!(tokens.refresh_token(), None);
    assert_eq!(expired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_refresh_token_expires_without_network_call() {
    let (server, tokens, api) = setup("old", "").await;
    let expired = Arc::new(AtomicUsize::new(0));
    let counter = expired.clone();
    let api = api.with_session_expired_hook(move |()| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    Mock::given(method("GET"))
        .and(path("/chats"))
        .respond_with(unauthorized())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = api.list_chats().await.unwrap_err();
    assert_eq!(err, ApiError::SessionExpired);
    assert!(!tokens.has_session());
    assert_eq!(expired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn retried_request_is_not_refreshed_twice() {
    let (server, _tokens, api) = setup("old", "r1").await;
    Mock::given(method("POST"))
        .and(path("/chats/9/mark-as-read"))
        .respond_with(unauthorized())
        .expect(2)
        .mount(&server)
        .await;
    mount_refresh(&server, "r1", ("new", "r2"), Duration::ZERO).await;

    let err = api.mark_chat_read(9).await.unwrap_err();
    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn public_endpoints_skip_bearer_and_refresh() {
    let (server, tokens, api) = setup("old", "r1").await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "detail": "Incorrect email or password" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = api.login("ada@campus.example", "wrong").await.unwrap_err();
    assert_eq!(err.detail(), "Incorrect email or password");
    assert_eq!(tokens.access_token().as_deref(), Some("old"));

    let requests = server.received_requests().await.unwrap();
    assert!(requests
        .iter()
        .all(|req| req.headers.get("authorization").is_none()));
}

#[tokio::test]
async fn login_stores_tokens_unless_second_factor_pending() {
    let (server, tokens, api) = setup("", "").await;
    tokens.clear();
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({ "email": "ada@campus.example", "password": "pw" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "a1",
            "refresh_token": "r1",
            "token_type": "bearer"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({ "email": "grace@campus.example", "password": "pw" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "requires_2fa": true })))
        .mount(&server)
        .await;

    let pending = api.login("grace@campus.example", "pw").await.unwrap();
    assert!(pending.requires_2fa);
    assert!(!tokens.has_session());

    api.login("ada@campus.example", "pw").await.unwrap();
    assert_eq!(tokens.access_token().as_deref(), Some("a1"));
    assert_eq!(tokens.refresh_token().as_deref(), Some("r1"));
}
