// Integration tests for the request pipeline
//
// These run ApiClient against mockito servers and raw TCP listeners to check
// retry counts, backoff, timeouts, token handling and body encoding.

use mockito::Matcher;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

use fitlog_client::{
    auth::storage::AUTH_TOKEN_KEY,
    auth::{KeyValueStore, MemoryStore, TokenManager},
    config::{Config, TokenStoreKind},
    ApiClient, ApiError, Method, RequestDescriptor,
};

// ==================================================================================================
// Test Helpers
// ==================================================================================================

struct Harness {
    client: ApiClient,
    secure: Arc<MemoryStore>,
}

/// Client against `base_url` with fast backoff and in-memory stores
fn harness(base_url: &str, retry_attempts: u32, retry_delay_ms: u64) -> Harness {
    let config = Config {
        api_url: base_url.to_string(),
        retry_attempts,
        retry_delay_ms,
        request_timeout_ms: 2_000,
        token_store: TokenStoreKind::Memory,
        ..Config::default()
    };

    let secure = Arc::new(MemoryStore::new());
    let tokens = Arc::new(
        TokenManager::new(base_url, secure.clone(), Arc::new(MemoryStore::new()))
            .expect("Failed to create token manager"),
    );
    let client = ApiClient::new(&config, tokens).expect("Failed to create API client");

    Harness { client, secure }
}

/// Address with nothing listening on it
fn refused_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}/api", port)
}

/// Listener that reads the request and closes the connection without answering
async fn hang_up_server() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            drop(socket);
        }
    });

    (format!("http://{}/api", addr), accepted)
}

/// Listener that accepts connections and never answers
async fn silent_server() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            held.push(socket);
        }
    });

    (format!("http://{}/api", addr), accepted)
}

// ==================================================================================================
// Success Path
// ==================================================================================================

#[tokio::test]
async fn test_get_user_success() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/users/5")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":5,"username":"ada"}"#)
        .expect(1)
        .create_async()
        .await;

    let h = harness(&server.url(), 3, 10);
    let response = h
        .client
        .execute(&RequestDescriptor::get("/users/5"))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(response.status, 200);
    assert_eq!(response.data["username"], "ada");
    assert_eq!(response.data["id"], 5);
}

#[tokio::test]
async fn test_empty_body_is_empty_object() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("DELETE", "/weights/3")
        .with_status(200)
        .with_body("")
        .create_async()
        .await;

    let h = harness(&server.url(), 3, 10);
    let response = h.client.delete("/weights/3").await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.data, json!({}));
    assert_eq!(response.message, None);
}

#[tokio::test]
async fn test_base_url_is_concatenated() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/steps")
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;

    let h = harness(&format!("{}/api", server.url()), 0, 10);
    let response = h.client.get("/steps").await.unwrap();

    mock.assert_async().await;
    assert_eq!(response.data, json!([]));
}

// ==================================================================================================
// Request Encoding
// ==================================================================================================

#[tokio::test]
async fn test_body_matches_data_for_write_methods() {
    let mut server = mockito::Server::new_async().await;
    let data = json!({"food": "oats", "calories": 150, "tags": ["breakfast"]});

    for method in [Method::Post, Method::Put, Method::Patch, Method::Delete] {
        let mock = server
            .mock(method.as_str(), "/food-logs/1")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(data.clone()))
            .with_status(200)
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;

        let h = harness(&server.url(), 0, 10);
        let descriptor = RequestDescriptor::new(method, "/food-logs/1").with_data(data.clone());
        h.client.execute(&descriptor).await.unwrap();

        mock.assert_async().await;
    }
}

#[tokio::test]
async fn test_no_body_without_data() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/auth/logout")
        .match_body(Matcher::Exact(String::new()))
        .with_status(204)
        .create_async()
        .await;

    let h = harness(&server.url(), 0, 10);
    h.client
        .execute(&RequestDescriptor::post("/auth/logout"))
        .await
        .unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_bearer_token_attached() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/cycles")
        .match_header("authorization", "Bearer abc123")
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;

    let h = harness(&server.url(), 0, 10);
    h.secure.set(AUTH_TOKEN_KEY, "abc123").unwrap();
    h.client.get("/cycles").await.unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_prefixed_token_not_double_prefixed() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/cycles")
        .match_header("authorization", "Bearer abc123")
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;

    let h = harness(&server.url(), 0, 10);
    h.secure.set(AUTH_TOKEN_KEY, "Bearer abc123").unwrap();
    h.client.get("/cycles").await.unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_no_authorization_without_token() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/activities")
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;

    let h = harness(&server.url(), 0, 10);
    h.client.get("/activities").await.unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_header_overrides_win() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/water")
        .match_header("content-type", "text/plain")
        .match_header("x-client", "fitlog-tests")
        .with_status(201)
        .with_body(r#"{"id":1}"#)
        .create_async()
        .await;

    let h = harness(&server.url(), 0, 10);
    let descriptor = RequestDescriptor::post("/water")
        .with_data(json!({"ml": 250}))
        .with_header("Content-Type", "text/plain")
        .with_header("X-Client", "fitlog-tests");
    let response = h.client.execute(&descriptor).await.unwrap();

    mock.assert_async().await;
    assert_eq!(response.status, 201);
}

#[tokio::test]
async fn test_invalid_header_fails_without_attempt() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/water")
        .with_status(200)
        .expect(0)
        .create_async()
        .await;

    let h = harness(&server.url(), 3, 10);
    let descriptor = RequestDescriptor::get("/water").with_header("bad header", "x");
    let err = h.client.execute(&descriptor).await.unwrap_err();

    mock.assert_async().await;
    assert!(matches!(err, ApiError::Unknown { .. }));
}

// ==================================================================================================
// Retry Policy
// ==================================================================================================

#[tokio::test]
async fn test_login_401_is_not_retried() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/auth/login")
        .match_body(Matcher::Json(json!({"username": "x", "password": "y"})))
        .with_status(401)
        .with_body(r#"{"message":"bad credentials"}"#)
        .expect(1)
        .create_async()
        .await;

    let h = harness(&server.url(), 3, 10);
    let descriptor = RequestDescriptor::post("/auth/login")
        .with_data(json!({"username": "x", "password": "y"}));
    let err = h.client.execute(&descriptor).await.unwrap_err();

    mock.assert_async().await;
    assert_eq!(err.status(), 401);
    assert_eq!(err.message(), "bad credentials");
    assert!(matches!(err, ApiError::Http { status: 401, .. }));
}

#[tokio::test]
async fn test_client_errors_single_attempt() {
    let mut server = mockito::Server::new_async().await;

    for status in [400, 403, 404, 409, 422, 429] {
        let path = format!("/sleeps/{}", status);
        let mock = server
            .mock("GET", path.as_str())
            .with_status(status)
            .with_body(r#"{"message":"nope"}"#)
            .expect(1)
            .create_async()
            .await;

        let h = harness(&server.url(), 5, 10);
        let err = h.client.get(path).await.unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.status(), status as u16);
    }
}

#[tokio::test]
async fn test_server_errors_exhaust_retries() {
    let mut server = mockito::Server::new_async().await;

    for status in [500, 502, 503] {
        let path = format!("/weights/{}", status);
        let mock = server
            .mock("GET", path.as_str())
            .with_status(status)
            .with_body(r#"{"message":"unavailable","code":"DOWN"}"#)
            .expect(3)
            .create_async()
            .await;

        let h = harness(&server.url(), 2, 10);
        let err = h.client.get(path).await.unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.status(), status as u16);
        assert_eq!(err.code(), "DOWN");
    }
}

#[tokio::test]
async fn test_linear_backoff_timing() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/steps")
        .with_status(503)
        .expect(3)
        .create_async()
        .await;

    let h = harness(&server.url(), 2, 100);
    let started = Instant::now();
    let _ = h.client.get("/steps").await;
    let elapsed = started.elapsed();

    // 100ms then 200ms between the three attempts
    assert!(elapsed >= Duration::from_millis(300), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(2_000), "elapsed {:?}", elapsed);
}

#[tokio::test]
async fn test_per_call_retry_override() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/cycles")
        .with_status(503)
        .expect(1)
        .create_async()
        .await;

    let h = harness(&server.url(), 3, 10);
    let descriptor = RequestDescriptor::get("/cycles").with_retry_attempts(0);
    let err = h.client.execute(&descriptor).await.unwrap_err();

    mock.assert_async().await;
    assert_eq!(err.status(), 503);
}

#[tokio::test]
async fn test_parse_error_on_success_status() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/food-logs")
        .with_status(200)
        .with_body("<html>maintenance</html>")
        .expect(1)
        .create_async()
        .await;

    let h = harness(&server.url(), 3, 10);
    let err = h.client.get("/food-logs").await.unwrap_err();

    mock.assert_async().await;
    assert_eq!(err.code(), "PARSE_ERROR");
    assert_eq!(err.status(), 200);
}

#[tokio::test]
async fn test_created_with_unreadable_body_is_not_resent() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/food-logs")
        .match_body(Matcher::Json(json!({"calories": 300})))
        .with_status(201)
        .with_body("Created")
        .expect(1)
        .create_async()
        .await;

    let h = harness(&server.url(), 3, 1);
    let err = h
        .client
        .post("/food-logs", json!({"calories": 300}))
        .await
        .unwrap_err();

    mock.assert_async().await;
    assert!(matches!(err, ApiError::Parse { status: 201, .. }), "got {:?}", err);
}

#[tokio::test]
async fn test_non_json_error_body() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/food-logs")
        .with_status(404)
        .with_body("<html>not here</html>")
        .create_async()
        .await;

    let h = harness(&server.url(), 3, 10);
    let err = h.client.get("/food-logs").await.unwrap_err();

    assert_eq!(err.status(), 404);
    assert_eq!(err.message(), "Invalid JSON response");
}

// ==================================================================================================
// Network Failures
// ==================================================================================================

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    let h = harness(&refused_url(), 2, 10);
    let err = h.client.get("/users/5").await.unwrap_err();

    assert!(matches!(err, ApiError::Network { .. }), "got {:?}", err);
    assert_eq!(err.status(), 0);
    assert_eq!(err.code(), "NETWORK_ERROR");
}

#[tokio::test]
async fn test_network_failure_attempt_count() {
    let (url, accepted) = hang_up_server().await;
    let h = harness(&url, 2, 10);

    let err = h.client.get("/users/5").await.unwrap_err();

    assert_eq!(err.status(), 0, "got {:?}", err);
    assert_eq!(accepted.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_timeout_is_retried() {
    let (url, accepted) = silent_server().await;
    let h = harness(&url, 1, 10);

    let descriptor = RequestDescriptor::get("/users/5").with_timeout(Duration::from_millis(100));
    let started = Instant::now();
    let err = h.client.execute(&descriptor).await.unwrap_err();

    assert!(matches!(err, ApiError::Timeout { .. }), "got {:?}", err);
    assert_eq!(err.status(), 408);
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
    assert!(started.elapsed() >= Duration::from_millis(200));
}

// ==================================================================================================
// Token Re-read Per Attempt
// ==================================================================================================

#[tokio::test]
async fn test_token_reread_between_attempts() {
    let mut server = mockito::Server::new_async().await;
    let h = harness(&server.url(), 2, 10);
    h.secure.set(AUTH_TOKEN_KEY, "old-token").unwrap();

    // The failing attempt rotates the stored token, as a refresh elsewhere would
    let store = h.secure.clone();
    let stale = server
        .mock("GET", "/users/5")
        .match_header("authorization", "Bearer old-token")
        .with_status(503)
        .with_body_from_request(move |_| {
            store.set(AUTH_TOKEN_KEY, "new-token").unwrap();
            b"{}".to_vec()
        })
        .expect(1)
        .create_async()
        .await;
    let fresh = server
        .mock("GET", "/users/5")
        .match_header("authorization", "Bearer new-token")
        .with_status(200)
        .with_body(r#"{"id":5,"username":"ada"}"#)
        .expect(1)
        .create_async()
        .await;

    let response = h.client.get("/users/5").await.unwrap();

    stale.assert_async().await;
    fresh.assert_async().await;
    let data: Value = response.data;
    assert_eq!(data["username"], "ada");
}
