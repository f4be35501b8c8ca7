//! REST client integration tests
//!
//! Local admission control and server-side 429s against an in-process API.
//!
//! Run with: cargo test -p flux-integration-tests --test rest_tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use flux_common::{Credential, GatewayConfig, RateLimitConfig};
use flux_integration_tests::{client_config, TestServer};
use flux_ratelimit::{RateLimitRegistry, RateLimitRule, RateLimiter, RouteParams};
use flux_rest::{Embed, Method, RestClient, RestError, Route};
use serde_json::{json, Value};

const TEST_ROUTE: &str = "test::channel_id::send";

/// Limiter with a single tight rule and no global bucket
fn tight_limiter(limit: u32, window: Duration) -> Arc<RateLimiter> {
    let rule = RateLimitRule::new(TEST_ROUTE, limit, window);
    let registry = RateLimitRegistry::new().with_rule(TEST_ROUTE, rule);
    let config = RateLimitConfig {
        global_limit: 0,
        ..RateLimitConfig::default()
    };
    Arc::new(RateLimiter::new(registry, config))
}

fn rest_client(server: &TestServer, limiter: Arc<RateLimiter>) -> RestClient {
    let credential = Credential::parse("Bot secret-token").unwrap();
    RestClient::with_limiter(&credential, &server.api_config(), limiter).unwrap()
}

fn test_route(channel_id: &str) -> (Route, RouteParams) {
    (
        Route::new(Method::POST, format!("/channels/{channel_id}/messages"), TEST_ROUTE),
        RouteParams::new().channel(channel_id),
    )
}

async fn record_arrival(State(arrivals): State<Arc<Mutex<Vec<Instant>>>>) -> Json<Value> {
    arrivals.lock().unwrap().push(Instant::now());
    Json(json!({ "id": "m" }))
}

// ============================================================================
// Local admission control
// ============================================================================

#[tokio::test]
async fn test_burst_is_spread_over_the_window() {
    let arrivals = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/channels/1/messages", post(record_arrival))
        .with_state(arrivals.clone());
    let server = TestServer::start(app).await.unwrap();
    let client = rest_client(&server, tight_limiter(3, Duration::from_millis(300)));

    let mut tasks = Vec::new();
    for _ in 0..6 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let (route, params) = test_route("1");
            client.perform_request(&route, &params, None).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let mut arrivals = arrivals.lock().unwrap().clone();
    arrivals.sort();
    assert_eq!(arrivals.len(), 6);

    // Only three fit into the first window
    let spread = arrivals[3].duration_since(arrivals[0]);
    assert!(spread >= Duration::from_millis(250), "spread was {spread:?}");
}

#[tokio::test]
async fn test_buckets_are_per_channel() {
    let arrivals = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/channels/1/messages", post(record_arrival))
        .route("/channels/2/messages", post(record_arrival))
        .with_state(arrivals.clone());
    let server = TestServer::start(app).await.unwrap();
    let limiter = tight_limiter(1, Duration::from_secs(60));
    let client = rest_client(&server, limiter.clone());

    let started = Instant::now();
    for channel in ["1", "2"] {
        let (route, params) = test_route(channel);
        client.perform_request(&route, &params, None).await.unwrap();
    }
    assert!(started.elapsed() < Duration::from_secs(5));

    assert_eq!(limiter.bucket_count(), 2);
    assert_eq!(limiter.remaining(TEST_ROUTE, &RouteParams::new().channel("1")), Some(0));
    assert_eq!(limiter.remaining(TEST_ROUTE, &RouteParams::new().channel("3")), Some(1));
}

// ============================================================================
// Server-side rate limits
// ============================================================================

#[tokio::test]
async fn test_server_429_surfaces_declared_retry_after() {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route(
            "/channels/1/messages",
            post(|State(calls): State<Arc<AtomicUsize>>| async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    let body = json!({
                        "message": "You are being rate limited.",
                        "retry_after": 0.75,
                        "global": false
                    });
                    return (
                        StatusCode::TOO_MANY_REQUESTS,
                        [("x-ratelimit-bucket", "abc")],
                        Json(body),
                    )
                        .into_response();
                }
                Json(json!({ "id": "m1" })).into_response()
            }),
        )
        .with_state(calls.clone());
    let server = TestServer::start(app).await.unwrap();
    let limiter = Arc::new(RateLimiter::with_defaults(RateLimitConfig::default()));
    let client = rest_client(&server, limiter.clone());

    let err = client.send_message("1", "hi").await.unwrap_err();
    match &err {
        RestError::RateLimited {
            retry_after,
            global,
            bucket,
        } => {
            assert_eq!(*retry_after, Duration::from_millis(750));
            assert!(!global);
            assert_eq!(bucket.as_deref(), Some("abc"));
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }

    // The local bucket only counted the attempt; it knows nothing of the 429
    let params = RouteParams::new().channel("1");
    let remaining = limiter.remaining("channels::channel_id::messages::send", &params);
    assert_eq!(remaining, Some(4));

    tokio::time::sleep(err.retry_after().unwrap()).await;
    let message = client.send_message("1", "hi").await.unwrap();
    assert_eq!(message["id"], "m1");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Configuration and payloads
// ============================================================================

#[tokio::test]
async fn test_client_from_config_sends_embed() {
    async fn echo(headers: axum::http::HeaderMap, Json(body): Json<Value>) -> Response {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        Json(json!({ "auth": auth, "body": body })).into_response()
    }

    let app = Router::new().route("/channels/9/messages", post(echo));
    let server = TestServer::start(app).await.unwrap();
    let config = client_config("flx_user-token", server.api_config(), GatewayConfig::default())
        .unwrap();
    let client = RestClient::new(&config).unwrap();

    let embed = Embed::builder()
        .title("Deploy")
        .field("status", "ok", true)
        .build()
        .unwrap();
    let response = client.send_embed("9", &embed).await.unwrap();

    assert_eq!(response["auth"], "flx_user-token");
    assert_eq!(response["body"]["embeds"][0]["title"], "Deploy");
    assert_eq!(response["body"]["embeds"][0]["fields"][0]["inline"], true);
}
