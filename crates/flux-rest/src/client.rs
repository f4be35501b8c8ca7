//! Rate-limited REST client

use crate::embed::Embed;
use crate::error::RestError;
use crate::route::Route;
use flux_common::{ApiConfig, ClientConfig, Credential};
use flux_ratelimit::{RateLimiter, RouteParams};
use reqwest::header::{AUTHORIZATION, RETRY_AFTER};
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// REST client
///
/// Every call is admitted by the shared [`RateLimiter`] before it reaches the
/// network. Cloning is cheap; clones share the connection pool and buckets.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    authorization: String,
    limiter: Arc<RateLimiter>,
}

impl RestClient {
    /// Create a client with its own limiter over the standard route table
    pub fn new(config: &ClientConfig) -> Result<Self, RestError> {
        let limiter = Arc::new(RateLimiter::with_defaults(config.rate_limit));
        Self::with_limiter(&config.credential, &config.api, limiter)
    }

    /// Create a client sharing an existing limiter
    pub fn with_limiter(
        credential: &Credential,
        api: &ApiConfig,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self, RestError> {
        let http = reqwest::Client::builder()
            .timeout(api.timeout())
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            authorization: credential.rest_header(),
            limiter,
        })
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Perform one call.
    ///
    /// Waits for local admission first, then sends `body` as JSON. Returns the
    /// decoded response body, `Value::Null` for empty responses.
    pub async fn perform_request(
        &self,
        route: &Route,
        params: &RouteParams,
        body: Option<&Value>,
    ) -> Result<Value, RestError> {
        self.limiter.acquire(route.rate_limit(), params).await;

        let url = format!("{}{}", self.base_url, route.path());
        tracing::trace!(method = %route.method(), path = route.path(), "Sending request");

        let mut request = self
            .http
            .request(route.method().clone(), &url)
            .header(AUTHORIZATION, &self.authorization);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let result = read_response(response).await;

        if let Err(e) = &result {
            match e {
                RestError::RateLimited {
                    retry_after,
                    global,
                    ..
                } => tracing::warn!(
                    route = route.rate_limit(),
                    retry_after_ms = retry_after.as_millis() as u64,
                    global = *global,
                    "Rate limited by server"
                ),
                e => tracing::debug!(
                    route = route.rate_limit(),
                    status = e.status_code(),
                    error = %e,
                    "Request failed"
                ),
            }
        }

        result
    }

    /// Perform one call and decode the body into `T`
    pub async fn request<T: DeserializeOwned>(
        &self,
        route: &Route,
        params: &RouteParams,
        body: Option<&Value>,
    ) -> Result<T, RestError> {
        let value = self.perform_request(route, params, body).await?;
        Ok(serde_json::from_value(value)?)
    }

    // ========================================================================
    // Convenience calls
    // ========================================================================

    pub async fn current_user(&self) -> Result<Value, RestError> {
        let (route, params) = Route::current_user();
        self.perform_request(&route, &params, None).await
    }

    pub async fn send_message(&self, channel_id: &str, content: &str) -> Result<Value, RestError> {
        let (route, params) = Route::create_message(channel_id);
        let body = json!({ "content": content });
        self.perform_request(&route, &params, Some(&body)).await
    }

    pub async fn send_embed(&self, channel_id: &str, embed: &Embed) -> Result<Value, RestError> {
        let (route, params) = Route::create_message(channel_id);
        let body = json!({ "embeds": [embed] });
        self.perform_request(&route, &params, Some(&body)).await
    }

    pub async fn delete_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<(), RestError> {
        let (route, params) = Route::delete_message(channel_id, message_id);
        self.perform_request(&route, &params, None).await.map(drop)
    }

    pub async fn add_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), RestError> {
        let (route, params) = Route::own_reaction(Method::PUT, channel_id, message_id, emoji);
        self.perform_request(&route, &params, None).await.map(drop)
    }

    pub async fn trigger_typing(&self, channel_id: &str) -> Result<(), RestError> {
        let (route, params) = Route::trigger_typing(channel_id);
        self.perform_request(&route, &params, None).await.map(drop)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    /// Seconds, possibly fractional
    #[serde(default)]
    retry_after: Option<f64>,
    #[serde(default)]
    global: bool,
}

async fn read_response(response: Response) -> Result<Value, RestError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(rate_limited(response).await);
    }

    let bytes = response.bytes().await?;

    if status.is_success() {
        if status == StatusCode::NO_CONTENT || bytes.is_empty() {
            return Ok(Value::Null);
        }
        return Ok(serde_json::from_slice(&bytes)?);
    }

    let message = serde_json::from_slice::<ErrorBody>(&bytes)
        .ok()
        .and_then(|body| body.message)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string());

    Err(RestError::from_status(status.as_u16(), message))
}

/// Build the 429 error from the server's own figures, body first then headers
async fn rate_limited(response: Response) -> RestError {
    let headers = response.headers();
    let header_retry =
        header_str(headers, RETRY_AFTER.as_str()).and_then(|v| v.parse::<f64>().ok());
    let header_global = header_str(headers, "x-ratelimit-global")
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));
    let bucket = header_str(headers, "x-ratelimit-bucket").map(str::to_string);

    let body = response
        .bytes()
        .await
        .ok()
        .and_then(|bytes| serde_json::from_slice::<RateLimitBody>(&bytes).ok());

    let retry_after = body
        .as_ref()
        .and_then(|b| b.retry_after)
        .or(header_retry)
        .unwrap_or(0.0);

    RestError::RateLimited {
        retry_after: seconds(retry_after),
        global: header_global || body.is_some_and(|b| b.global),
        bucket,
    }
}

fn header_str<'a>(headers: &'a reqwest::header::HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

/// Server-supplied seconds; negative or NaN is zero, anything too large saturates
fn seconds(value: f64) -> Duration {
    if value.is_nan() || value <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
}
