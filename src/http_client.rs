use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::TokenManager;
use crate::config::Config;
use crate::error::ApiError;
use crate::models::request::{ApiResponse, Method, RequestDescriptor};

/// Authenticated HTTP client for the fitlog backend with retry logic
pub struct ApiClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// Source of the bearer token, read on every attempt
    tokens: Arc<TokenManager>,

    /// Base URL every descriptor path is appended to
    base_url: String,

    /// Per-attempt deadline when the descriptor does not set one
    default_timeout: Duration,

    /// Retries after the first attempt when the descriptor does not set them
    retry_attempts: u32,

    /// Step for linear backoff (milliseconds)
    retry_delay_base_ms: u64,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(config: &Config, tokens: Arc<TokenManager>) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            tokens,
            base_url: config.api_url.clone(),
            default_timeout: config.request_timeout(),
            retry_attempts: config.retry_attempts,
            retry_delay_base_ms: config.retry_delay_ms,
        })
    }

    /// Token manager backing this client
    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Execute a request with timeout and retry logic.
    ///
    /// The bearer token is read from storage before every attempt, so a token
    /// refreshed elsewhere while this call is backing off is picked up by the
    /// next attempt. Client errors (HTTP 4xx) are returned after a single
    /// attempt; every other failure is retried until `retry_attempts` is spent
    /// and the last error is returned.
    pub async fn execute(&self, descriptor: &RequestDescriptor) -> Result<ApiResponse, ApiError> {
        let max_retries = descriptor.retry_attempts.unwrap_or(self.retry_attempts);
        let timeout = descriptor.timeout.unwrap_or(self.default_timeout);
        let url = format!("{}{}", self.base_url, descriptor.url);

        // Header overrides and body are the same for every attempt
        let overrides = encode_header_overrides(descriptor)?;
        let body = match descriptor.data {
            Some(ref data) => Some(serde_json::to_vec(data).map_err(|e| ApiError::Unknown {
                message: format!("Failed to serialize request body: {}", e),
            })?),
            None => None,
        };

        tracing::debug!(
            method = %descriptor.method,
            url = %url,
            "Sending HTTP request"
        );

        let mut attempt: u32 = 0;
        loop {
            tracing::debug!(
                attempt = attempt + 1,
                max_retries = max_retries,
                "Executing request attempt"
            );

            let headers = build_headers(self.tokens.access_token().as_deref(), &overrides);
            let send = self.send_once(descriptor.method, &url, headers, body.clone());

            let result = match tokio::time::timeout(timeout, send).await {
                Ok(result) => result,
                Err(_) => Err(ApiError::Timeout {
                    message: format!("Request timed out after {}ms", timeout.as_millis()),
                }),
            };

            let error = match result {
                Ok(response) => {
                    tracing::debug!(status = response.status, "Request successful");
                    return Ok(response);
                }
                Err(error) => error,
            };

            if !error.is_retryable() {
                tracing::warn!(
                    status = error.status(),
                    url = %url,
                    error = %error,
                    "Request failed with non-retryable error"
                );
                return Err(error);
            }

            if attempt >= max_retries {
                tracing::error!(
                    code = %error.code(),
                    status = error.status(),
                    url = %url,
                    total_attempts = attempt + 1,
                    error = %error,
                    "HTTP request failed after all retries"
                );
                return Err(error);
            }

            let delay = self.calculate_backoff_delay(attempt);
            tracing::warn!(
                attempt = attempt + 1,
                max_retries = max_retries,
                delay_ms = delay,
                status = error.status(),
                error = %error,
                "Request failed, retrying"
            );
            tokio::time::sleep(Duration::from_millis(delay)).await;
            attempt += 1;
        }
    }

    /// One network attempt: send, read the body, classify.
    async fn send_once(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: Option<Vec<u8>>,
    ) -> Result<ApiResponse, ApiError> {
        let mut request = self.client.request(method.into(), url).headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!(error = %e, url = %url, "HTTP request error");
            ApiError::from(e)
        })?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        tracing::debug!(status = status, "Received HTTP response");

        classify_response(status, &text)
    }

    /// Linear backoff: base * (attempt + 1)
    fn calculate_backoff_delay(&self, attempt: u32) -> u64 {
        linear_backoff_ms(self.retry_delay_base_ms, attempt)
    }

    pub async fn get(&self, url: impl Into<String>) -> Result<ApiResponse, ApiError> {
        self.execute(&RequestDescriptor::get(url)).await
    }

    pub async fn post(&self, url: impl Into<String>, data: Value) -> Result<ApiResponse, ApiError> {
        self.execute(&RequestDescriptor::post(url).with_data(data)).await
    }

    pub async fn put(&self, url: impl Into<String>, data: Value) -> Result<ApiResponse, ApiError> {
        self.execute(&RequestDescriptor::put(url).with_data(data)).await
    }

    pub async fn patch(&self, url: impl Into<String>, data: Value) -> Result<ApiResponse, ApiError> {
        self.execute(&RequestDescriptor::patch(url).with_data(data)).await
    }

    pub async fn delete(&self, url: impl Into<String>) -> Result<ApiResponse, ApiError> {
        self.execute(&RequestDescriptor::delete(url)).await
    }
}

/// Delay before retry number `attempt + 1`
pub fn linear_backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    base_ms.saturating_mul(u64::from(attempt) + 1)
}

/// `Authorization` value for a stored token; a token already carrying the
/// scheme is used as-is.
pub fn bearer_value(token: &str) -> String {
    if token.starts_with("Bearer ") {
        token.to_string()
    } else {
        format!("Bearer {}", token)
    }
}

/// Validate descriptor header overrides. Encoding problems are deterministic,
/// so they fail before any attempt.
fn encode_header_overrides(
    descriptor: &RequestDescriptor,
) -> Result<Vec<(HeaderName, HeaderValue)>, ApiError> {
    descriptor
        .headers
        .iter()
        .map(|(name, value)| {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| ApiError::Unknown {
                message: format!("Invalid header name {:?}: {}", name, e),
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| ApiError::Unknown {
                message: format!("Invalid value for header {}: {}", name, e),
            })?;
            Ok((name, value))
        })
        .collect()
}

/// Default headers, then the bearer token, then descriptor overrides
fn build_headers(token: Option<&str>, overrides: &[(HeaderName, HeaderValue)]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    if let Some(token) = token {
        match HeaderValue::from_str(&bearer_value(token)) {
            Ok(value) => {
                headers.insert(AUTHORIZATION, value);
            }
            Err(_) => tracing::warn!("Stored token is not a valid header value, sending without it"),
        }
    }

    for (name, value) in overrides {
        headers.insert(name.clone(), value.clone());
    }
    headers
}

/// Parse a response body. Empty bodies are `{}`.
fn parse_body(text: &str) -> serde_json::Result<Value> {
    if text.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(text)
}

/// Turn status + raw body into an envelope or a classified error
fn classify_response(status: u16, text: &str) -> Result<ApiResponse, ApiError> {
    let parsed = parse_body(text);

    if (200..300).contains(&status) {
        return match parsed {
            Ok(data) => Ok(ApiResponse::new(status, data)),
            Err(e) => Err(ApiError::Parse {
                status,
                message: e.to_string(),
            }),
        };
    }

    let payload = parsed.unwrap_or_else(|_| {
        json!({
            "message": "Invalid JSON response",
            "status": status,
        })
    });

    let message = payload
        .get("message")
        .or_else(|| payload.get("error"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| {
            reqwest::StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP error {}", status))
        });
    let code = payload
        .get("code")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let details = payload.get("details").cloned();

    Err(ApiError::Http {
        status,
        message,
        code,
        details,
    })
}
