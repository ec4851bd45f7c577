//! Outbound HTTP with retry, backoff, and rate-limit handling
//!
//! All upstream API traffic goes through here. Failures are captured
//! with enough request context to feed the synthesizer repair loop.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::HttpMethod;
use crate::error::{IntegrationError, IntegrationResult};

/// Retry-After ceiling; a 429 demanding a longer wait fails the call.
const RETRY_AFTER_CAP: Duration = Duration::from_secs(60);

/// Statuses considered successful; other 2xx codes are handed back to
/// the caller as failures so the synthesizer can react.
const OK_STATUSES: [u16; 3] = [200, 201, 204];

/// A fully-interpolated request, ready to send
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub query_params: HashMap<String, String>,
    pub body: Option<Value>,
    pub timeout: Duration,
}

impl HttpRequest {
    /// One-line request description attached to failures
    pub fn summary(&self) -> String {
        let headers: Vec<String> = self
            .headers
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect();
        let query: Vec<String> = self
            .query_params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        format!(
            "{} {} headers=[{}] query=[{}] body={}",
            self.method,
            self.url,
            headers.join(", "),
            query.join("&"),
            self.body
                .as_ref()
                .map(|b| b.to_string())
                .unwrap_or_else(|| "none".to_string()),
        )
    }
}

/// Retry policy for a single call
#[derive(Debug, Clone, Copy)]
pub struct CallOptions {
    pub retries: u32,
    pub retry_delay: Duration,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            retries: 5,
            retry_delay: Duration::from_millis(1_000),
        }
    }
}

/// HTTP caller wrapping a shared reqwest client
#[derive(Clone)]
pub struct HttpCaller {
    client: reqwest::Client,
}

impl HttpCaller {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Execute `request`, retrying network errors and 5xx responses
    /// with exponential backoff. Returns the decoded JSON body (or the
    /// raw text as a JSON string when the body is not JSON).
    pub async fn call(&self, request: &HttpRequest, options: CallOptions) -> IntegrationResult<Value> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.call_once(request).await {
                Ok(value) => return Ok(value),
                Err(CallFailure::Retryable(err)) if attempt <= options.retries => {
                    let backoff = options.retry_delay * 2u32.saturating_pow(attempt - 1);
                    warn!(
                        url = %request.url,
                        attempt,
                        error = %err,
                        backoff_ms = backoff.as_millis() as u64,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(CallFailure::RateLimited(wait)) if attempt <= options.retries => {
                    debug!(url = %request.url, wait_s = wait.as_secs(), "rate limited, honoring Retry-After");
                    tokio::time::sleep(wait).await;
                }
                Err(CallFailure::Retryable(err)) | Err(CallFailure::Fatal(err)) => return Err(err),
                Err(CallFailure::RateLimited(_)) => {
                    return Err(IntegrationError::Http {
                        status: 429,
                        url: request.url.clone(),
                        body: "rate limit retries exhausted".to_string(),
                        request_summary: request.summary(),
                    })
                }
            }
        }
    }

    /// Download raw bytes (file extraction path), with the same retry
    /// policy but no body decoding.
    pub async fn fetch_bytes(
        &self,
        request: &HttpRequest,
        options: CallOptions,
    ) -> IntegrationResult<Vec<u8>> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let response = self.send(request).await;
            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let bytes = resp.bytes().await.map_err(|e| IntegrationError::Http {
                            status: status.as_u16(),
                            url: request.url.clone(),
                            body: format!("failed to read body: {}", e),
                            request_summary: request.summary(),
                        })?;
                        return Ok(bytes.to_vec());
                    }
                    let err = IntegrationError::Http {
                        status: status.as_u16(),
                        url: request.url.clone(),
                        body: resp.text().await.unwrap_or_default(),
                        request_summary: request.summary(),
                    };
                    if status.is_server_error() && attempt <= options.retries {
                        tokio::time::sleep(options.retry_delay * 2u32.saturating_pow(attempt - 1))
                            .await;
                        continue;
                    }
                    return Err(err);
                }
                Err(err) if attempt <= options.retries => {
                    warn!(url = %request.url, attempt, error = %err, "download failed, retrying");
                    tokio::time::sleep(options.retry_delay * 2u32.saturating_pow(attempt - 1))
                        .await;
                }
                Err(err) => {
                    return Err(IntegrationError::Http {
                        status: 0,
                        url: request.url.clone(),
                        body: err.to_string(),
                        request_summary: request.summary(),
                    })
                }
            }
        }
    }

    async fn send(&self, request: &HttpRequest) -> reqwest::Result<reqwest::Response> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Options => reqwest::Method::OPTIONS,
        };

        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(request.timeout);

        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if !request.query_params.is_empty() {
            builder = builder.query(&request.query_params);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        builder.send().await
    }

    async fn call_once(&self, request: &HttpRequest) -> Result<Value, CallFailure> {
        let response = match self.send(request).await {
            Ok(resp) => resp,
            Err(err) => {
                return Err(CallFailure::Retryable(IntegrationError::Http {
                    status: 0,
                    url: request.url.clone(),
                    body: err.to_string(),
                    request_summary: request.summary(),
                }))
            }
        };

        let status = response.status();
        let headers = response.headers().clone();

        if status.as_u16() == 429 {
            let wait = retry_after(headers.get(reqwest::header::RETRY_AFTER));
            return match wait {
                Some(wait) if wait <= RETRY_AFTER_CAP => Err(CallFailure::RateLimited(wait)),
                _ => Err(CallFailure::Fatal(IntegrationError::Http {
                    status: 429,
                    url: request.url.clone(),
                    body: format!(
                        "Retry-After exceeds the {}s cap",
                        RETRY_AFTER_CAP.as_secs()
                    ),
                    request_summary: request.summary(),
                })),
            };
        }

        let body = response.text().await.unwrap_or_default();

        if status.is_server_error() {
            return Err(CallFailure::Retryable(IntegrationError::Http {
                status: status.as_u16(),
                url: request.url.clone(),
                body,
                request_summary: request.summary(),
            }));
        }

        let trimmed = body.trim_start().to_ascii_lowercase();
        if trimmed.starts_with("<!doctype html") || trimmed.starts_with("<html") {
            return Err(CallFailure::Fatal(IntegrationError::HtmlResponse {
                url: request.url.clone(),
            }));
        }

        if !OK_STATUSES.contains(&status.as_u16()) {
            return Err(CallFailure::Fatal(IntegrationError::Http {
                status: status.as_u16(),
                url: request.url.clone(),
                body,
                request_summary: request.summary(),
            }));
        }

        if body.is_empty() {
            return Ok(Value::Null);
        }

        let value: Value = match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(_) => Value::String(body),
        };

        // A 2xx body carrying an error field is still a failure; the
        // caller decides whether to loop the synthesizer.
        if value.get("error").map(|e| !e.is_null()).unwrap_or(false) {
            return Err(CallFailure::Fatal(IntegrationError::Http {
                status: status.as_u16(),
                url: request.url.clone(),
                body: value.to_string(),
                request_summary: request.summary(),
            }));
        }

        Ok(value)
    }
}

impl Default for HttpCaller {
    fn default() -> Self {
        Self::new()
    }
}

enum CallFailure {
    /// Worth another attempt (network error, 5xx)
    Retryable(IntegrationError),
    /// 429 with an acceptable Retry-After
    RateLimited(Duration),
    /// Surfaced to the caller immediately
    Fatal(IntegrationError),
}

/// Parse a Retry-After header: delta-seconds or an HTTP-date.
fn retry_after(header: Option<&reqwest::header::HeaderValue>) -> Option<Duration> {
    let text = header?.to_str().ok()?;
    if let Ok(seconds) = text.trim().parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let date = chrono::DateTime::parse_from_rfc2822(text.trim()).ok()?;
    let delta = date.signed_duration_since(chrono::Utc::now());
    Some(Duration::from_secs(delta.num_seconds().max(0) as u64))
}
