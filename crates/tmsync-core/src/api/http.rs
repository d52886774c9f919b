//! HTTP transport: authentication, retry and response normalization.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Method, RequestBuilder};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use super::{ApiError, ApiResponse, Transport};
use crate::config::{ServerConfig, API_PATH, RETRY_STATUS_CODES, USER_AGENT};

/// Prefix some legacy servers put in front of the JSON body.
const LEGACY_AUTH_PREFIX: &str = "USER AUTHENTICATION SUCCESSFUL!\n";

/// Upper bound for a server-requested wait between retries.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Transport over HTTPS with basic authentication.
pub struct HttpTransport {
    client: Client,
    base_url: String,
    username: String,
    secret: String,
    retries: u32,
    backoff: Duration,
}

impl HttpTransport {
    /// Creates a transport for `host`, e.g. `https://example.testrail.io`.
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: api_root(&host.into()),
            username: username.into(),
            secret: secret.into(),
            retries: crate::config::DEFAULT_RETRIES,
            backoff: Duration::from_millis(500),
        }
    }

    /// Creates a transport from server settings, applying timeout, TLS and proxy options.
    pub fn from_config(config: &ServerConfig) -> Result<Self, ApiError> {
        let host = config
            .host
            .clone()
            .ok_or_else(|| ApiError::Client("host is not configured".to_string()))?;

        let mut builder = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.insecure);

        if let Some(proxy_url) = &config.proxy {
            let mut proxy = reqwest::Proxy::all(proxy_url.as_str())?;
            if let Some((user, password)) = config.proxy_user.as_deref().and_then(|u| u.split_once(':')) {
                proxy = proxy.basic_auth(user, password);
            }
            proxy = proxy.no_proxy(config.noproxy.as_deref().and_then(reqwest::NoProxy::from_string));
            builder = builder.proxy(proxy);
        }

        let mut transport = Self::new(
            host,
            config.username.clone().unwrap_or_default(),
            config.secret().unwrap_or_default(),
        );
        transport.client = builder.build()?;
        transport.retries = config.retries;
        Ok(transport)
    }

    /// Sets the number of retries.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the base delay between retries of failed responses without `Retry-After`.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(&self, method: Method, uri: &str, body: Option<&Value>, file: Option<&Path>) -> ApiResponse {
        let url = format!("{}{}", self.base_url, uri);
        let mut attempt = 0;

        loop {
            let request = match self.build(method.clone(), &url, body, file).await {
                Ok(request) => request,
                Err(response) => return response,
            };

            debug!(method = %method, uri, attempt, "sending request");

            let (response, wait) = match request.send().await {
                Ok(res) => {
                    let status = res.status().as_u16();
                    let wait = retry_delay(status, res.headers(), self.backoff, attempt);
                    let text = res.text().await.unwrap_or_default();
                    (normalize(status, &text), wait)
                }
                Err(e) if e.is_timeout() => (
                    ApiResponse::failed(0, "Your upload to the server timed out. Please try again later."),
                    Some(self.backoff),
                ),
                Err(e) if e.is_connect() => (
                    ApiResponse::failed(0, format!("Connection error. Please check the host address. ({e})")),
                    Some(self.backoff),
                ),
                Err(e) => return ApiResponse::failed(0, format!("Request failed: {e}")),
            };

            match wait {
                Some(delay) if attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        status = response.status_code,
                        retry = attempt,
                        max_retries = self.retries,
                        backoff_ms = delay.as_millis() as u64,
                        "retrying request"
                    );
                    tokio::time::sleep(delay).await;
                }
                _ => return response,
            }
        }
    }

    async fn build(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        file: Option<&Path>,
    ) -> Result<RequestBuilder, ApiResponse> {
        let mut request = self
            .client
            .request(method, url)
            .basic_auth(&self.username, Some(&self.secret));

        if let Some(body) = body {
            request = request.json(body);
        }

        if let Some(path) = file {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| ApiResponse::failed(0, format!("Failed to read {}: {e}", path.display())))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "attachment".to_string());
            let part = reqwest::multipart::Part::bytes(bytes).file_name(name);
            request = request.multipart(reqwest::multipart::Form::new().part("attachment", part));
        }

        Ok(request)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, uri: &str) -> ApiResponse {
        self.send(Method::GET, uri, None, None).await
    }

    async fn post(&self, uri: &str, body: &Value) -> ApiResponse {
        self.send(Method::POST, uri, Some(body), None).await
    }

    async fn post_file(&self, uri: &str, path: &Path) -> ApiResponse {
        self.send(Method::POST, uri, None, Some(path)).await
    }
}

fn api_root(host: &str) -> String {
    format!("{}/{}", host.trim_end_matches('/'), API_PATH)
}

/// Delay before retrying a response with `status`, or `None` if it is final.
fn retry_delay(status: u16, headers: &HeaderMap, backoff: Duration, attempt: u32) -> Option<Duration> {
    if !RETRY_STATUS_CODES.contains(&status) {
        return None;
    }
    let requested = headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| Duration::from_secs_f64(secs).min(MAX_RETRY_AFTER));

    Some(requested.unwrap_or_else(|| backoff * 2u32.saturating_pow(attempt)))
}

/// Turn a raw response into an [`ApiResponse`].
///
/// A JSON object with an `error` field carries that error. A body that is not
/// JSON becomes the error itself.
fn normalize(status: u16, text: &str) -> ApiResponse {
    let text = text.strip_prefix(LEGACY_AUTH_PREFIX).unwrap_or(text);
    let success = (200..300).contains(&status);

    if text.trim().is_empty() {
        return if success {
            ApiResponse::ok(status, Value::Null)
        } else {
            ApiResponse::failed(status, format!("Request failed with status {status}"))
        };
    }

    match serde_json::from_str::<Value>(text) {
        Ok(body) => {
            let error = body
                .get("error")
                .and_then(Value::as_str)
                .filter(|e| !e.is_empty())
                .map(str::to_string);
            ApiResponse { status_code: status, body, error }
        }
        Err(_) => ApiResponse {
            status_code: status,
            body: Value::String(text.to_string()),
            error: Some(text.to_string()),
        },
    }
}
