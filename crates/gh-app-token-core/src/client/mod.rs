//! GitHub REST client used to exchange assertions and call the API.
//!
//! `GitHubClient` owns the HTTP connection pool, the retry policy and the
//! rate-limit tracker. Every call goes through [`GitHubClient::request`], which
//! sets GitHub's required headers, classifies failures into [`ApiError`], and
//! retries transient ones with exponential backoff until the attempt budget or
//! the caller's deadline runs out.

mod app;
mod installation;
mod rate_limit;
mod repository;
mod retry;

use std::time::Duration;

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::Method;
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::auth::{InstallationToken, JsonWebToken};
use crate::error::ApiError;
use crate::redact::{redact_secrets, summarize_body};

pub use app::App;
pub use installation::{AccessTokenRequest, Account, Installation};
pub use rate_limit::{
    is_rate_limited, parse_rate_limit_from_headers, parse_retry_after, requested_wait, RateLimit,
    RateLimiter,
};
pub use repository::{
    CheckRun, CheckRunConclusion, CheckRunOutput, CheckRunStatus, CommitRef, ContentEntry,
    ContentKind, CreateCheckRunRequest, CreateDeploymentRequest, CreateDeploymentStatusRequest,
    Deployment, DeploymentState, DeploymentStatus, FileCommit, PutFileRequest, RepositoryContent,
    UpdateCheckRunRequest,
};
pub use retry::RetryPolicy;

/// Default GitHub REST API base URL.
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

/// REST API version pinned on every request.
pub const GITHUB_API_VERSION: &str = "2022-11-28";

const GITHUB_MEDIA_TYPE: &str = "application/vnd.github+json";
const API_VERSION_HEADER: &str = "x-github-api-version";
/// Rate-limit resource the REST endpoints used here count against.
const CORE_RESOURCE: &str = "core";

/// Configuration for GitHub API client behavior.
///
/// # Examples
///
/// ```
/// use gh_app_token_core::client::{ClientConfig, RetryPolicy};
/// use std::time::Duration;
///
/// let config = ClientConfig::default()
///     .with_timeout(Duration::from_secs(60))
///     .with_retry_policy(RetryPolicy::no_retry());
/// assert_eq!(config.retry_policy.max_attempts, 1);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// User agent string for API requests (required by GitHub)
    pub user_agent: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Backoff policy for transient failures
    pub retry_policy: RetryPolicy,
    /// Rate limit safety margin (0.0 to 1.0) used by the rate limiter
    pub rate_limit_margin: f64,
    /// GitHub API base URL
    pub github_api_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("gh-app-token/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_secs(30),
            retry_policy: RetryPolicy::default(),
            rate_limit_margin: 0.1,
            github_api_url: DEFAULT_GITHUB_API_URL.to_string(),
        }
    }
}

impl ClientConfig {
    /// Set the user agent string.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Set the rate limit safety margin.
    #[must_use]
    pub fn with_rate_limit_margin(mut self, margin: f64) -> Self {
        self.rate_limit_margin = margin.clamp(0.0, 1.0);
        self
    }

    /// Set the GitHub API base URL (e.g. a GitHub Enterprise Server endpoint).
    #[must_use]
    pub fn with_github_api_url(mut self, url: impl Into<String>) -> Self {
        self.github_api_url = url.into();
        self
    }
}

/// Credential presented on a request.
#[derive(Clone, Copy)]
pub enum Authorization<'a> {
    /// `Authorization: Bearer <assertion>`, acting as the App.
    App(&'a JsonWebToken),
    /// `Authorization: token <installation token>`, acting as an installation.
    Installation(&'a InstallationToken),
}

impl Authorization<'_> {
    fn header_value(&self) -> Result<HeaderValue, ApiError> {
        let value = match self {
            Self::App(jwt) => format!("Bearer {}", jwt.token()),
            Self::Installation(token) => format!("token {}", token.token()),
        };
        let mut header = HeaderValue::from_str(&value).map_err(|_| ApiError::InvalidRequest {
            message: "credential contains characters not allowed in a header".to_string(),
        })?;
        header.set_sensitive(true);
        Ok(header)
    }
}

impl std::fmt::Debug for Authorization<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::App(_) => f.write_str("Authorization::App(<REDACTED>)"),
            Self::Installation(_) => f.write_str("Authorization::Installation(<REDACTED>)"),
        }
    }
}

/// A successful (2xx) API response with its body already read.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    endpoint: String,
    status: u16,
    headers: HeaderMap,
    body: String,
}

impl ApiResponse {
    /// `"<METHOD> <path>"` that produced this response.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// HTTP status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Raw response body.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Decode the body into `T`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidResponse` if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body).map_err(|e| ApiError::InvalidResponse {
            endpoint: self.endpoint.clone(),
            message: format!("Failed to decode response: {}", e),
        })
    }
}

/// GitHub API client.
///
/// Cheap to clone; clones share the connection pool and rate-limit state.
#[derive(Clone)]
pub struct GitHubClient {
    http_client: reqwest::Client,
    config: ClientConfig,
    rate_limiter: RateLimiter,
}

impl GitHubClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Configuration` if the HTTP client cannot be created.
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| ApiError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            http_client,
            rate_limiter: RateLimiter::new(config.rate_limit_margin),
            config,
        })
    }

    /// Get the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Rate limits observed so far.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Send a request, retrying transient failures.
    ///
    /// `path` may be given with or without a leading slash. When `deadline` is
    /// set, no attempt is started and no backoff sleep is entered that would
    /// run past it.
    ///
    /// # Errors
    ///
    /// - `Authentication`, `NotFound`, `UnexpectedStatus`: returned immediately
    /// - `ExchangeFailed`: every attempt failed transiently
    /// - `DeadlineExceeded`: the deadline expired first
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        auth: Authorization<'_>,
        body: Option<&serde_json::Value>,
        deadline: Option<Instant>,
    ) -> Result<ApiResponse, ApiError> {
        let normalized_path = path.strip_prefix('/').unwrap_or(path);
        let endpoint = format!("{} /{}", method, normalized_path);
        let url = format!(
            "{}/{}",
            self.config.github_api_url.trim_end_matches('/'),
            normalized_path
        );
        let policy = &self.config.retry_policy;

        let mut attempts: u32 = 0;
        let mut last_error: Option<ApiError> = None;

        loop {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(ApiError::DeadlineExceeded {
                    endpoint,
                    attempts,
                    last: last_error.map(Box::new),
                });
            }

            attempts += 1;
            if !self.rate_limiter.can_proceed(CORE_RESOURCE) {
                debug!(
                    endpoint = %endpoint,
                    remaining = self.rate_limiter.get_limit(CORE_RESOURCE).map(|l| l.remaining()),
                    "GitHub rate limit nearly exhausted"
                );
            }
            debug!(endpoint = %endpoint, attempt = attempts, "Sending GitHub API request");

            let send = self.send_once(method.clone(), &url, &endpoint, auth, body);
            let outcome = match deadline {
                Some(d) => match tokio::time::timeout_at(d, send).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        return Err(ApiError::DeadlineExceeded {
                            endpoint: endpoint.clone(),
                            attempts,
                            last: last_error.map(Box::new),
                        })
                    }
                },
                None => send.await,
            };

            let err = match outcome {
                Ok(response) => return Ok(response),
                Err(err) if err.is_transient() => err,
                Err(err) => return Err(err),
            };

            if !policy.should_retry(attempts) {
                warn!(
                    endpoint = %endpoint,
                    attempts,
                    status = ?err.status(),
                    "GitHub API request failed, retries exhausted"
                );
                return Err(ApiError::ExchangeFailed {
                    endpoint,
                    attempts,
                    last: Box::new(err),
                });
            }

            let delay = policy.delay_for(attempts, err.retry_after());
            if deadline.is_some_and(|d| Instant::now() + delay >= d) {
                return Err(ApiError::DeadlineExceeded {
                    endpoint,
                    attempts,
                    last: Some(Box::new(err)),
                });
            }

            warn!(
                endpoint = %endpoint,
                attempt = attempts,
                status = ?err.status(),
                delay_ms = delay.as_millis() as u64,
                "Transient GitHub API failure, retrying"
            );
            last_error = Some(err);
            tokio::time::sleep(delay).await;
        }
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        endpoint: &str,
        auth: Authorization<'_>,
        body: Option<&serde_json::Value>,
    ) -> Result<ApiResponse, ApiError> {
        let mut builder = self
            .http_client
            .request(method, url)
            .header(ACCEPT, GITHUB_MEDIA_TYPE)
            .header(API_VERSION_HEADER, GITHUB_API_VERSION)
            .header(AUTHORIZATION, auth.header_value()?);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| transport_error(endpoint, e))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        if let Some(limit) = self.rate_limiter.update_from_headers(&headers) {
            debug!(
                endpoint = %endpoint,
                resource = limit.resource(),
                remaining = limit.remaining(),
                limit = limit.limit(),
                reset_at = %limit.reset_at(),
                "GitHub rate limit"
            );
        }

        let body = response
            .text()
            .await
            .map_err(|e| transport_error(endpoint, e))?;

        if (200..300).contains(&status) {
            return Ok(ApiResponse {
                endpoint: endpoint.to_string(),
                status,
                headers,
                body,
            });
        }

        Err(classify_failure(status, &headers, &body, endpoint))
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("config", &self.config)
            .finish()
    }
}

fn transport_error(endpoint: &str, error: reqwest::Error) -> ApiError {
    let kind = if error.is_timeout() {
        "request timed out"
    } else if error.is_connect() {
        "connection failed"
    } else {
        "transport error"
    };
    ApiError::Transient {
        status: None,
        endpoint: endpoint.to_string(),
        message: format!("{}: {}", kind, redact_secrets(&error.without_url().to_string())),
        retry_after: None,
    }
}

/// Turn a non-2xx response into the matching [`ApiError`].
pub(crate) fn classify_failure(
    status: u16,
    headers: &HeaderMap,
    body: &str,
    endpoint: &str,
) -> ApiError {
    let message = error_message(body);
    let endpoint = endpoint.to_string();

    if is_rate_limited(status, headers) {
        return ApiError::Transient {
            status: Some(status),
            endpoint,
            message,
            retry_after: requested_wait(headers, Utc::now()),
        };
    }

    match status {
        401 | 403 => ApiError::Authentication {
            status,
            endpoint,
            message,
        },
        404 => ApiError::NotFound { endpoint },
        500..=599 => ApiError::Transient {
            status: Some(status),
            endpoint,
            message,
            retry_after: parse_retry_after(headers, Utc::now()),
        },
        _ => ApiError::UnexpectedStatus {
            status,
            endpoint,
            message,
        },
    }
}

/// GitHub's `message` field when the body is a JSON error, else the body itself.
fn error_message(body: &str) -> String {
    #[derive(serde::Deserialize)]
    struct GitHubErrorBody {
        message: String,
    }

    match serde_json::from_str::<GitHubErrorBody>(body) {
        Ok(parsed) => summarize_body(&parsed.message),
        Err(_) if body.trim().is_empty() => "(empty body)".to_string(),
        Err(_) => summarize_body(body),
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
