//! Error types for GitHub App token operations.
//!
//! Errors are layered the same way the engine is: signing failures, GitHub API
//! failures (with retry classification), cache failures, input validation, and
//! the engine-level [`AuthError`] that callers ultimately see.
//!
//! No variant ever carries a token, an assertion or private key material. Any
//! response body text stored in an error has already been passed through
//! [`crate::redact::summarize_body`].

use std::time::Duration;

use thiserror::Error;

use crate::auth::InstallationId;

/// Engine-level errors returned by [`crate::AuthEngine`].
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// The private key could not be read or parsed as an RSA key (non-retryable).
    #[error("Invalid private key: {message}")]
    InvalidKey { message: String },

    /// Cryptographic failure while signing the App assertion (non-retryable).
    #[error("Assertion signing failed: {message}")]
    Signing { message: String },

    /// GitHub rejected the credentials or the App lacks permissions (non-retryable).
    #[error("GitHub rejected the request to {endpoint} with status {status}: {message}")]
    Authentication {
        status: u16,
        endpoint: String,
        message: String,
    },

    /// The App is not installed on the requested repository (non-retryable).
    #[error("GitHub App is not installed on {owner}/{repo}")]
    InstallationNotFound { owner: String, repo: String },

    /// GitHub does not know the requested installation id (non-retryable).
    #[error("Installation {installation_id} not found or not accessible by this App")]
    UnknownInstallation { installation_id: InstallationId },

    /// No installation id was supplied and none is configured.
    #[error("No installation id supplied and none configured")]
    MissingInstallationId,

    /// Any other GitHub API failure.
    #[error("GitHub API error: {0}")]
    Api(ApiError),

    /// Token cache failure that could not be recovered from.
    #[error("Token cache error: {0}")]
    Cache(#[from] CacheError),

    /// Invalid input or configuration.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl AuthError {
    /// Check if this error represents a transient condition that may succeed if retried.
    ///
    /// Exhausted retries (`ExchangeFailed`) and deadline expiry are reported as
    /// not transient: the bounded retry budget has already been spent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Api(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl From<ApiError> for AuthError {
    fn from(error: ApiError) -> Self {
        match error {
            ApiError::Authentication {
                status,
                endpoint,
                message,
            } => Self::Authentication {
                status,
                endpoint,
                message,
            },
            other => Self::Api(other),
        }
    }
}

impl From<SigningError> for AuthError {
    fn from(error: SigningError) -> Self {
        match error {
            SigningError::InvalidKey { message } => Self::InvalidKey { message },
            SigningError::SigningFailed { message } => Self::Signing { message },
        }
    }
}

/// Errors during App assertion signing.
#[derive(Debug, Clone, Error)]
pub enum SigningError {
    /// The private key is invalid or malformed.
    #[error("Invalid private key: {message}")]
    InvalidKey { message: String },

    /// The signing operation failed.
    #[error("Signing operation failed: {message}")]
    SigningFailed { message: String },
}

/// Errors during GitHub API operations.
///
/// `endpoint` is always `"<METHOD> <path>"` and never includes credentials.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// 401 or 403: bad assertion, revoked key, or insufficient permissions.
    #[error("Authentication failed for {endpoint} ({status}): {message}")]
    Authentication {
        status: u16,
        endpoint: String,
        message: String,
    },

    /// 404: the requested resource does not exist or is hidden from the App.
    #[error("Resource not found: {endpoint}")]
    NotFound { endpoint: String },

    /// Rate limiting, server errors, and network failures.
    #[error("Transient failure for {endpoint}{}: {message}", status_suffix(*status))]
    Transient {
        status: Option<u16>,
        endpoint: String,
        message: String,
        retry_after: Option<Duration>,
    },

    /// Every retry attempt failed with a transient error.
    #[error("Request to {endpoint} failed after {attempts} attempts: {last}")]
    ExchangeFailed {
        endpoint: String,
        attempts: u32,
        #[source]
        last: Box<ApiError>,
    },

    /// The caller's deadline expired before the request could complete.
    #[error("Deadline exceeded for {endpoint} after {attempts} attempt(s)")]
    DeadlineExceeded {
        endpoint: String,
        attempts: u32,
        #[source]
        last: Option<Box<ApiError>>,
    },

    /// Any other non-success status (e.g. 422).
    #[error("Unexpected status {status} from {endpoint}: {message}")]
    UnexpectedStatus {
        status: u16,
        endpoint: String,
        message: String,
    },

    /// A success response could not be decoded into the expected shape.
    #[error("Invalid response from {endpoint}: {message}")]
    InvalidResponse { endpoint: String, message: String },

    /// The request could not be built (bad header value, unserializable body).
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// The HTTP client could not be configured.
    #[error("Client configuration error: {message}")]
    Configuration { message: String },
}

fn status_suffix(status: Option<u16>) -> String {
    status.map(|s| format!(" ({})", s)).unwrap_or_default()
}

impl ApiError {
    /// Check if this error represents a transient condition that may succeed if retried.
    ///
    /// Transient conditions include:
    /// - Server errors (5xx)
    /// - Rate limiting (429, or 403 with exhausted rate limit headers)
    /// - Request timeouts and network/transport errors
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Get the server-requested delay before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Transient { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// HTTP status associated with this error, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Authentication { status, .. } | Self::UnexpectedStatus { status, .. } => {
                Some(*status)
            }
            Self::NotFound { .. } => Some(404),
            Self::Transient { status, .. } => *status,
            Self::ExchangeFailed { last, .. } => last.status(),
            _ => None,
        }
    }
}

/// Errors during token caching operations.
///
/// Cache errors are non-fatal: the engine falls back to a fresh exchange.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// A cache operation failed for a specific reason.
    #[error("Cache operation failed: {message}")]
    OperationFailed { message: String },
}

/// Input validation errors.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    /// A required field is missing.
    #[error("Required field missing: {field}")]
    Required { field: String },

    /// A field has an invalid format.
    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
