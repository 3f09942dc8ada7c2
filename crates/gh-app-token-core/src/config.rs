//! Engine configuration.
//!
//! [`AuthConfig`] is plain serde data so that it can be filled from files,
//! environment variables or code alike. Identifiers are kept as strings until
//! [`AuthConfig::validate`] checks them, which lets a loader report every
//! malformed value with the field it came from.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use zeroize::Zeroizing;

use crate::auth::{GitHubAppId, InstallationId, PrivateKey};
use crate::client::{ClientConfig, DEFAULT_GITHUB_API_URL};
use crate::error::{SigningError, ValidationError};

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Settings needed to build an [`crate::AuthEngine`].
///
/// Empty strings are treated the same as absent values.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Numeric GitHub App id.
    pub app_id: Option<String>,

    /// Path to the App's PEM private key.
    pub private_key_path: Option<PathBuf>,

    /// The App's PEM private key given inline.
    pub private_key: Option<String>,

    /// Installation used when a request does not name one.
    pub installation_id: Option<String>,

    /// GitHub REST API base URL.
    pub github_api_url: String,

    /// User agent; defaults to `GitHubApp/<app id>`.
    pub user_agent: Option<String>,

    /// Per-request HTTP timeout.
    pub timeout_seconds: u64,

    /// Bound on one whole engine operation, retries included.
    pub call_timeout_seconds: Option<u64>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            app_id: None,
            private_key_path: None,
            private_key: None,
            installation_id: None,
            github_api_url: DEFAULT_GITHUB_API_URL.to_string(),
            user_agent: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            call_timeout_seconds: None,
        }
    }
}

/// Where the private key comes from.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum KeySource<'a> {
    /// PEM file on disk.
    File(&'a Path),
    /// Inline PEM text.
    Pem(&'a str),
}

impl std::fmt::Debug for KeySource<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Pem(_) => f.debug_tuple("Pem").field(&"<REDACTED>").finish(),
        }
    }
}

impl AuthConfig {
    /// Check that the configuration can build an engine.
    ///
    /// - `app_id` is present and a positive integer
    /// - `installation_id`, when present, is a positive integer
    /// - exactly one of `private_key_path` and `private_key` is set
    /// - a key file, when used, exists
    /// - the API URL is http(s) and the timeouts are non-zero
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.app_id()?;
        self.installation_id()?;

        if let KeySource::File(path) = self.key_source()? {
            if !path.is_file() {
                return Err(ValidationError::InvalidFormat {
                    field: "private_key_path".to_string(),
                    message: format!("no such file: {}", path.display()),
                });
            }
        }

        let url = self.github_api_url.trim();
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(ValidationError::InvalidFormat {
                field: "github_api_url".to_string(),
                message: "must be an http or https URL".to_string(),
            });
        }

        if self.timeout_seconds == 0 {
            return Err(ValidationError::InvalidFormat {
                field: "timeout_seconds".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        if self.call_timeout_seconds == Some(0) {
            return Err(ValidationError::InvalidFormat {
                field: "call_timeout_seconds".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    /// The parsed App id.
    pub fn app_id(&self) -> Result<GitHubAppId, ValidationError> {
        match non_empty(self.app_id.as_deref()) {
            Some(id) => id.parse(),
            None => Err(ValidationError::Required {
                field: "app_id".to_string(),
            }),
        }
    }

    /// The parsed default installation id, if one is configured.
    pub fn installation_id(&self) -> Result<Option<InstallationId>, ValidationError> {
        non_empty(self.installation_id.as_deref())
            .map(|id| id.parse::<InstallationId>())
            .transpose()
    }

    /// The single configured key source.
    pub fn key_source(&self) -> Result<KeySource<'_>, ValidationError> {
        let path = self
            .private_key_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty());
        let pem = non_empty(self.private_key.as_deref());

        match (path, pem) {
            (Some(path), None) => Ok(KeySource::File(path)),
            (None, Some(pem)) => Ok(KeySource::Pem(pem)),
            (None, None) => Err(ValidationError::Required {
                field: "private_key_path or private_key".to_string(),
            }),
            (Some(_), Some(_)) => Err(ValidationError::InvalidFormat {
                field: "private_key".to_string(),
                message: "set either private_key_path or private_key, not both".to_string(),
            }),
        }
    }

    /// Read and parse the configured private key.
    pub fn load_private_key(&self) -> Result<PrivateKey, SigningError> {
        let source = self.key_source().map_err(|e| SigningError::InvalidKey {
            message: e.to_string(),
        })?;

        match source {
            KeySource::File(path) => PrivateKey::from_file(path),
            // Single-line secrets often carry the newlines escaped.
            KeySource::Pem(pem) if !pem.contains('\n') && pem.contains("\\n") => {
                let unescaped = Zeroizing::new(pem.replace("\\n", "\n"));
                PrivateKey::from_pem(&unescaped)
            }
            KeySource::Pem(pem) => PrivateKey::from_pem(pem),
        }
    }

    /// HTTP client settings for the App `app_id`.
    pub fn client_config(&self, app_id: GitHubAppId) -> ClientConfig {
        let user_agent = non_empty(self.user_agent.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| format!("GitHubApp/{}", app_id));

        ClientConfig::default()
            .with_github_api_url(self.github_api_url.trim())
            .with_user_agent(user_agent)
            .with_timeout(Duration::from_secs(self.timeout_seconds))
    }

    /// Overall bound on one engine operation.
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_seconds.map(Duration::from_secs)
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("app_id", &self.app_id)
            .field("private_key_path", &self.private_key_path)
            .field(
                "private_key",
                &self.private_key.as_ref().map(|_| "<REDACTED>"),
            )
            .field("installation_id", &self.installation_id)
            .field("github_api_url", &self.github_api_url)
            .field("user_agent", &self.user_agent)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("call_timeout_seconds", &self.call_timeout_seconds)
            .finish()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
