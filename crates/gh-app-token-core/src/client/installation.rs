//! Installation token exchange and installation lookup.
//!
//! All calls here authenticate as the App with a signed assertion.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::auth::{
    InstallationId, InstallationToken, JsonWebToken, RepositorySelection, RepositoryTarget,
};
use crate::client::{Authorization, GitHubClient};
use crate::error::ApiError;

#[cfg(test)]
#[path = "installation_tests.rs"]
mod tests;

/// Optional body of `POST /app/installations/{id}/access_tokens`.
///
/// An empty request yields a token with all of the installation's permissions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccessTokenRequest {
    /// Down-scoped permissions (scope → `read` / `write`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<BTreeMap<String, String>>,

    /// Restrict the token to these repository names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repositories: Option<Vec<String>>,
}

impl AccessTokenRequest {
    /// Request with down-scoped permissions.
    pub fn with_permissions(permissions: BTreeMap<String, String>) -> Self {
        Self {
            permissions: Some(permissions),
            repositories: None,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.permissions.is_none() && self.repositories.is_none()
    }
}

#[derive(Deserialize)]
struct AccessTokenResponse {
    token: String,
    expires_at: DateTime<Utc>,
    #[serde(default)]
    permissions: Option<BTreeMap<String, String>>,
    #[serde(default)]
    repository_selection: Option<RepositorySelection>,
}

/// Account an App is installed on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub login: String,
    pub id: u64,
    #[serde(rename = "type", default)]
    pub account_type: Option<String>,
}

/// A GitHub App installation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installation {
    pub id: InstallationId,
    #[serde(default)]
    pub account: Option<Account>,
    #[serde(default)]
    pub app_id: Option<u64>,
    #[serde(default)]
    pub target_type: Option<String>,
    #[serde(default)]
    pub repository_selection: Option<RepositorySelection>,
    #[serde(default)]
    pub permissions: BTreeMap<String, String>,
    #[serde(default)]
    pub suspended_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct InstallationRef {
    id: InstallationId,
}

impl GitHubClient {
    /// Exchange an App assertion for an installation access token.
    ///
    /// `POST /app/installations/{installation_id}/access_tokens`
    ///
    /// # Errors
    ///
    /// - `NotFound` if the installation does not exist or belongs to another App
    /// - `Authentication` if the assertion is rejected
    /// - `InvalidResponse` if the body lacks `token` or `expires_at`
    /// - the retry errors described on [`GitHubClient::request`]
    pub async fn create_installation_access_token(
        &self,
        jwt: &JsonWebToken,
        installation_id: InstallationId,
        request: &AccessTokenRequest,
        deadline: Option<Instant>,
    ) -> Result<InstallationToken, ApiError> {
        let path = format!("/app/installations/{}/access_tokens", installation_id);
        let body = if request.is_empty() {
            None
        } else {
            Some(
                serde_json::to_value(request).map_err(|e| ApiError::InvalidRequest {
                    message: format!("Failed to encode access token request: {}", e),
                })?,
            )
        };

        let response = self
            .request(
                Method::POST,
                &path,
                Authorization::App(jwt),
                body.as_ref(),
                deadline,
            )
            .await?;
        let parsed: AccessTokenResponse = response.json()?;

        debug!(
            installation_id = %installation_id,
            expires_at = %parsed.expires_at,
            "Obtained installation access token"
        );

        let mut token = InstallationToken::new(parsed.token, installation_id, parsed.expires_at);
        if let Some(permissions) = parsed.permissions {
            token = token.with_permissions(permissions);
        }
        if let Some(selection) = parsed.repository_selection {
            token = token.with_repository_selection(selection);
        }
        Ok(token)
    }

    /// Look up the installation id of the App on a repository.
    ///
    /// `GET /repos/{owner}/{repo}/installation`
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the App is not installed on the repository.
    pub async fn find_repository_installation(
        &self,
        jwt: &JsonWebToken,
        target: &RepositoryTarget,
        deadline: Option<Instant>,
    ) -> Result<InstallationId, ApiError> {
        let path = format!("/repos/{}/{}/installation", target.owner(), target.repo());

        let response = match self
            .request(Method::GET, &path, Authorization::App(jwt), None, deadline)
            .await
        {
            Ok(response) => response,
            Err(err @ ApiError::NotFound { .. }) => {
                warn!(repository = %target, "GitHub App is not installed on repository");
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        let installation: InstallationRef = response.json()?;
        debug!(
            repository = %target,
            installation_id = %installation.id,
            "Resolved installation"
        );
        Ok(installation.id)
    }

    /// List the App's installations.
    ///
    /// `GET /app/installations`
    pub async fn list_installations(
        &self,
        jwt: &JsonWebToken,
        deadline: Option<Instant>,
    ) -> Result<Vec<Installation>, ApiError> {
        self.request(
            Method::GET,
            "/app/installations",
            Authorization::App(jwt),
            None,
            deadline,
        )
        .await?
        .json()
    }
}
