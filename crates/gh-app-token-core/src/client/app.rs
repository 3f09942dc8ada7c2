//! GitHub App metadata.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::auth::JsonWebToken;
use crate::client::{Account, Authorization, GitHubClient};
use crate::error::ApiError;

/// GitHub App metadata as returned by `GET /app`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct App {
    /// Unique numeric identifier for the GitHub App
    pub id: u64,

    /// URL-friendly string identifier for the app
    #[serde(default)]
    pub slug: Option<String>,

    /// Display name of the GitHub App
    pub name: String,

    /// Owner of the GitHub App (user or organization)
    #[serde(default)]
    pub owner: Option<Account>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub html_url: Option<String>,

    /// Permissions requested by the App (scope → level)
    #[serde(default)]
    pub permissions: BTreeMap<String, String>,

    /// Webhook events the App subscribes to
    #[serde(default)]
    pub events: Vec<String>,

    #[serde(default)]
    pub installations_count: Option<u64>,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl GitHubClient {
    /// Get details about the authenticated GitHub App.
    ///
    /// `GET /app`, authenticated with an App assertion.
    pub async fn get_app(
        &self,
        jwt: &JsonWebToken,
        deadline: Option<Instant>,
    ) -> Result<App, ApiError> {
        self.request(Method::GET, "/app", Authorization::App(jwt), None, deadline)
            .await?
            .json()
    }
}
