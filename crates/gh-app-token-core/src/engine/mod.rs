//! Installation token engine.
//!
//! [`AuthEngine`] ties together assertion signing, the GitHub client and the
//! token cache. A token request is served from the cache when the cached entry
//! is still outside its safety margin; otherwise exactly one task per
//! installation performs the exchange while concurrent callers wait for and
//! share its result, failures included.

mod single_flight;

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::auth::{
    GitHubAppId, InMemoryTokenCache, InstallationId, InstallationToken, IssuedToken,
    JsonWebToken, JwtSigner, RS256JwtSigner, RepositoryTarget, TokenCache,
};
use crate::client::{
    AccessTokenRequest, ApiResponse, App, Authorization, CheckRun, ClientConfig,
    CreateCheckRunRequest, CreateDeploymentRequest, CreateDeploymentStatusRequest, Deployment,
    DeploymentStatus, FileCommit, GitHubClient, Installation, PutFileRequest, RepositoryContent,
    UpdateCheckRunRequest,
};
use crate::clock::{Clock, SystemClock};
use crate::config::AuthConfig;
use crate::error::{ApiError, AuthError};

use single_flight::SingleFlight;

/// Issues installation tokens for one GitHub App.
///
/// Share it behind an `Arc`; every operation takes `&self`.
///
/// # Examples
///
/// ```no_run
/// use gh_app_token_core::auth::{GitHubAppId, InstallationId, PrivateKey, RS256JwtSigner};
/// use gh_app_token_core::AuthEngine;
///
/// # async fn example(pem: &str) -> Result<(), Box<dyn std::error::Error>> {
/// let key = PrivateKey::from_pem(pem)?;
/// let signer = RS256JwtSigner::new(GitHubAppId::new(123456), key);
///
/// let engine = AuthEngine::builder(signer)
///     .installation_id(InstallationId::new(789012))
///     .build()?;
///
/// let token = engine.get_installation_token(None).await?;
/// # Ok(())
/// # }
/// ```
pub struct AuthEngine {
    signer: Arc<dyn JwtSigner>,
    client: GitHubClient,
    cache: Arc<dyn TokenCache>,
    clock: Arc<dyn Clock>,
    installation_id: Option<InstallationId>,
    call_timeout: Option<Duration>,
    in_flight: SingleFlight,
}

impl AuthEngine {
    /// Start building an engine around `signer`.
    pub fn builder(signer: impl JwtSigner + 'static) -> AuthEngineBuilder {
        AuthEngineBuilder::new(Arc::new(signer))
    }

    /// Build an engine from validated configuration.
    ///
    /// # Errors
    ///
    /// - `Validation` if the configuration is incomplete or malformed
    /// - `InvalidKey` if the private key cannot be read or parsed
    /// - `Api(Configuration)` if the HTTP client cannot be created
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        config.validate()?;

        let app_id = config.app_id()?;
        let key = config.load_private_key()?;
        let signer = RS256JwtSigner::new(app_id, key);

        let mut builder = Self::builder(signer).client_config(config.client_config(app_id));
        if let Some(id) = config.installation_id()? {
            builder = builder.installation_id(id);
        }
        if let Some(timeout) = config.call_timeout() {
            builder = builder.call_timeout(timeout);
        }
        builder.build()
    }

    /// The App this engine authenticates as.
    pub fn app_id(&self) -> GitHubAppId {
        self.signer.app_id()
    }

    /// Installation used when a call does not name one.
    pub fn default_installation_id(&self) -> Option<InstallationId> {
        self.installation_id
    }

    /// The underlying GitHub client.
    pub fn client(&self) -> &GitHubClient {
        &self.client
    }

    /// Sign a fresh App assertion.
    ///
    /// Assertions are never cached; each call signs a new one.
    pub fn app_token(&self) -> Result<JsonWebToken, AuthError> {
        Ok(self.signer.sign(self.clock.now())?)
    }

    // ========================================================================
    // Installation tokens
    // ========================================================================

    /// Get a token for `installation_id`, or for the configured installation.
    ///
    /// Served from the cache when possible. Concurrent misses for the same
    /// installation share a single exchange.
    ///
    /// # Errors
    ///
    /// - `MissingInstallationId` if no id is given and none is configured
    /// - `UnknownInstallation` if GitHub does not know the installation
    /// - `Authentication` if GitHub rejects the App assertion
    /// - `Api` for exhausted retries, deadline expiry and malformed responses
    #[instrument(skip(self))]
    pub async fn get_installation_token(
        &self,
        installation_id: Option<InstallationId>,
    ) -> Result<IssuedToken, AuthError> {
        let installation_id = installation_id
            .or(self.installation_id)
            .ok_or(AuthError::MissingInstallationId)?;

        let token = self
            .installation_token(installation_id, self.deadline())
            .await?;
        Ok(IssuedToken::from(&token))
    }

    /// Get a token for the installation that covers `owner/repo`.
    ///
    /// Uses the configured installation when there is one; otherwise looks the
    /// installation up first. The call timeout spans both steps.
    ///
    /// # Errors
    ///
    /// - `Validation` if `owner` or `repo` is malformed
    /// - `InstallationNotFound` if the App is not installed on the repository
    /// - the errors of [`AuthEngine::get_installation_token`]
    #[instrument(skip(self))]
    pub async fn get_repository_token(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<IssuedToken, AuthError> {
        let target = RepositoryTarget::new(owner, repo)?;
        let deadline = self.deadline();

        let installation_id = self.installation_for(&target, deadline).await?;
        let token = self.installation_token(installation_id, deadline).await?;
        Ok(IssuedToken::from(&token))
    }

    /// Exchange a new token for `installation_id` even if a valid one is cached.
    ///
    /// The new token replaces the cached entry.
    #[instrument(skip(self))]
    pub async fn refresh_installation_token(
        &self,
        installation_id: InstallationId,
    ) -> Result<IssuedToken, AuthError> {
        let token = self
            .replace_token(installation_id, self.deadline())
            .await?;
        Ok(IssuedToken::from(&token))
    }

    /// Get a token restricted to `permissions`.
    ///
    /// Down-scoped tokens bypass the cache: the cached token for the same
    /// installation carries the full permission set.
    #[instrument(skip(self))]
    pub async fn get_scoped_installation_token(
        &self,
        installation_id: InstallationId,
        permissions: BTreeMap<String, String>,
    ) -> Result<IssuedToken, AuthError> {
        let request = AccessTokenRequest::with_permissions(permissions);
        let token = self
            .exchange(installation_id, &request, self.deadline())
            .await?;
        Ok(IssuedToken::from(&token))
    }

    /// Look up which installation of the App covers `owner/repo`.
    ///
    /// # Errors
    ///
    /// Returns `InstallationNotFound` when the App is not installed there.
    #[instrument(skip(self))]
    pub async fn resolve_installation(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<InstallationId, AuthError> {
        let target = RepositoryTarget::new(owner, repo)?;
        self.resolve(&target, self.deadline()).await
    }

    // ========================================================================
    // App-level calls
    // ========================================================================

    /// Metadata of the authenticated App.
    #[instrument(skip(self))]
    pub async fn get_app(&self) -> Result<App, AuthError> {
        let jwt = self.app_token()?;
        Ok(self.client.get_app(&jwt, self.deadline()).await?)
    }

    /// All installations of the App.
    #[instrument(skip(self))]
    pub async fn list_installations(&self) -> Result<Vec<Installation>, AuthError> {
        let jwt = self.app_token()?;
        Ok(self.client.list_installations(&jwt, self.deadline()).await?)
    }

    // ========================================================================
    // Installation-authenticated calls
    // ========================================================================

    /// Call the API on `owner/repo` with an installation token.
    ///
    /// If GitHub answers 401 the cached token is dropped, a fresh one is
    /// exchanged and the call is repeated once.
    #[instrument(skip(self, body))]
    pub async fn installation_request(
        &self,
        owner: &str,
        repo: &str,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<ApiResponse, AuthError> {
        let target = RepositoryTarget::new(owner, repo)?;
        let deadline = self.deadline();

        let installation_id = self.installation_for(&target, deadline).await?;
        let token = self.installation_token(installation_id, deadline).await?;

        let result = self
            .client
            .request(
                method.clone(),
                path,
                Authorization::Installation(&token),
                body,
                deadline,
            )
            .await;

        match result {
            Err(ApiError::Authentication { status: 401, .. }) => {
                warn!(
                    installation_id = %installation_id,
                    "Installation token rejected, refreshing and retrying once"
                );
                let fresh = self.replace_token(installation_id, deadline).await?;
                Ok(self
                    .client
                    .request(
                        method,
                        path,
                        Authorization::Installation(&fresh),
                        body,
                        deadline,
                    )
                    .await?)
            }
            other => Ok(other?),
        }
    }

    /// Create a check run on `owner/repo`.
    pub async fn create_check_run(
        &self,
        owner: &str,
        repo: &str,
        request: &CreateCheckRunRequest,
    ) -> Result<CheckRun, AuthError> {
        let path = format!("/repos/{}/{}/check-runs", owner, repo);
        self.send_json(owner, repo, Method::POST, &path, request)
            .await
    }

    /// Update check run `check_run_id` on `owner/repo`.
    pub async fn update_check_run(
        &self,
        owner: &str,
        repo: &str,
        check_run_id: u64,
        request: &UpdateCheckRunRequest,
    ) -> Result<CheckRun, AuthError> {
        let path = format!("/repos/{}/{}/check-runs/{}", owner, repo, check_run_id);
        self.send_json(owner, repo, Method::PATCH, &path, request)
            .await
    }

    /// Create a deployment on `owner/repo`.
    pub async fn create_deployment(
        &self,
        owner: &str,
        repo: &str,
        request: &CreateDeploymentRequest,
    ) -> Result<Deployment, AuthError> {
        let path = format!("/repos/{}/{}/deployments", owner, repo);
        self.send_json(owner, repo, Method::POST, &path, request)
            .await
    }

    /// Add a status to deployment `deployment_id` on `owner/repo`.
    pub async fn create_deployment_status(
        &self,
        owner: &str,
        repo: &str,
        deployment_id: u64,
        request: &CreateDeploymentStatusRequest,
    ) -> Result<DeploymentStatus, AuthError> {
        let path = format!(
            "/repos/{}/{}/deployments/{}/statuses",
            owner, repo, deployment_id
        );
        self.send_json(owner, repo, Method::POST, &path, request)
            .await
    }

    /// Read the file or directory at `path` on the default branch of `owner/repo`.
    ///
    /// An empty `path` lists the repository root.
    pub async fn get_repository_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
    ) -> Result<RepositoryContent, AuthError> {
        let endpoint = contents_path(owner, repo, path);
        let response = self
            .installation_request(owner, repo, Method::GET, &endpoint, None)
            .await?;
        Ok(response.json()?)
    }

    /// Create the file at `path`, or update it when `request` names the current sha.
    pub async fn create_or_update_file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        request: &PutFileRequest,
    ) -> Result<FileCommit, AuthError> {
        let endpoint = contents_path(owner, repo, path);
        self.send_json(owner, repo, Method::PUT, &endpoint, request)
            .await
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn deadline(&self) -> Option<Instant> {
        self.call_timeout.map(|timeout| Instant::now() + timeout)
    }

    async fn send_json<B, T>(
        &self,
        owner: &str,
        repo: &str,
        method: Method,
        path: &str,
        request: &B,
    ) -> Result<T, AuthError>
    where
        B: Serialize,
        T: serde::de::DeserializeOwned,
    {
        let body = serde_json::to_value(request).map_err(|e| ApiError::InvalidRequest {
            message: format!("Failed to encode request body: {}", e),
        })?;
        let response = self
            .installation_request(owner, repo, method, path, Some(&body))
            .await?;
        Ok(response.json()?)
    }

    async fn installation_for(
        &self,
        target: &RepositoryTarget,
        deadline: Option<Instant>,
    ) -> Result<InstallationId, AuthError> {
        match self.installation_id {
            Some(id) => {
                debug!(repository = %target, installation_id = %id, "Using configured installation");
                Ok(id)
            }
            None => self.resolve(target, deadline).await,
        }
    }

    async fn resolve(
        &self,
        target: &RepositoryTarget,
        deadline: Option<Instant>,
    ) -> Result<InstallationId, AuthError> {
        let jwt = self.app_token()?;
        match self
            .client
            .find_repository_installation(&jwt, target, deadline)
            .await
        {
            Ok(id) => Ok(id),
            Err(ApiError::NotFound { .. }) => Err(AuthError::InstallationNotFound {
                owner: target.owner().to_string(),
                repo: target.repo().to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Cached token if still valid; a cache failure counts as a miss.
    async fn cached_token(&self, installation_id: InstallationId) -> Option<InstallationToken> {
        match self.cache.get(installation_id).await {
            Ok(Some(entry)) if self.cache.is_valid(&entry, self.clock.now()) => {
                Some(entry.token().clone())
            }
            Ok(Some(_)) => {
                debug!(installation_id = %installation_id, "Cached token inside safety margin");
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(installation_id = %installation_id, error = %e, "Token cache read failed");
                None
            }
        }
    }

    async fn store(&self, token: &InstallationToken) {
        if let Err(e) = self.cache.put(token.clone(), self.clock.now()).await {
            warn!(
                installation_id = %token.installation_id(),
                error = %e,
                "Failed to cache installation token"
            );
        }
    }

    async fn installation_token(
        &self,
        installation_id: InstallationId,
        deadline: Option<Instant>,
    ) -> Result<InstallationToken, AuthError> {
        if let Some(token) = self.cached_token(installation_id).await {
            debug!(installation_id = %installation_id, "Cache hit for installation token");
            return Ok(token);
        }

        self.shared_exchange(installation_id, deadline, || async move {
            // A flight that landed since the first read may have filled the cache.
            if let Some(token) = self.cached_token(installation_id).await {
                debug!(installation_id = %installation_id, "Installation token filled by concurrent request");
                return Ok(token);
            }

            debug!(installation_id = %installation_id, "Cache miss for installation token");
            self.exchange_and_store(installation_id, deadline).await
        })
        .await
    }

    async fn replace_token(
        &self,
        installation_id: InstallationId,
        deadline: Option<Instant>,
    ) -> Result<InstallationToken, AuthError> {
        if let Err(e) = self.cache.invalidate(installation_id).await {
            warn!(installation_id = %installation_id, error = %e, "Failed to invalidate cached token");
        }

        self.shared_exchange(installation_id, deadline, || {
            self.exchange_and_store(installation_id, deadline)
        })
        .await
    }

    /// Run `exchange` as the single flight for `installation_id`.
    async fn shared_exchange<F, Fut>(
        &self,
        installation_id: InstallationId,
        deadline: Option<Instant>,
        exchange: F,
    ) -> Result<InstallationToken, AuthError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<InstallationToken, AuthError>>,
    {
        self.in_flight
            .run(installation_id, deadline, exchange)
            .await
            .unwrap_or_else(|| {
                warn!(installation_id = %installation_id, "Deadline passed waiting for in-flight exchange");
                Err(AuthError::Api(ApiError::DeadlineExceeded {
                    endpoint: access_token_endpoint(installation_id),
                    attempts: 0,
                    last: None,
                }))
            })
    }

    async fn exchange_and_store(
        &self,
        installation_id: InstallationId,
        deadline: Option<Instant>,
    ) -> Result<InstallationToken, AuthError> {
        let token = self
            .exchange(installation_id, &AccessTokenRequest::default(), deadline)
            .await?;
        self.store(&token).await;
        Ok(token)
    }

    async fn exchange(
        &self,
        installation_id: InstallationId,
        request: &AccessTokenRequest,
        deadline: Option<Instant>,
    ) -> Result<InstallationToken, AuthError> {
        let jwt = self.app_token()?;

        let token = match self
            .client
            .create_installation_access_token(&jwt, installation_id, request, deadline)
            .await
        {
            Ok(token) => token,
            Err(ApiError::NotFound { .. }) => {
                return Err(AuthError::UnknownInstallation { installation_id })
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            installation_id = %installation_id,
            expires_at = %token.expires_at(),
            scoped = !request.is_empty(),
            "Issued installation token"
        );
        Ok(token)
    }
}

impl std::fmt::Debug for AuthEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthEngine")
            .field("app_id", &self.signer.app_id())
            .field("installation_id", &self.installation_id)
            .field("client", &self.client)
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

fn contents_path(owner: &str, repo: &str, path: &str) -> String {
    format!(
        "/repos/{}/{}/contents/{}",
        owner,
        repo,
        path.trim_start_matches('/')
    )
}

fn access_token_endpoint(installation_id: InstallationId) -> String {
    format!("POST /app/installations/{}/access_tokens", installation_id)
}

/// Builder for [`AuthEngine`].
pub struct AuthEngineBuilder {
    signer: Arc<dyn JwtSigner>,
    client_config: Option<ClientConfig>,
    client: Option<GitHubClient>,
    cache: Option<Arc<dyn TokenCache>>,
    clock: Option<Arc<dyn Clock>>,
    installation_id: Option<InstallationId>,
    call_timeout: Option<Duration>,
}

impl AuthEngineBuilder {
    fn new(signer: Arc<dyn JwtSigner>) -> Self {
        Self {
            signer,
            client_config: None,
            client: None,
            cache: None,
            clock: None,
            installation_id: None,
            call_timeout: None,
        }
    }

    /// Client configuration. Ignored when a client is supplied directly.
    pub fn client_config(mut self, config: ClientConfig) -> Self {
        self.client_config = Some(config);
        self
    }

    /// Use an existing client.
    pub fn client(mut self, client: GitHubClient) -> Self {
        self.client = Some(client);
        self
    }

    /// Token cache. Defaults to a fresh [`InMemoryTokenCache`].
    pub fn cache(mut self, cache: Arc<dyn TokenCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Time source. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Installation used when a call does not name one.
    pub fn installation_id(mut self, installation_id: InstallationId) -> Self {
        self.installation_id = Some(installation_id);
        self
    }

    /// Upper bound on the wall time of one engine operation, retries included.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Build the engine.
    ///
    /// # Errors
    ///
    /// Returns `Api(Configuration)` if the HTTP client cannot be created.
    pub fn build(self) -> Result<AuthEngine, AuthError> {
        let client = match self.client {
            Some(client) => client,
            None => GitHubClient::new(self.client_config.unwrap_or_default())?,
        };

        Ok(AuthEngine {
            signer: self.signer,
            client,
            cache: self
                .cache
                .unwrap_or_else(|| Arc::new(InMemoryTokenCache::new())),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            installation_id: self.installation_id,
            call_timeout: self.call_timeout,
            in_flight: SingleFlight::new(),
        })
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
