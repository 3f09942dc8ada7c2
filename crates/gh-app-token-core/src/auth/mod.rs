//! GitHub App authentication types and interfaces.
//!
//! This module provides the core authentication types:
//! - ID types (GitHubAppId, InstallationId) and the RepositoryTarget pair
//! - Token types (JsonWebToken, InstallationToken, IssuedToken)
//! - The signer and cache trait interfaces used by the engine

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, SigningError, ValidationError};

pub mod cache;
pub mod jwt;

pub use cache::{cache_key, CacheEntry, InMemoryTokenCache, DEFAULT_SAFETY_MARGIN_SECS};
pub use jwt::{PrivateKey, RS256JwtSigner};

// ============================================================================
// Core ID Types
// ============================================================================

/// GitHub App identifier assigned during app registration.
///
/// # Examples
///
/// ```
/// use gh_app_token_core::auth::GitHubAppId;
///
/// let app_id = GitHubAppId::new(123456);
/// assert_eq!(app_id.as_u64(), 123456);
/// assert_eq!(app_id.to_string(), "123456");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GitHubAppId(u64);

impl GitHubAppId {
    /// Create a new GitHub App ID.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw u64 value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for GitHubAppId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GitHubAppId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_positive_id(s, "app_id").map(Self::new)
    }
}

/// GitHub App installation identifier for a specific account.
///
/// # Examples
///
/// ```
/// use gh_app_token_core::auth::InstallationId;
///
/// let installation = InstallationId::new(98765);
/// assert_eq!(installation.as_u64(), 98765);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstallationId(u64);

impl InstallationId {
    /// Create a new installation ID.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw u64 value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for InstallationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for InstallationId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_positive_id(s, "installation_id").map(Self::new)
    }
}

fn parse_positive_id(s: &str, field: &str) -> Result<u64, ValidationError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    match trimmed.parse::<u64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            message: "must be a positive integer".to_string(),
        }),
    }
}

/// An owner/repository pair used to look up an installation.
///
/// Both parts must be non-empty and contain no `/` or whitespace.
///
/// # Examples
///
/// ```
/// use gh_app_token_core::auth::RepositoryTarget;
///
/// let target = RepositoryTarget::new("acme", "widgets").unwrap();
/// assert_eq!(target.to_string(), "acme/widgets");
///
/// assert!(RepositoryTarget::new("acme", "").is_err());
/// assert!("acme".parse::<RepositoryTarget>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryTarget {
    owner: String,
    repo: String,
}

impl RepositoryTarget {
    /// Create a validated target.
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Result<Self, ValidationError> {
        let owner = owner.into();
        let repo = repo.into();
        validate_path_segment(&owner, "owner")?;
        validate_path_segment(&repo, "repo")?;
        Ok(Self { owner, repo })
    }

    /// Repository owner (user or organization login).
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Repository name.
    pub fn repo(&self) -> &str {
        &self.repo
    }
}

fn validate_path_segment(value: &str, field: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    if value.contains('/') || value.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            message: "must not contain '/' or whitespace".to_string(),
        });
    }
    Ok(())
}

impl std::fmt::Display for RepositoryTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

impl FromStr for RepositoryTarget {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (owner, repo) = s
            .split_once('/')
            .ok_or_else(|| ValidationError::InvalidFormat {
                field: "repository".to_string(),
                message: "expected 'owner/repo'".to_string(),
            })?;
        Self::new(owner, repo)
    }
}

// ============================================================================
// Token Types
// ============================================================================

/// Signed App assertion (JWT) used to authenticate as the GitHub App itself.
///
/// Assertions are created fresh for every exchange and never cached. The
/// token string is never exposed in Debug output.
#[derive(Clone)]
pub struct JsonWebToken {
    token: String,
    app_id: GitHubAppId,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl JsonWebToken {
    /// Create a new assertion from an already encoded JWT.
    pub fn new(
        token: String,
        app_id: GitHubAppId,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            token,
            app_id,
            issued_at,
            expires_at,
        }
    }

    /// Get the encoded token for the `Authorization: Bearer` header.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Get the GitHub App ID this assertion represents.
    pub fn app_id(&self) -> GitHubAppId {
        self.app_id
    }

    /// Get the `iat` claim as a timestamp (already backdated for clock skew).
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Get the `exp` claim as a timestamp.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

// Security: Don't expose token in debug output
impl std::fmt::Debug for JsonWebToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonWebToken")
            .field("app_id", &self.app_id)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("token", &"<REDACTED>")
            .finish()
    }
}

/// Installation-scoped access token returned by GitHub.
///
/// Installation tokens live for about an hour. They are never mutated, only
/// replaced. The token string is never exposed in Debug output.
///
/// # Examples
///
/// ```
/// use gh_app_token_core::auth::{InstallationId, InstallationToken};
/// use chrono::{Duration, Utc};
///
/// let token = InstallationToken::new(
///     "ghs_example".to_string(),
///     InstallationId::new(456),
///     Utc::now() + Duration::hours(1),
/// );
///
/// assert_eq!(token.installation_id(), InstallationId::new(456));
/// assert!(!format!("{:?}", token).contains("ghs_example"));
/// ```
#[derive(Clone)]
pub struct InstallationToken {
    token: String,
    installation_id: InstallationId,
    expires_at: DateTime<Utc>,
    permissions: Option<BTreeMap<String, String>>,
    repository_selection: Option<RepositorySelection>,
}

impl InstallationToken {
    /// Create a new installation token without scope metadata.
    pub fn new(token: String, installation_id: InstallationId, expires_at: DateTime<Utc>) -> Self {
        Self {
            token,
            installation_id,
            expires_at,
            permissions: None,
            repository_selection: None,
        }
    }

    /// Attach the permission map GitHub reported for this token.
    #[must_use]
    pub fn with_permissions(mut self, permissions: BTreeMap<String, String>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    /// Attach the repository selection GitHub reported for this token.
    #[must_use]
    pub fn with_repository_selection(mut self, selection: RepositorySelection) -> Self {
        self.repository_selection = Some(selection);
        self
    }

    /// Get the token string for use in API requests.
    ///
    /// This is sent as `Authorization: token <token>`.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Get the installation ID this token is for.
    pub fn installation_id(&self) -> InstallationId {
        self.installation_id
    }

    /// Get when this token expires.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Get the granted permissions (scope → level), if reported.
    pub fn permissions(&self) -> Option<&BTreeMap<String, String>> {
        self.permissions.as_ref()
    }

    /// Get the repository selection, if reported.
    pub fn repository_selection(&self) -> Option<&RepositorySelection> {
        self.repository_selection.as_ref()
    }

    /// Check if the token will expire within `margin` of `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now + margin >= self.expires_at
    }
}

// Security: Redact token in debug output
impl std::fmt::Debug for InstallationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallationToken")
            .field("installation_id", &self.installation_id)
            .field("expires_at", &self.expires_at)
            .field("permissions", &self.permissions)
            .field("repository_selection", &self.repository_selection)
            .field("token", &"<REDACTED>")
            .finish()
    }
}

/// Repository selection for an installation or token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositorySelection {
    All,
    Selected,
}

/// The engine's result: a usable installation token and its expiry.
///
/// Serializes to `{"token", "expires_at", "installation_id"}`.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub installation_id: InstallationId,
}

impl From<&InstallationToken> for IssuedToken {
    fn from(token: &InstallationToken) -> Self {
        Self {
            token: token.token().to_string(),
            expires_at: token.expires_at(),
            installation_id: token.installation_id(),
        }
    }
}

impl std::fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedToken")
            .field("installation_id", &self.installation_id)
            .field("expires_at", &self.expires_at)
            .field("token", &"<REDACTED>")
            .finish()
    }
}

/// JWT claims structure for GitHub App authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Issuer (GitHub App ID, as a string)
    pub iss: String,
    /// Issued at (Unix timestamp, backdated for clock skew)
    pub iat: i64,
    /// Expiration (Unix timestamp, at most 10 minutes after iat)
    pub exp: i64,
}

impl JwtClaims {
    /// `iat` as a timestamp, or `None` if it is out of range.
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.iat, 0)
    }

    /// `exp` as a timestamp, or `None` if it is out of range.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

// ============================================================================
// Trait Definitions
// ============================================================================

/// Produces signed App assertions.
pub trait JwtSigner: Send + Sync {
    /// The App this signer authenticates as.
    fn app_id(&self) -> GitHubAppId;

    /// Build and sign a fresh assertion relative to `now`.
    fn sign(&self, now: DateTime<Utc>) -> Result<JsonWebToken, SigningError>;
}

/// Keyed store of installation tokens with expiry-aware reads.
///
/// Implementations must be safe for concurrent use. Entries are never evicted
/// proactively; callers check [`TokenCache::is_valid`] and replace stale ones.
#[async_trait::async_trait]
pub trait TokenCache: Send + Sync {
    /// Get the entry for an installation, valid or not.
    async fn get(&self, installation_id: InstallationId) -> Result<Option<CacheEntry>, CacheError>;

    /// Store (or replace) the token for its installation.
    async fn put(
        &self,
        token: InstallationToken,
        retrieved_at: DateTime<Utc>,
    ) -> Result<(), CacheError>;

    /// Remove the entry for an installation.
    async fn invalidate(&self, installation_id: InstallationId) -> Result<(), CacheError>;

    /// Buffer subtracted from a token's expiry when deciding validity.
    fn safety_margin(&self) -> Duration;

    /// True iff `now + safety_margin < entry.expires_at`.
    fn is_valid(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        entry.is_valid_at(now, self.safety_margin())
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
