//! Installation token caching.
//!
//! Entries are keyed by `token_{installation_id}` and served only while they
//! are outside the safety margin before expiry. Nothing is evicted in the
//! background; a stale entry is simply bypassed and overwritten by the next
//! successful exchange.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{InstallationId, InstallationToken, TokenCache};
use crate::error::CacheError;

/// Default buffer before a token's real expiry at which it stops being served.
pub const DEFAULT_SAFETY_MARGIN_SECS: i64 = 5 * 60;

/// Cache key for an installation's token.
///
/// # Examples
///
/// ```
/// use gh_app_token_core::auth::{cache_key, InstallationId};
///
/// assert_eq!(cache_key(InstallationId::new(42)), "token_42");
/// ```
pub fn cache_key(installation_id: InstallationId) -> String {
    format!("token_{}", installation_id)
}

/// A cached installation token and when it was obtained.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    token: InstallationToken,
    retrieved_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Create a new cache entry.
    pub fn new(token: InstallationToken, retrieved_at: DateTime<Utc>) -> Self {
        Self {
            token,
            retrieved_at,
        }
    }

    /// The cached token.
    pub fn token(&self) -> &InstallationToken {
        &self.token
    }

    /// When the token was obtained from GitHub.
    pub fn retrieved_at(&self) -> DateTime<Utc> {
        self.retrieved_at
    }

    /// When the token expires on GitHub's side.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.token.expires_at()
    }

    /// True iff `now + margin < expires_at`.
    pub fn is_valid_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        !self.token.expires_within(now, margin)
    }
}

/// In-memory installation token cache.
///
/// Thread-safe through an internal `RwLock`. Cloning shares the same storage.
#[derive(Clone)]
pub struct InMemoryTokenCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    safety_margin: Duration,
}

impl InMemoryTokenCache {
    /// Create an empty cache with the default five-minute safety margin.
    pub fn new() -> Self {
        Self::with_safety_margin(Duration::seconds(DEFAULT_SAFETY_MARGIN_SECS))
    }

    /// Create an empty cache with a custom safety margin.
    pub fn with_safety_margin(safety_margin: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            safety_margin,
        }
    }

    /// Number of stored entries, including stale ones.
    pub fn len(&self) -> usize {
        self.entries.read().map(|m| m.len()).unwrap_or(0)
    }

    /// True if nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryTokenCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryTokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTokenCache")
            .field("entries", &self.len())
            .field("safety_margin", &self.safety_margin)
            .finish()
    }
}

#[async_trait]
impl TokenCache for InMemoryTokenCache {
    async fn get(&self, installation_id: InstallationId) -> Result<Option<CacheEntry>, CacheError> {
        let cache = self
            .entries
            .read()
            .map_err(|e| CacheError::OperationFailed {
                message: format!("Failed to acquire read lock: {}", e),
            })?;

        Ok(cache.get(&cache_key(installation_id)).cloned())
    }

    async fn put(
        &self,
        token: InstallationToken,
        retrieved_at: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        let mut cache = self
            .entries
            .write()
            .map_err(|e| CacheError::OperationFailed {
                message: format!("Failed to acquire write lock: {}", e),
            })?;

        let key = cache_key(token.installation_id());
        cache.insert(key, CacheEntry::new(token, retrieved_at));

        Ok(())
    }

    async fn invalidate(&self, installation_id: InstallationId) -> Result<(), CacheError> {
        let mut cache = self
            .entries
            .write()
            .map_err(|e| CacheError::OperationFailed {
                message: format!("Failed to acquire write lock: {}", e),
            })?;

        cache.remove(&cache_key(installation_id));

        Ok(())
    }

    fn safety_margin(&self) -> Duration {
        self.safety_margin
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
