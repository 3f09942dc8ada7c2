//! Tests for token cache implementation.

use super::*;
use chrono::TimeZone;

// ============================================================================
// Helper Functions
// ============================================================================

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

fn token_expiring_at(installation_id: u64, expires_at: DateTime<Utc>) -> InstallationToken {
    InstallationToken::new(
        format!("ghs_test_{}", installation_id),
        InstallationId::new(installation_id),
        expires_at,
    )
}

// ============================================================================
// Validity Window Tests
// ============================================================================

mod validity_tests {
    use super::*;

    /// Verify a token expiring inside the safety margin is not served.
    #[test]
    fn test_expires_in_4m59s_is_invalid() {
        let now = fixed_now();
        let entry = CacheEntry::new(
            token_expiring_at(1, now + Duration::seconds(4 * 60 + 59)),
            now,
        );

        assert!(!entry.is_valid_at(now, Duration::minutes(5)));
    }

    /// Verify a token expiring just outside the safety margin is served.
    #[test]
    fn test_expires_in_5m01s_is_valid() {
        let now = fixed_now();
        let entry = CacheEntry::new(
            token_expiring_at(1, now + Duration::seconds(5 * 60 + 1)),
            now,
        );

        assert!(entry.is_valid_at(now, Duration::minutes(5)));
    }

    /// Verify the boundary itself is exclusive.
    #[test]
    fn test_expires_exactly_at_margin_is_invalid() {
        let now = fixed_now();
        let entry = CacheEntry::new(token_expiring_at(1, now + Duration::minutes(5)), now);

        assert!(!entry.is_valid_at(now, Duration::minutes(5)));
    }

    /// Verify the trait's is_valid uses the cache's configured margin.
    #[test]
    fn test_trait_is_valid_uses_margin() {
        let now = fixed_now();
        let entry = CacheEntry::new(token_expiring_at(1, now + Duration::minutes(3)), now);

        let default_cache = InMemoryTokenCache::new();
        let lenient_cache = InMemoryTokenCache::with_safety_margin(Duration::minutes(1));

        assert_eq!(
            default_cache.safety_margin(),
            Duration::seconds(DEFAULT_SAFETY_MARGIN_SECS)
        );
        assert!(!default_cache.is_valid(&entry, now));
        assert!(lenient_cache.is_valid(&entry, now));
    }
}

// ============================================================================
// Storage Tests
// ============================================================================

mod storage_tests {
    use super::*;

    /// Verify the documented key format.
    #[test]
    fn test_cache_key_format() {
        assert_eq!(cache_key(InstallationId::new(12345)), "token_12345");
    }

    /// Verify a stored token is returned unchanged.
    #[tokio::test]
    async fn test_put_and_get() {
        let cache = InMemoryTokenCache::new();
        let now = fixed_now();
        let token = token_expiring_at(42, now + Duration::hours(1));

        cache.put(token.clone(), now).await.expect("Should store");

        let entry = cache
            .get(InstallationId::new(42))
            .await
            .expect("Should get")
            .expect("Should exist");

        assert_eq!(entry.token().token(), "ghs_test_42");
        assert_eq!(entry.expires_at(), token.expires_at());
        assert_eq!(entry.retrieved_at(), now);
    }

    /// Verify a missing installation yields None.
    #[tokio::test]
    async fn test_get_missing() {
        let cache = InMemoryTokenCache::new();

        let result = cache.get(InstallationId::new(7)).await.unwrap();

        assert!(result.is_none());
    }

    /// Verify stale entries are still returned by get; validity is the caller's check.
    #[tokio::test]
    async fn test_get_returns_stale_entries() {
        let cache = InMemoryTokenCache::new();
        let now = fixed_now();
        cache
            .put(token_expiring_at(3, now - Duration::minutes(1)), now)
            .await
            .unwrap();

        let entry = cache.get(InstallationId::new(3)).await.unwrap().unwrap();

        assert!(!cache.is_valid(&entry, now));
    }

    /// Verify a newer token replaces the previous one.
    #[tokio::test]
    async fn test_put_replaces() {
        let cache = InMemoryTokenCache::new();
        let now = fixed_now();
        cache
            .put(token_expiring_at(5, now + Duration::minutes(1)), now)
            .await
            .unwrap();
        let fresh = InstallationToken::new(
            "ghs_fresh".to_string(),
            InstallationId::new(5),
            now + Duration::hours(1),
        );

        cache.put(fresh, now).await.unwrap();

        let entry = cache.get(InstallationId::new(5)).await.unwrap().unwrap();
        assert_eq!(entry.token().token(), "ghs_fresh");
        assert_eq!(cache.len(), 1);
    }

    /// Verify invalidation removes only the targeted installation.
    #[tokio::test]
    async fn test_invalidate() {
        let cache = InMemoryTokenCache::new();
        let now = fixed_now();
        cache
            .put(token_expiring_at(1, now + Duration::hours(1)), now)
            .await
            .unwrap();
        cache
            .put(token_expiring_at(2, now + Duration::hours(1)), now)
            .await
            .unwrap();

        cache.invalidate(InstallationId::new(1)).await.unwrap();

        assert!(cache.get(InstallationId::new(1)).await.unwrap().is_none());
        assert!(cache.get(InstallationId::new(2)).await.unwrap().is_some());
    }

    /// Verify invalidating an absent entry is not an error.
    #[tokio::test]
    async fn test_invalidate_missing_is_ok() {
        let cache = InMemoryTokenCache::new();

        assert!(cache.invalidate(InstallationId::new(9)).await.is_ok());
        assert!(cache.is_empty());
    }

    /// Verify clones share the same storage.
    #[tokio::test]
    async fn test_clone_shares_storage() {
        let cache = InMemoryTokenCache::new();
        let other = cache.clone();
        let now = fixed_now();

        other
            .put(token_expiring_at(8, now + Duration::hours(1)), now)
            .await
            .unwrap();

        assert!(cache.get(InstallationId::new(8)).await.unwrap().is_some());
    }

    /// Verify Debug output never shows cached tokens.
    #[tokio::test]
    async fn test_debug_redacts() {
        let cache = InMemoryTokenCache::new();
        let now = fixed_now();
        cache
            .put(token_expiring_at(4, now + Duration::hours(1)), now)
            .await
            .unwrap();
        let entry = cache.get(InstallationId::new(4)).await.unwrap().unwrap();

        assert!(!format!("{:?}", cache).contains("ghs_test_4"));
        assert!(!format!("{:?}", entry).contains("ghs_test_4"));
    }
}
