//! Tests for rate limit parsing and tracking.

use super::*;
use chrono::TimeZone;
use reqwest::header::HeaderValue;

fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        map.insert(*name, HeaderValue::from_str(value).unwrap());
    }
    map
}

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

mod parse_rate_limit_tests {
    use super::*;

    /// Verify all standard headers are parsed.
    #[test]
    fn test_parse_complete_headers() {
        let map = headers(&[
            ("x-ratelimit-limit", "5000"),
            ("x-ratelimit-remaining", "4999"),
            ("x-ratelimit-reset", "1735689600"),
            ("x-ratelimit-resource", "core"),
        ]);

        let limit = parse_rate_limit_from_headers(&map).expect("Should parse");

        assert_eq!(limit.limit(), 5000);
        assert_eq!(limit.remaining(), 4999);
        assert_eq!(limit.reset_at(), fixed_now());
        assert_eq!(limit.resource(), "core");
    }

    /// Verify the resource defaults to core.
    #[test]
    fn test_parse_default_resource() {
        let map = headers(&[
            ("x-ratelimit-limit", "60"),
            ("x-ratelimit-remaining", "0"),
            ("x-ratelimit-reset", "1735689600"),
        ]);

        let limit = parse_rate_limit_from_headers(&map).unwrap();

        assert_eq!(limit.resource(), "core");
        assert!(limit.is_exhausted());
    }

    /// Verify missing or malformed headers yield None.
    #[test]
    fn test_parse_incomplete_headers() {
        assert!(parse_rate_limit_from_headers(&HeaderMap::new()).is_none());
        assert!(parse_rate_limit_from_headers(&headers(&[
            ("x-ratelimit-limit", "5000"),
            ("x-ratelimit-remaining", "many"),
            ("x-ratelimit-reset", "1735689600"),
        ]))
        .is_none());
    }

    /// Verify the near-exhaustion threshold.
    #[test]
    fn test_is_near_exhaustion() {
        let limit = RateLimit::new(5000, 400, fixed_now(), "core");

        assert!(limit.is_near_exhaustion(0.1));
        assert!(!limit.is_near_exhaustion(0.05));
    }
}

mod retry_after_tests {
    use super::*;

    /// Verify delta-seconds values.
    #[test]
    fn test_seconds() {
        let map = headers(&[("retry-after", "30")]);

        assert_eq!(
            parse_retry_after(&map, fixed_now()),
            Some(Duration::from_secs(30))
        );
    }

    /// Verify HTTP-date values are converted relative to now.
    #[test]
    fn test_http_date() {
        let map = headers(&[("retry-after", "Wed, 01 Jan 2025 00:00:45 GMT")]);

        assert_eq!(
            parse_retry_after(&map, fixed_now()),
            Some(Duration::from_secs(45))
        );
    }

    /// Verify past dates give a zero wait.
    #[test]
    fn test_http_date_in_past() {
        let map = headers(&[("retry-after", "Tue, 31 Dec 2024 23:59:00 GMT")]);

        assert_eq!(parse_retry_after(&map, fixed_now()), Some(Duration::ZERO));
    }

    /// Verify garbage is ignored.
    #[test]
    fn test_invalid_value() {
        let map = headers(&[("retry-after", "soon")]);

        assert_eq!(parse_retry_after(&map, fixed_now()), None);
    }

    /// Verify an exhausted window's reset is used when Retry-After is absent.
    #[test]
    fn test_requested_wait_from_reset() {
        let reset = fixed_now().timestamp() + 20;
        let map = headers(&[
            ("x-ratelimit-limit", "5000"),
            ("x-ratelimit-remaining", "0"),
            ("x-ratelimit-reset", &reset.to_string()),
        ]);

        assert_eq!(
            requested_wait(&map, fixed_now()),
            Some(Duration::from_secs(20))
        );
    }

    /// Verify a window with requests left does not request a wait.
    #[test]
    fn test_requested_wait_not_exhausted() {
        let map = headers(&[
            ("x-ratelimit-limit", "5000"),
            ("x-ratelimit-remaining", "10"),
            ("x-ratelimit-reset", "1735689620"),
        ]);

        assert_eq!(requested_wait(&map, fixed_now()), None);
    }
}

mod is_rate_limited_tests {
    use super::*;

    /// Verify 429 is always a rate limit.
    #[test]
    fn test_429() {
        assert!(is_rate_limited(429, &HeaderMap::new()));
    }

    /// Verify 403 with an exhausted window is a rate limit.
    #[test]
    fn test_403_exhausted() {
        let map = headers(&[("x-ratelimit-remaining", "0")]);
        assert!(is_rate_limited(403, &map));
    }

    /// Verify 403 with Retry-After is a secondary rate limit.
    #[test]
    fn test_403_retry_after() {
        let map = headers(&[("retry-after", "60")]);
        assert!(is_rate_limited(403, &map));
    }

    /// Verify a plain 403 is a permissions failure.
    #[test]
    fn test_403_plain() {
        let map = headers(&[("x-ratelimit-remaining", "4000")]);
        assert!(!is_rate_limited(403, &map));
    }

    /// Verify other statuses are never rate limits.
    #[test]
    fn test_other_status() {
        assert!(!is_rate_limited(500, &headers(&[("retry-after", "1")])));
    }
}

mod rate_limiter_tests {
    use super::*;

    /// Verify the limiter records the latest window per resource.
    #[test]
    fn test_update_and_get() {
        let limiter = RateLimiter::new(0.1);
        let map = headers(&[
            ("x-ratelimit-limit", "5000"),
            ("x-ratelimit-remaining", "4321"),
            ("x-ratelimit-reset", "1735689600"),
        ]);

        let recorded = limiter.update_from_headers(&map);

        assert_eq!(recorded.map(|l| l.remaining()), Some(4321));
        assert_eq!(limiter.get_limit("core").map(|l| l.remaining()), Some(4321));
        assert!(limiter.get_limit("search").is_none());
    }

    /// Verify a window inside the margin blocks until it resets.
    #[test]
    fn test_can_proceed() {
        let limiter = RateLimiter::new(0.1);
        let reset = (Utc::now() + chrono::Duration::hours(1)).timestamp();
        let map = headers(&[
            ("x-ratelimit-limit", "5000"),
            ("x-ratelimit-remaining", "10"),
            ("x-ratelimit-reset", &reset.to_string()),
        ]);
        limiter.update_from_headers(&map);

        assert!(!limiter.can_proceed("core"));
        assert!(limiter.can_proceed("graphql"));
    }

    /// Verify an already reset window no longer blocks.
    #[test]
    fn test_can_proceed_after_reset() {
        let limiter = RateLimiter::new(0.1);
        let map = headers(&[
            ("x-ratelimit-limit", "5000"),
            ("x-ratelimit-remaining", "0"),
            ("x-ratelimit-reset", "1735689600"),
        ]);
        limiter.update_from_headers(&map);

        assert!(limiter.can_proceed("core"));
    }
}
