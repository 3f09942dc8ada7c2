//! Rate limit tracking for GitHub API operations.
//!
//! GitHub reports rate limits in response headers. This module parses them,
//! recognises GitHub's rate-limit signals on 403 responses, and turns
//! `Retry-After` (or an exhausted window's reset time) into a wait duration.

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

const HEADER_LIMIT: &str = "x-ratelimit-limit";
const HEADER_REMAINING: &str = "x-ratelimit-remaining";
const HEADER_RESET: &str = "x-ratelimit-reset";
const HEADER_RESOURCE: &str = "x-ratelimit-resource";

/// Rate limit information from GitHub API response headers.
///
/// # Examples
///
/// ```
/// use gh_app_token_core::client::RateLimit;
/// use chrono::{Utc, Duration};
///
/// let reset_time = Utc::now() + Duration::hours(1);
/// let rate_limit = RateLimit::new(5000, 4500, reset_time, "core");
///
/// assert!(!rate_limit.is_exhausted());
/// assert_eq!(rate_limit.resource(), "core");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimit {
    limit: u32,
    remaining: u32,
    reset_at: DateTime<Utc>,
    resource: String,
}

impl RateLimit {
    /// Create a new rate limit snapshot.
    pub fn new(
        limit: u32,
        remaining: u32,
        reset_at: DateTime<Utc>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            limit,
            remaining,
            reset_at,
            resource: resource.into(),
        }
    }

    /// Get the maximum number of requests allowed.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Get the number of requests remaining.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Get when the rate limit resets.
    pub fn reset_at(&self) -> DateTime<Utc> {
        self.reset_at
    }

    /// Get the resource this rate limit applies to.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Check if the rate limit is exhausted (no requests remaining).
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Check if remaining requests are at or below `margin` (0.0 to 1.0) of the limit.
    pub fn is_near_exhaustion(&self, margin: f64) -> bool {
        let threshold = (self.limit as f64 * margin) as u32;
        self.remaining <= threshold
    }

    /// Time from `now` until the window resets, zero if already past.
    pub fn time_until_reset(&self, now: DateTime<Utc>) -> Duration {
        (self.reset_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok().map(str::trim)
}

/// Parse rate limit information from HTTP response headers.
///
/// Returns `None` unless `X-RateLimit-Limit`, `X-RateLimit-Remaining` and
/// `X-RateLimit-Reset` are all present and valid. `X-RateLimit-Resource`
/// defaults to `"core"`.
pub fn parse_rate_limit_from_headers(headers: &HeaderMap) -> Option<RateLimit> {
    let limit = header_str(headers, HEADER_LIMIT)?.parse::<u32>().ok()?;
    let remaining = header_str(headers, HEADER_REMAINING)?.parse::<u32>().ok()?;
    let reset = header_str(headers, HEADER_RESET)?.parse::<i64>().ok()?;
    let reset_at = DateTime::from_timestamp(reset, 0)?;
    let resource = header_str(headers, HEADER_RESOURCE).unwrap_or("core");

    Some(RateLimit::new(limit, remaining, reset_at, resource))
}

/// Parse a `Retry-After` header given as delta-seconds or an HTTP date.
///
/// Dates in the past yield a zero wait.
pub fn parse_retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let value = header_str(headers, RETRY_AFTER.as_str())?;

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

/// How long GitHub asks us to wait before trying again, if it said so.
///
/// `Retry-After` wins; otherwise an exhausted rate-limit window yields the
/// time until its reset.
pub fn requested_wait(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    parse_retry_after(headers, now).or_else(|| {
        parse_rate_limit_from_headers(headers)
            .filter(RateLimit::is_exhausted)
            .map(|limit| limit.time_until_reset(now))
    })
}

/// Check whether a response is GitHub's rate-limit signal.
///
/// 429 always is. A 403 is when it carries `X-RateLimit-Remaining: 0` or a
/// `Retry-After` header (secondary rate limits); any other 403 is a
/// permissions failure.
pub fn is_rate_limited(status: u16, headers: &HeaderMap) -> bool {
    match status {
        429 => true,
        403 => {
            header_str(headers, HEADER_REMAINING) == Some("0")
                || headers.contains_key(RETRY_AFTER)
        }
        _ => false,
    }
}

/// Thread-safe record of the latest rate limits seen per resource.
///
/// # Examples
///
/// ```
/// use gh_app_token_core::client::RateLimiter;
///
/// let rate_limiter = RateLimiter::new(0.1); // 10% safety margin
/// assert!(rate_limiter.can_proceed("core"));
/// ```
#[derive(Debug, Clone)]
pub struct RateLimiter {
    limits: Arc<RwLock<HashMap<String, RateLimit>>>,
    margin: f64,
}

impl RateLimiter {
    /// Create a new rate limiter with the specified safety margin (0.0 to 1.0).
    pub fn new(margin: f64) -> Self {
        Self {
            limits: Arc::new(RwLock::new(HashMap::new())),
            margin: margin.clamp(0.0, 1.0),
        }
    }

    /// Record the rate limit carried by a response, if any.
    pub fn update_from_headers(&self, headers: &HeaderMap) -> Option<RateLimit> {
        let rate_limit = parse_rate_limit_from_headers(headers)?;
        if let Ok(mut limits) = self.limits.write() {
            limits.insert(rate_limit.resource().to_string(), rate_limit.clone());
        }
        Some(rate_limit)
    }

    /// False when the last observed window for `resource` is within the margin.
    ///
    /// Unknown resources and windows that have already reset are allowed.
    pub fn can_proceed(&self, resource: &str) -> bool {
        match self.get_limit(resource) {
            Some(limit) if Utc::now() < limit.reset_at() => {
                !limit.is_near_exhaustion(self.margin)
            }
            _ => true,
        }
    }

    /// Latest rate limit observed for `resource`.
    pub fn get_limit(&self, resource: &str) -> Option<RateLimit> {
        self.limits.read().ok()?.get(resource).cloned()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(0.1)
    }
}

#[cfg(test)]
#[path = "rate_limit_tests.rs"]
mod tests;
