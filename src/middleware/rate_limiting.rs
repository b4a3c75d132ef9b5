// ABOUTME: Rate-limit response headers built from a RateLimitStatus
// ABOUTME: Standard X-RateLimit trio plus Retry-After when the quota is spent
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Ledger Gate Contributors

//! # Rate Limit Headers
//!
//! Every response on the API-key path carries the standard rate-limit
//! headers so clients can pace themselves before hitting 429.

use crate::rate_limiting::RateLimitStatus;
use http::{HeaderMap, HeaderValue};

/// HTTP header names for rate limit information
pub mod headers {
    /// Maximum requests allowed in the current window
    pub const X_RATE_LIMIT_LIMIT: &str = "X-RateLimit-Limit";
    /// Remaining requests in the current window
    pub const X_RATE_LIMIT_REMAINING: &str = "X-RateLimit-Remaining";
    /// Unix timestamp when the current window resets
    pub const X_RATE_LIMIT_RESET: &str = "X-RateLimit-Reset";
    /// Seconds until the caller should retry, set on 429 responses
    pub const RETRY_AFTER: &str = "Retry-After";
}

/// Build the rate-limit header map for a response
#[must_use]
pub fn rate_limit_headers(status: &RateLimitStatus) -> HeaderMap {
    let mut map = HeaderMap::new();

    if let Ok(value) = HeaderValue::from_str(&status.limit.to_string()) {
        map.insert(headers::X_RATE_LIMIT_LIMIT, value);
    }
    if let Ok(value) = HeaderValue::from_str(&status.remaining.to_string()) {
        map.insert(headers::X_RATE_LIMIT_REMAINING, value);
    }
    if let Ok(value) = HeaderValue::from_str(&status.reset_at.timestamp().to_string()) {
        map.insert(headers::X_RATE_LIMIT_RESET, value);
    }
    if status.is_rate_limited {
        if let Ok(value) = HeaderValue::from_str(&status.reset_in_seconds().to_string()) {
            map.insert(headers::RETRY_AFTER, value);
        }
    }

    map
}
