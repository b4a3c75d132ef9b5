// ABOUTME: Fixed-window rate limiting over the storage-layer atomic counter
// ABOUTME: Computes window boundaries and builds the status reported in headers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Ledger Gate Contributors

//! # Rate Limiting
//!
//! Fixed-window limiting for API-key traffic. The counter key is
//! (api_key_id, window_start) where `window_start = floor(now / window) *
//! window`; crossing a window boundary abandons the old counter outright, it
//! is never carried over or averaged. The increment is a single atomic
//! upsert in the storage layer, so concurrent requests are each counted
//! exactly once. A request that lands over the limit is rejected but its
//! increment stands: the counter reflects true attempted volume.

use crate::config::{RateLimitConfig, TierLimits};
use crate::database::Database;
use crate::errors::{AppError, AppResult};
use crate::models::ApiKey;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Point-in-time rate-limit state for one API key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitStatus {
    /// Whether the current window's quota is exhausted
    pub is_rate_limited: bool,
    /// Requests allowed per window for this key's tier
    pub limit: u32,
    /// Requests counted in the current window (rejections included)
    pub current_count: u32,
    /// Requests left in the current window
    pub remaining: u32,
    /// When the current window ends and the counter resets
    pub reset_at: DateTime<Utc>,
    /// Tier name the limit was resolved from
    pub tier: String,
}

impl RateLimitStatus {
    /// Seconds until the current window resets, clamped at zero
    #[must_use]
    pub fn reset_in_seconds(&self) -> i64 {
        (self.reset_at - Utc::now()).num_seconds().max(0)
    }
}

/// Start of the fixed window containing `now`, as a Unix timestamp
#[must_use]
pub fn window_start(now: DateTime<Utc>, window_seconds: u64) -> i64 {
    let window = i64::try_from(window_seconds).unwrap_or(3600).max(1);
    (now.timestamp() / window) * window
}

/// Fixed-window rate limiter backed by the database counter
#[derive(Clone)]
pub struct RateLimiter {
    database: Arc<Database>,
    config: RateLimitConfig,
}

impl RateLimiter {
    #[must_use]
    pub fn new(database: Arc<Database>, config: RateLimitConfig) -> Self {
        Self { database, config }
    }

    /// Resolve the limits for a key's tier, falling back to the default tier
    fn limits_for(&self, tier: &str) -> TierLimits {
        self.config.limits_for_tier(tier)
    }

    fn status(
        key: &ApiKey,
        limits: &TierLimits,
        count: u32,
        start: i64,
    ) -> RateLimitStatus {
        let reset_ts = start + i64::try_from(limits.window_seconds).unwrap_or(3600);
        let reset_at = Utc
            .timestamp_opt(reset_ts, 0)
            .single()
            .unwrap_or_else(Utc::now);
        RateLimitStatus {
            is_rate_limited: count > limits.requests_per_window,
            limit: limits.requests_per_window,
            current_count: count,
            remaining: limits.requests_per_window.saturating_sub(count),
            reset_at,
            tier: key.tier.clone(),
        }
    }

    /// Count this request and decide whether it may proceed.
    ///
    /// The increment happens unconditionally; a rejected request still
    /// counts toward the window.
    ///
    /// # Errors
    ///
    /// Returns `rate_limit_exceeded` (carrying the status for the response
    /// headers) when the window's quota is exhausted, or an internal error
    /// if the counter update fails.
    pub async fn check_and_increment(&self, key: &ApiKey) -> AppResult<RateLimitStatus> {
        let limits = self.limits_for(&key.tier);
        let start = window_start(Utc::now(), limits.window_seconds);

        let count = self
            .database
            .increment_rate_counter(key.id, start)
            .await?;

        let status = Self::status(key, &limits, count, start);
        if status.is_rate_limited {
            tracing::warn!(
                api_key_id = %key.id,
                tier = %key.tier,
                count,
                limit = limits.requests_per_window,
                "rate limit exceeded"
            );
            return Err(AppError::rate_limit_exceeded(status));
        }
        Ok(status)
    }

    /// Read-only view of the current window. Never mutates the counter.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the counter read fails.
    pub async fn usage_info(&self, key: &ApiKey) -> AppResult<RateLimitStatus> {
        let limits = self.limits_for(&key.tier);
        let start = window_start(Utc::now(), limits.window_seconds);

        let count = self.database.rate_counter_value(key.id, start).await?;
        Ok(Self::status(key, &limits, count, start))
    }
}
