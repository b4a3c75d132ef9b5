// ABOUTME: Environment-driven server configuration with typed sub-configs
// ABOUTME: Resolves ports, database URL, auth policy, and per-tier rate limits
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Ledger Gate Contributors

//! # Server Configuration
//!
//! All runtime configuration comes from environment variables with sensible
//! defaults. Tier quotas are injectable: `RATE_LIMIT_<TIER>_LIMIT` and
//! `RATE_LIMIT_<TIER>_WINDOW_SECONDS` override the built-in defaults, and
//! unknown tier names on stored keys fall back to the default tier.

use crate::logging::{LogFormat, LoggingConfig};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::str::FromStr;

/// Built-in tiers and their default quotas (requests, window seconds)
const DEFAULT_TIERS: &[(&str, u32, u64)] = &[
    ("standard", 100, 3600),
    ("professional", 1000, 3600),
    ("enterprise", 10000, 3600),
];

/// Token lifetime default: 30 days
const DEFAULT_TOKEN_EXPIRY_SECONDS: i64 = 30 * 24 * 3600;

/// Complete server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP server port
    pub http_port: u16,
    /// Database connection URL
    pub database_url: String,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Authentication and signup policy
    pub auth: AuthConfig,
    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,
}

/// Authentication and signup policy
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Lifetime of issued access tokens, in seconds
    pub token_expiry_seconds: i64,
    /// Whether signup requires a valid invite code
    pub require_invite_code: bool,
    /// Bcrypt work factor for password hashing
    pub bcrypt_cost: u32,
    /// Scopes granted to device token pairs
    pub token_scopes: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_expiry_seconds: DEFAULT_TOKEN_EXPIRY_SECONDS,
            require_invite_code: false,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            token_scopes: "read_write".to_string(),
        }
    }
}

/// Per-tier quota
#[derive(Debug, Clone, Copy)]
pub struct TierLimits {
    /// Requests allowed per window
    pub requests_per_window: u32,
    /// Window length in seconds
    pub window_seconds: u64,
}

/// Rate limiting configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Master switch; disabled skips enforcement entirely
    pub enabled: bool,
    /// Tier assigned to newly created keys and used for unknown tier names
    pub default_tier: String,
    /// Tier name to quota
    pub tiers: HashMap<String, TierLimits>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let tiers = DEFAULT_TIERS
            .iter()
            .map(|&(name, requests, window)| {
                (
                    name.to_string(),
                    TierLimits {
                        requests_per_window: requests,
                        window_seconds: window,
                    },
                )
            })
            .collect();
        Self {
            enabled: true,
            default_tier: "standard".to_string(),
            tiers,
        }
    }
}

impl RateLimitConfig {
    /// Quota for a tier name, falling back to the default tier. The default
    /// tier is guaranteed present, so a final hard fallback covers only a
    /// misconfigured map.
    #[must_use]
    pub fn limits_for_tier(&self, tier: &str) -> TierLimits {
        self.tiers
            .get(tier)
            .or_else(|| self.tiers.get(&self.default_tier))
            .copied()
            .unwrap_or(TierLimits {
                requests_per_window: 100,
                window_seconds: 3600,
            })
    }

    /// Names of all configured tiers
    #[must_use]
    pub fn tier_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tiers.keys().cloned().collect();
        names.sort();
        names
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a present variable fails to parse.
    pub fn from_env() -> Result<Self> {
        let rate_limit = Self::rate_limit_from_env()?;

        Ok(Self {
            http_port: parse_env_or("HTTP_PORT", 8081)?,
            database_url: env_var_or("DATABASE_URL", "sqlite:data/ledger_gate.db"),
            logging: LoggingConfig {
                level: env_var_or("LOG_LEVEL", "info"),
                format: LogFormat::from_str(&env_var_or("LOG_FORMAT", "pretty"))?,
            },
            auth: AuthConfig {
                token_expiry_seconds: parse_env_or(
                    "TOKEN_EXPIRY_SECONDS",
                    DEFAULT_TOKEN_EXPIRY_SECONDS,
                )?,
                require_invite_code: parse_env_or("REQUIRE_INVITE_CODE", false)?,
                bcrypt_cost: parse_env_or("BCRYPT_COST", bcrypt::DEFAULT_COST)?,
                token_scopes: env_var_or("TOKEN_SCOPES", "read_write"),
            },
            rate_limit,
        })
    }

    fn rate_limit_from_env() -> Result<RateLimitConfig> {
        let mut config = RateLimitConfig {
            enabled: parse_env_or("RATE_LIMIT_ENABLED", true)?,
            default_tier: env_var_or("RATE_LIMIT_DEFAULT_TIER", "standard"),
            ..RateLimitConfig::default()
        };

        for &(name, default_requests, default_window) in DEFAULT_TIERS {
            let upper = name.to_uppercase();
            let limits = TierLimits {
                requests_per_window: parse_env_or(
                    &format!("RATE_LIMIT_{upper}_LIMIT"),
                    default_requests,
                )?,
                window_seconds: parse_env_or(
                    &format!("RATE_LIMIT_{upper}_WINDOW_SECONDS"),
                    default_window,
                )?,
            };
            config.tiers.insert(name.to_string(), limits);
        }

        anyhow::ensure!(
            config.tiers.contains_key(&config.default_tier),
            "RATE_LIMIT_DEFAULT_TIER '{}' is not a configured tier",
            config.default_tier
        );
        Ok(config)
    }
}

/// Read an environment variable with a fallback
fn env_var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read and parse an environment variable with a fallback
fn parse_env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("invalid value for {key}: {value}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_defaults_without_env() {
        std::env::remove_var("HTTP_PORT");
        std::env::remove_var("RATE_LIMIT_STANDARD_LIMIT");
        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.http_port, 8081);
        assert!(config.rate_limit.enabled);
        assert_eq!(config.rate_limit.default_tier, "standard");
        let standard = config.rate_limit.limits_for_tier("standard");
        assert_eq!(standard.requests_per_window, 100);
        assert_eq!(standard.window_seconds, 3600);
    }

    #[test]
    #[serial]
    fn test_tier_quota_override_from_env() {
        std::env::set_var("RATE_LIMIT_PROFESSIONAL_LIMIT", "2500");
        std::env::set_var("RATE_LIMIT_PROFESSIONAL_WINDOW_SECONDS", "60");
        let config = ServerConfig::from_env().unwrap();
        let pro = config.rate_limit.limits_for_tier("professional");
        assert_eq!(pro.requests_per_window, 2500);
        assert_eq!(pro.window_seconds, 60);
        std::env::remove_var("RATE_LIMIT_PROFESSIONAL_LIMIT");
        std::env::remove_var("RATE_LIMIT_PROFESSIONAL_WINDOW_SECONDS");
    }

    #[test]
    #[serial]
    fn test_unknown_tier_falls_back_to_default() {
        let config = RateLimitConfig::default();
        let fallback = config.limits_for_tier("no_such_tier");
        let standard = config.limits_for_tier("standard");
        assert_eq!(
            fallback.requests_per_window,
            standard.requests_per_window
        );
    }

    #[test]
    #[serial]
    fn test_invalid_port_is_an_error() {
        std::env::set_var("HTTP_PORT", "not-a-port");
        assert!(ServerConfig::from_env().is_err());
        std::env::remove_var("HTTP_PORT");
    }
}
