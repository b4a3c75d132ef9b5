// ABOUTME: Shared server resources threaded through axum router state
// ABOUTME: Wires the database, managers, and gate together once at startup
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Ledger Gate Contributors

//! # Server Resources
//!
//! Everything a handler needs, constructed once at startup and shared via
//! `Arc` through router state.

use crate::api_keys::ApiKeyManager;
use crate::config::ServerConfig;
use crate::database::Database;
use crate::middleware::AccessGate;
use crate::rate_limiting::RateLimiter;
use crate::tokens::TokenManager;
use std::sync::Arc;

/// Shared server state
#[derive(Clone)]
pub struct ServerResources {
    pub database: Arc<Database>,
    pub config: ServerConfig,
    pub api_key_manager: ApiKeyManager,
    pub token_manager: TokenManager,
    pub rate_limiter: RateLimiter,
    pub gate: AccessGate,
}

impl ServerResources {
    /// Build the full resource graph from a connected database and config
    #[must_use]
    pub fn new(database: Arc<Database>, config: ServerConfig) -> Self {
        let token_manager = TokenManager::new(
            Arc::clone(&database),
            config.auth.token_expiry_seconds,
            config.auth.token_scopes.clone(),
        );
        let rate_limiter = RateLimiter::new(Arc::clone(&database), config.rate_limit.clone());
        let gate = AccessGate::new(
            Arc::clone(&database),
            token_manager.clone(),
            rate_limiter.clone(),
            config.rate_limit.enabled,
        );

        Self {
            database,
            config,
            api_key_manager: ApiKeyManager::new(),
            token_manager,
            rate_limiter,
            gate,
        }
    }
}
