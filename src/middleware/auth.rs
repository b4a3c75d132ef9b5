// ABOUTME: Credential resolution and the AccessGate façade for protected routes
// ABOUTME: Resolves bearer tokens and API keys, then rate-limits and scope-checks
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Ledger Gate Contributors

//! # Access Gate
//!
//! The single entry point protected routes pass through: resolve the
//! credential, enforce the rate limit (API-key callers only), check the
//! required scope, and emit an audit line for the outcome. A `Bearer`
//! authorization header takes precedence over `X-Api-Key` when both are
//! present. Every credential failure leaves as the same generic
//! `unauthorized` error; the distinguishing detail exists only in logs.

use crate::api_keys::ApiKeyManager;
use crate::database::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{ApiKey, AuthMethod, Principal};
use crate::rate_limiting::RateLimiter;
use crate::scopes;
use crate::tokens::TokenManager;
use http::HeaderMap;
use std::sync::Arc;

/// Header carrying an API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Access gate combining credential resolution, rate limiting, and scope
/// authorization
#[derive(Clone)]
pub struct AccessGate {
    database: Arc<Database>,
    api_key_manager: ApiKeyManager,
    token_manager: TokenManager,
    rate_limiter: RateLimiter,
    rate_limit_enabled: bool,
}

impl AccessGate {
    #[must_use]
    pub fn new(
        database: Arc<Database>,
        token_manager: TokenManager,
        rate_limiter: RateLimiter,
        rate_limit_enabled: bool,
    ) -> Self {
        Self {
            database,
            api_key_manager: ApiKeyManager::new(),
            token_manager,
            rate_limiter,
            rate_limit_enabled,
        }
    }

    /// Run the full gate for a request: resolve, rate-limit, authorize.
    ///
    /// # Errors
    ///
    /// Returns `unauthorized` for any credential failure,
    /// `rate_limit_exceeded` when the key's window quota is spent, or
    /// `insufficient_scope` when the credential lacks `required_scope`.
    #[tracing::instrument(
        skip(self, headers),
        fields(
            user_id = tracing::field::Empty,
            auth_method = tracing::field::Empty,
            outcome = tracing::field::Empty,
        )
    )]
    pub async fn gate(
        &self,
        headers: &HeaderMap,
        method: &str,
        path: &str,
        required_scope: &str,
    ) -> AppResult<Principal> {
        let principal = match self.authenticate(headers).await {
            Ok(principal) => principal,
            Err(e) => {
                tracing::Span::current().record("outcome", e.code.as_str());
                self.log_access(method, path, None, None, e.code.as_str());
                return Err(e);
            }
        };

        tracing::Span::current()
            .record("user_id", principal.user.id.to_string())
            .record("auth_method", principal.auth_method.as_str());

        if !scopes::grants(&principal.scopes, required_scope) {
            tracing::Span::current().record("outcome", "insufficient_scope");
            self.log_access(
                method,
                path,
                Some(&principal),
                Some(required_scope),
                "insufficient_scope",
            );
            return Err(AppError::insufficient_scope(required_scope));
        }

        tracing::Span::current().record("outcome", "ok");
        self.log_access(method, path, Some(&principal), Some(required_scope), "ok");
        Ok(principal)
    }

    /// Resolve the request's credential to a `Principal`. Bearer tokens take
    /// precedence over `X-Api-Key`; API-key callers are counted against
    /// their window here, before any scope decision.
    ///
    /// # Errors
    ///
    /// Returns `unauthorized` for any credential failure or
    /// `rate_limit_exceeded` when the quota is spent.
    pub async fn authenticate(&self, headers: &HeaderMap) -> AppResult<Principal> {
        let bearer = headers
            .get(http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "));

        if let Some(token) = bearer {
            return self.authenticate_bearer(token).await;
        }

        let api_key = headers.get(API_KEY_HEADER).and_then(|h| h.to_str().ok());
        if let Some(key) = api_key {
            return self.authenticate_api_key(key).await;
        }

        tracing::debug!("no credential presented");
        Err(AppError::unauthorized())
    }

    async fn authenticate_bearer(&self, token: &str) -> AppResult<Principal> {
        let pair = self.token_manager.verify_access_token(token).await?;

        let user = self
            .database
            .get_user(pair.user_id)
            .await?
            .ok_or_else(AppError::unauthorized)?;

        Ok(Principal {
            scopes: pair.scope_list(),
            auth_method: AuthMethod::AccessToken {
                client_id: pair.client_id,
            },
            user,
            rate_limit: None,
        })
    }

    async fn authenticate_api_key(&self, key: &str) -> AppResult<Principal> {
        self.api_key_manager.validate_key_format(key)?;

        let key_prefix = self.api_key_manager.extract_key_prefix(key);
        let key_hash = self.api_key_manager.hash_key(key);

        let db_key = self
            .lookup_api_key(&key_prefix, &key_hash)
            .await?
            .ok_or_else(|| {
                tracing::debug!(key_prefix = %key_prefix, "api key unknown or inactive");
                AppError::unauthorized()
            })?;

        // Count the attempt before any scope decision; the rejection itself
        // is counted.
        let rate_limit = if self.rate_limit_enabled {
            Some(self.rate_limiter.check_and_increment(&db_key).await?)
        } else {
            None
        };

        // Best-effort visibility bookkeeping; never fails the request
        if let Err(e) = self.database.update_api_key_last_used(db_key.id).await {
            tracing::debug!("failed to update api key last_used: {e}");
        }

        let user = self
            .database
            .get_user(db_key.user_id)
            .await?
            .ok_or_else(AppError::unauthorized)?;

        Ok(Principal {
            scopes: db_key.scope_list(),
            auth_method: AuthMethod::ApiKey {
                key_id: db_key.id,
                tier: db_key.tier,
            },
            user,
            rate_limit,
        })
    }

    /// Find the active key matching a presented plaintext. The prefix only
    /// narrows the candidate set; acceptance requires a constant-time digest
    /// match.
    async fn lookup_api_key(&self, prefix: &str, hash: &str) -> AppResult<Option<ApiKey>> {
        let candidates = self.database.get_api_keys_by_prefix(prefix).await?;
        Ok(candidates.into_iter().find(|candidate| {
            self.api_key_manager.digests_match(&candidate.key_hash, hash)
                && candidate.is_active
                && candidate.revoked_at.is_none()
        }))
    }

    fn log_access(
        &self,
        method: &str,
        path: &str,
        principal: Option<&Principal>,
        required_scope: Option<&str>,
        outcome: &str,
    ) {
        match principal {
            Some(p) => tracing::info!(
                method,
                path,
                user_id = %p.user.id,
                email = %p.user.email,
                auth_method = p.auth_method.as_str(),
                required_scope,
                outcome,
                "api access"
            ),
            None => tracing::info!(method, path, outcome, "api access"),
        }
    }
}
