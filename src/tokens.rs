// ABOUTME: Opaque token pair lifecycle: issuance, rotation, and verification
// ABOUTME: Binds every pair to a per-device client with one active pair at a time
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Ledger Gate Contributors

//! # Token Lifecycle Manager
//!
//! Token pairs are opaque random values, stored only as SHA-256 digests and
//! bound to a per-device client created lazily on first issuance. Issuing a
//! pair revokes the client's previous active pairs in the same transaction,
//! so a client holds at most one live pair. Refresh tokens are single-use:
//! rotation claims the old pair with a guarded update, and the loser of a
//! concurrent double-refresh gets the generic `unauthorized` error.

use crate::database::Database;
use crate::errors::{AppError, AppResult};
use crate::models::TokenPair;
use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

/// Length of generated token plaintexts
const TOKEN_LENGTH: usize = 48;

/// The response body shape for every token issuance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenEnvelope {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Seconds until the access token expires
    pub expires_in: i64,
    /// Issuance time as a Unix timestamp
    pub created_at: i64,
}

/// Manager for issuing and rotating opaque token pairs
#[derive(Clone)]
pub struct TokenManager {
    database: Arc<Database>,
    /// Access token lifetime in seconds
    expiry_seconds: i64,
    /// Scopes granted to issued pairs
    scopes: String,
}

impl TokenManager {
    #[must_use]
    pub fn new(database: Arc<Database>, expiry_seconds: i64, scopes: String) -> Self {
        Self {
            database,
            expiry_seconds,
            scopes,
        }
    }

    /// Generate an opaque token value
    fn generate_token() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect()
    }

    /// SHA-256 digest of a token value, hex-encoded
    #[must_use]
    pub fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn build_pair(
        &self,
        client_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> (TokenPair, String, String) {
        let access_token = Self::generate_token();
        let refresh_token = Self::generate_token();
        let pair = TokenPair {
            id: Uuid::new_v4(),
            client_id,
            user_id,
            access_token_hash: Self::hash_token(&access_token),
            refresh_token_hash: Self::hash_token(&refresh_token),
            scopes: self.scopes.clone(),
            expires_at: now + Duration::seconds(self.expiry_seconds),
            created_at: now,
            revoked_at: None,
        };
        (pair, access_token, refresh_token)
    }

    fn envelope(
        &self,
        access_token: String,
        refresh_token: String,
        created_at: DateTime<Utc>,
    ) -> TokenEnvelope {
        TokenEnvelope {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.expiry_seconds,
            created_at: created_at.timestamp(),
        }
    }

    /// Issue a fresh pair for a device, revoking any prior active pair for
    /// the device's client. Used by both signup and login.
    ///
    /// # Errors
    ///
    /// Returns an internal error if storage fails.
    #[tracing::instrument(skip(self), fields(user_id = %user_id, device_pk = %device_pk))]
    pub async fn issue_for_device(
        &self,
        user_id: Uuid,
        device_pk: Uuid,
    ) -> AppResult<TokenEnvelope> {
        let client = self.database.get_or_create_device_client(device_pk).await?;

        let now = Utc::now();
        let (pair, access_token, refresh_token) = self.build_pair(client.id, user_id, now);

        self.database
            .insert_token_pair_revoking_active(&pair)
            .await?;

        tracing::info!(client_id = %client.id, pair_id = %pair.id, "issued token pair");
        Ok(self.envelope(access_token, refresh_token, now))
    }

    /// Rotate a pair given its refresh token. Single-use: a refresh token
    /// that is unknown, belongs to a revoked pair, or loses a concurrent
    /// rotation race fails with the generic `unauthorized`.
    ///
    /// # Errors
    ///
    /// Returns `unauthorized` for any invalid refresh token, or an internal
    /// error if storage fails.
    #[tracing::instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<TokenEnvelope> {
        let hash = Self::hash_token(refresh_token);
        let old_pair = self
            .database
            .get_token_pair_by_refresh_hash(&hash)
            .await?
            .ok_or_else(AppError::unauthorized)?;

        if old_pair.revoked_at.is_some() {
            tracing::warn!(pair_id = %old_pair.id, "refresh attempted with consumed token");
            return Err(AppError::unauthorized());
        }

        let now = Utc::now();
        let (new_pair, access_token, refresh_token) =
            self.build_pair(old_pair.client_id, old_pair.user_id, now);

        let rotated = self.database.rotate_token_pair(old_pair.id, &new_pair).await?;
        if !rotated {
            // A concurrent refresh consumed the old pair first
            tracing::warn!(pair_id = %old_pair.id, "lost refresh rotation race");
            return Err(AppError::unauthorized());
        }

        // Device visibility bookkeeping; never fails the rotation
        if let Ok(Some(client)) = self.database.get_device_client(old_pair.client_id).await {
            if let Err(e) = self.database.touch_device(client.device_pk).await {
                tracing::debug!("failed to update device last_seen: {e}");
            }
        }

        tracing::info!(
            old_pair_id = %old_pair.id,
            new_pair_id = %new_pair.id,
            "rotated token pair"
        );
        Ok(self.envelope(access_token, refresh_token, now))
    }

    /// Resolve an access token to its active pair. Unknown, revoked, and
    /// expired tokens are indistinguishable to the caller.
    ///
    /// # Errors
    ///
    /// Returns `unauthorized` for any invalid token, or an internal error if
    /// storage fails.
    pub async fn verify_access_token(&self, access_token: &str) -> AppResult<TokenPair> {
        let hash = Self::hash_token(access_token);
        let pair = self
            .database
            .get_token_pair_by_access_hash(&hash)
            .await?
            .ok_or_else(AppError::unauthorized)?;

        if !pair.is_active(Utc::now()) {
            return Err(AppError::unauthorized());
        }
        Ok(pair)
    }
}
