// ABOUTME: API key storage with transactional replacement and rate counters
// ABOUTME: Keeps at most one active key per user and the fixed-window counts
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Ledger Gate Contributors

use super::Database;
use crate::models::ApiKey;
use anyhow::Result;
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

impl Database {
    /// Create API key and rate counter tables
    pub(super) async fn migrate_api_keys(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS api_keys (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                key_prefix TEXT NOT NULL,
                key_hash TEXT UNIQUE NOT NULL,
                scopes TEXT NOT NULL,
                tier TEXT NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                last_used_at DATETIME,
                created_at DATETIME NOT NULL,
                revoked_at DATETIME
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_api_keys_prefix ON api_keys(key_prefix)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_api_keys_user ON api_keys(user_id)")
            .execute(&self.pool)
            .await?;

        // Fixed-window counters; a row is the attempt count for one key in
        // one window. Old windows are simply abandoned.
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS rate_limit_windows (
                api_key_id TEXT NOT NULL REFERENCES api_keys(id) ON DELETE CASCADE,
                window_start INTEGER NOT NULL,
                count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (api_key_id, window_start)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Replace the user's active API key: revoke every active key and insert
    /// the new one in a single transaction. If the insert fails the revokes
    /// roll back and the user keeps their previous key.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub async fn replace_active_api_key(&self, key: &ApiKey) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            UPDATE api_keys SET is_active = 0, revoked_at = $1
            WHERE user_id = $2 AND is_active = 1
            ",
        )
        .bind(Utc::now())
        .bind(key.user_id.to_string())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
            INSERT INTO api_keys (id, user_id, name, key_prefix, key_hash, scopes,
                                  tier, is_active, last_used_at, created_at, revoked_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ",
        )
        .bind(key.id.to_string())
        .bind(key.user_id.to_string())
        .bind(&key.name)
        .bind(&key.key_prefix)
        .bind(&key.key_hash)
        .bind(&key.scopes)
        .bind(&key.tier)
        .bind(key.is_active)
        .bind(key.last_used_at)
        .bind(key.created_at)
        .bind(key.revoked_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Look up candidate keys by lookup prefix. The caller compares digests
    /// in constant time; the prefix only narrows the search.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn get_api_keys_by_prefix(&self, key_prefix: &str) -> Result<Vec<ApiKey>> {
        let rows = sqlx::query(
            r"
            SELECT id, user_id, name, key_prefix, key_hash, scopes, tier,
                   is_active, last_used_at, created_at, revoked_at
            FROM api_keys WHERE key_prefix = $1
            ",
        )
        .bind(key_prefix)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_api_key).collect()
    }

    /// Get the user's current active key, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn get_active_api_key_for_user(&self, user_id: Uuid) -> Result<Option<ApiKey>> {
        let row = sqlx::query(
            r"
            SELECT id, user_id, name, key_prefix, key_hash, scopes, tier,
                   is_active, last_used_at, created_at, revoked_at
            FROM api_keys WHERE user_id = $1 AND is_active = 1
            ORDER BY created_at DESC LIMIT 1
            ",
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| Self::row_to_api_key(&row)).transpose()
    }

    /// Revoke all of a user's active keys. Returns how many were revoked.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn revoke_active_api_keys(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            r"
            UPDATE api_keys SET is_active = 0, revoked_at = $1
            WHERE user_id = $2 AND is_active = 1
            ",
        )
        .bind(Utc::now())
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Bump a key's last-used timestamp
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn update_api_key_last_used(&self, key_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(key_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Atomically count one attempt against a key's current window and read
    /// the count back. Single statement: concurrent callers can never lose
    /// an update or observe the same count.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub async fn increment_rate_counter(&self, key_id: Uuid, window_start: i64) -> Result<u32> {
        let row = sqlx::query(
            r"
            INSERT INTO rate_limit_windows (api_key_id, window_start, count)
            VALUES ($1, $2, 1)
            ON CONFLICT(api_key_id, window_start) DO UPDATE SET count = count + 1
            RETURNING count
            ",
        )
        .bind(key_id.to_string())
        .bind(window_start)
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = row.get("count");
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    /// Read a window's count without mutating it. Missing row means zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn rate_counter_value(&self, key_id: Uuid, window_start: i64) -> Result<u32> {
        let row = sqlx::query(
            r"
            SELECT count FROM rate_limit_windows
            WHERE api_key_id = $1 AND window_start = $2
            ",
        )
        .bind(key_id.to_string())
        .bind(window_start)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map_or(0, |r| {
            let count: i64 = r.get("count");
            u32::try_from(count).unwrap_or(u32::MAX)
        }))
    }

    fn row_to_api_key(row: &sqlx::sqlite::SqliteRow) -> Result<ApiKey> {
        let id: String = row.get("id");
        let user_id: String = row.get("user_id");
        Ok(ApiKey {
            id: Uuid::parse_str(&id)?,
            user_id: Uuid::parse_str(&user_id)?,
            name: row.get("name"),
            key_prefix: row.get("key_prefix"),
            key_hash: row.get("key_hash"),
            scopes: row.get("scopes"),
            tier: row.get("tier"),
            is_active: row.get("is_active"),
            last_used_at: row.get("last_used_at"),
            created_at: row.get("created_at"),
            revoked_at: row.get("revoked_at"),
        })
    }
}
