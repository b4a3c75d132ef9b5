// ABOUTME: Device client and token pair storage with transactional rotation
// ABOUTME: Enforces at most one active pair per client and single-use refresh
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Ledger Gate Contributors

use super::Database;
use crate::models::{DeviceClient, TokenPair};
use anyhow::Result;
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

impl Database {
    /// Create device client and token pair tables
    pub(super) async fn migrate_tokens(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS device_clients (
                id TEXT PRIMARY KEY,
                device_pk TEXT UNIQUE NOT NULL REFERENCES devices(id) ON DELETE CASCADE,
                created_at DATETIME NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS token_pairs (
                id TEXT PRIMARY KEY,
                client_id TEXT NOT NULL REFERENCES device_clients(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                access_token_hash TEXT UNIQUE NOT NULL,
                refresh_token_hash TEXT UNIQUE NOT NULL,
                scopes TEXT NOT NULL,
                expires_at DATETIME NOT NULL,
                created_at DATETIME NOT NULL,
                revoked_at DATETIME
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_token_pairs_client ON token_pairs(client_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_token_pairs_access ON token_pairs(access_token_hash)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_token_pairs_refresh ON token_pairs(refresh_token_hash)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get the credential client for a device, creating it lazily on first
    /// use. The UNIQUE constraint on device_pk plus conflict-update returns
    /// the existing row under concurrency instead of erroring.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    pub async fn get_or_create_device_client(&self, device_pk: Uuid) -> Result<DeviceClient> {
        let row = sqlx::query(
            r"
            INSERT INTO device_clients (id, device_pk, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT(device_pk) DO UPDATE SET device_pk = excluded.device_pk
            RETURNING id, device_pk, created_at
            ",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(device_pk.to_string())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_client(&row)
    }

    /// Look up a device client by its ID
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn get_device_client(&self, client_id: Uuid) -> Result<Option<DeviceClient>> {
        let row = sqlx::query(
            "SELECT id, device_pk, created_at FROM device_clients WHERE id = $1",
        )
        .bind(client_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| Self::row_to_client(&row)).transpose()
    }

    /// Insert a freshly issued token pair, revoking every active pair for
    /// the same client in the same transaction. Either both effects land or
    /// neither does, so the client never ends up with zero or two active
    /// pairs.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub async fn insert_token_pair_revoking_active(&self, pair: &TokenPair) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE token_pairs SET revoked_at = $1 WHERE client_id = $2 AND revoked_at IS NULL",
        )
        .bind(Utc::now())
        .bind(pair.client_id.to_string())
        .execute(&mut *tx)
        .await?;

        Self::insert_token_pair(&mut tx, pair).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Rotate a token pair: revoke the old pair and insert its replacement
    /// atomically. The revoke is a guarded update; zero rows affected means
    /// a concurrent refresh already consumed the old pair, in which case
    /// nothing is inserted and `false` is returned. Exactly one of two
    /// racing refreshes observes `true`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub async fn rotate_token_pair(&self, old_pair_id: Uuid, new_pair: &TokenPair) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            "UPDATE token_pairs SET revoked_at = $1 WHERE id = $2 AND revoked_at IS NULL",
        )
        .bind(Utc::now())
        .bind(old_pair_id.to_string())
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        Self::insert_token_pair(&mut tx, new_pair).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn insert_token_pair(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        pair: &TokenPair,
    ) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO token_pairs (id, client_id, user_id, access_token_hash,
                                     refresh_token_hash, scopes, expires_at, created_at, revoked_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(pair.id.to_string())
        .bind(pair.client_id.to_string())
        .bind(pair.user_id.to_string())
        .bind(&pair.access_token_hash)
        .bind(&pair.refresh_token_hash)
        .bind(&pair.scopes)
        .bind(pair.expires_at)
        .bind(pair.created_at)
        .bind(pair.revoked_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Look up a token pair by the digest of its access token
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn get_token_pair_by_access_hash(&self, hash: &str) -> Result<Option<TokenPair>> {
        self.get_token_pair_impl("access_token_hash", hash).await
    }

    /// Look up a token pair by the digest of its refresh token
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn get_token_pair_by_refresh_hash(&self, hash: &str) -> Result<Option<TokenPair>> {
        self.get_token_pair_impl("refresh_token_hash", hash).await
    }

    /// Count the active (not revoked, not expired) pairs for a client
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn count_active_token_pairs(&self, client_id: Uuid) -> Result<i64> {
        let row = sqlx::query(
            r"
            SELECT COUNT(*) AS n FROM token_pairs
            WHERE client_id = $1 AND revoked_at IS NULL AND expires_at > $2
            ",
        )
        .bind(client_id.to_string())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("n"))
    }

    async fn get_token_pair_impl(&self, field: &str, value: &str) -> Result<Option<TokenPair>> {
        let query = format!(
            r"
            SELECT id, client_id, user_id, access_token_hash, refresh_token_hash,
                   scopes, expires_at, created_at, revoked_at
            FROM token_pairs WHERE {field} = $1
            "
        );

        let row = sqlx::query(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| Self::row_to_token_pair(&row)).transpose()
    }

    fn row_to_client(row: &sqlx::sqlite::SqliteRow) -> Result<DeviceClient> {
        let id: String = row.get("id");
        let device_pk: String = row.get("device_pk");
        Ok(DeviceClient {
            id: Uuid::parse_str(&id)?,
            device_pk: Uuid::parse_str(&device_pk)?,
            created_at: row.get("created_at"),
        })
    }

    fn row_to_token_pair(row: &sqlx::sqlite::SqliteRow) -> Result<TokenPair> {
        let id: String = row.get("id");
        let client_id: String = row.get("client_id");
        let user_id: String = row.get("user_id");
        Ok(TokenPair {
            id: Uuid::parse_str(&id)?,
            client_id: Uuid::parse_str(&client_id)?,
            user_id: Uuid::parse_str(&user_id)?,
            access_token_hash: row.get("access_token_hash"),
            refresh_token_hash: row.get("refresh_token_hash"),
            scopes: row.get("scopes"),
            expires_at: row.get("expires_at"),
            created_at: row.get("created_at"),
            revoked_at: row.get("revoked_at"),
        })
    }
}
