// ABOUTME: Invite code storage for gated signup
// ABOUTME: Codes are single-use; claiming is a guarded atomic update
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Ledger Gate Contributors

use super::Database;
use anyhow::Result;
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

impl Database {
    /// Create the invite codes table
    pub(super) async fn migrate_invite_codes(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS invite_codes (
                code TEXT PRIMARY KEY,
                claimed_by TEXT REFERENCES users(id),
                claimed_at DATETIME,
                created_at DATETIME NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a fresh invite code
    ///
    /// # Errors
    ///
    /// Returns an error if the code already exists or the insert fails
    pub async fn create_invite_code(&self, code: &str) -> Result<()> {
        sqlx::query("INSERT INTO invite_codes (code, created_at) VALUES ($1, $2)")
            .bind(code)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Whether a code exists and is still unclaimed
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn invite_code_available(&self, code: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM invite_codes WHERE code = $1 AND claimed_at IS NULL",
        )
        .bind(code)
        .fetch_one(&self.pool)
        .await?;
        let n: i64 = row.get("n");
        Ok(n > 0)
    }

    /// Claim a code for a user. The guarded update makes the claim
    /// single-use under concurrency; `false` means the code was unknown or
    /// already claimed.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn claim_invite_code(&self, code: &str, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE invite_codes SET claimed_by = $1, claimed_at = $2
            WHERE code = $3 AND claimed_at IS NULL
            ",
        )
        .bind(user_id.to_string())
        .bind(Utc::now())
        .bind(code)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
