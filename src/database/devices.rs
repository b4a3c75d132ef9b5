// ABOUTME: Device registry storage with atomic upsert on (user_id, device_id)
// ABOUTME: Concurrent first logins from one device converge on a single row
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Ledger Gate Contributors

use super::Database;
use crate::models::{Device, DeviceDescriptor};
use anyhow::Result;
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

impl Database {
    /// Create the devices table
    pub(super) async fn migrate_devices(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS devices (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                device_id TEXT NOT NULL,
                device_name TEXT NOT NULL,
                platform TEXT NOT NULL,
                os_version TEXT NOT NULL,
                app_version TEXT NOT NULL,
                last_seen_at DATETIME NOT NULL,
                created_at DATETIME NOT NULL,
                UNIQUE(user_id, device_id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_devices_user ON devices(user_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Register a device or refresh its metadata. The UNIQUE constraint plus
    /// conflict-update makes this a single atomic statement, so two
    /// concurrent logins from the same device produce one row with the
    /// latest metadata rather than a duplicate or an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    pub async fn upsert_device(
        &self,
        user_id: Uuid,
        descriptor: &DeviceDescriptor,
    ) -> Result<Device> {
        let now = Utc::now();
        let row = sqlx::query(
            r"
            INSERT INTO devices (id, user_id, device_id, device_name, platform,
                                 os_version, app_version, last_seen_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            ON CONFLICT(user_id, device_id) DO UPDATE SET
                device_name = excluded.device_name,
                platform = excluded.platform,
                os_version = excluded.os_version,
                app_version = excluded.app_version,
                last_seen_at = excluded.last_seen_at
            RETURNING id, user_id, device_id, device_name, platform,
                      os_version, app_version, last_seen_at, created_at
            ",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id.to_string())
        .bind(&descriptor.device_id)
        .bind(&descriptor.device_name)
        .bind(&descriptor.platform)
        .bind(&descriptor.os_version)
        .bind(&descriptor.app_version)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_device(&row)
    }

    /// Get a device row by its primary key
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn get_device(&self, device_pk: Uuid) -> Result<Option<Device>> {
        let row = sqlx::query(
            r"
            SELECT id, user_id, device_id, device_name, platform,
                   os_version, app_version, last_seen_at, created_at
            FROM devices WHERE id = $1
            ",
        )
        .bind(device_pk.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| Self::row_to_device(&row)).transpose()
    }

    /// Get a device by its registry key
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn get_device_by_key(
        &self,
        user_id: Uuid,
        device_id: &str,
    ) -> Result<Option<Device>> {
        let row = sqlx::query(
            r"
            SELECT id, user_id, device_id, device_name, platform,
                   os_version, app_version, last_seen_at, created_at
            FROM devices WHERE user_id = $1 AND device_id = $2
            ",
        )
        .bind(user_id.to_string())
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| Self::row_to_device(&row)).transpose()
    }

    /// Bump a device's last-seen timestamp
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn touch_device(&self, device_pk: Uuid) -> Result<()> {
        sqlx::query("UPDATE devices SET last_seen_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(device_pk.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn row_to_device(row: &sqlx::sqlite::SqliteRow) -> Result<Device> {
        let id: String = row.get("id");
        let user_id: String = row.get("user_id");
        Ok(Device {
            id: Uuid::parse_str(&id)?,
            user_id: Uuid::parse_str(&user_id)?,
            device_id: row.get("device_id"),
            device_name: row.get("device_name"),
            platform: row.get("platform"),
            os_version: row.get("os_version"),
            app_version: row.get("app_version"),
            last_seen_at: row.get("last_seen_at"),
            created_at: row.get("created_at"),
        })
    }
}
