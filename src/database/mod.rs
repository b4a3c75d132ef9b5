// ABOUTME: Database management over SQLite with per-area operation modules
// ABOUTME: Owns the connection pool, runs migrations, exposes storage operations
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Ledger Gate Contributors

//! # Database Management
//!
//! All persistent state behind the gate: users, devices, device clients,
//! token pairs, API keys, rate counters, and invite codes. Operations are
//! grouped per area in submodules, each adding an `impl Database` block and
//! its own `migrate_*` function.

mod api_keys;
mod devices;
mod invite_codes;
mod tokens;
mod users;

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};

/// Database manager for all gate storage
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Create a new database connection and run migrations
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or a migration fails.
    pub async fn new(database_url: &str) -> Result<Self> {
        // Ensure SQLite creates the database file if it doesn't exist
        let connection_options = if database_url.starts_with("sqlite:")
            && !database_url.contains(":memory:")
        {
            format!("{database_url}?mode=rwc")
        } else {
            database_url.to_string()
        };

        // An in-memory SQLite database exists per connection; a pool wider
        // than one would hand out empty databases.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&connection_options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get a reference to the database pool for advanced operations
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Run database migrations
    ///
    /// # Errors
    ///
    /// Returns an error if any table or index creation fails.
    pub async fn migrate(&self) -> Result<()> {
        self.migrate_users().await?;
        self.migrate_devices().await?;
        self.migrate_tokens().await?;
        self.migrate_api_keys().await?;
        self.migrate_invite_codes().await?;
        Ok(())
    }
}
