// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Provides database, config, user, and API key creation helpers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Ledger Gate Contributors
#![allow(dead_code)]

//! Shared test utilities for `ledger_gate` integration tests.

use anyhow::Result;
use ledger_gate::{
    config::{RateLimitConfig, ServerConfig, TierLimits},
    context::ServerResources,
    database::Database,
    models::{ApiKey, DeviceDescriptor, User},
};
use std::sync::{Arc, Once};
use uuid::Uuid;

static INIT_LOGGER: Once = Once::new();

/// Plaintext password used by all test users
pub const TEST_PASSWORD: &str = "Str0ng!pass";

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// Standard in-memory test database
pub async fn create_test_database() -> Result<Arc<Database>> {
    init_test_logging();
    let database = Arc::new(Database::new("sqlite::memory:").await?);
    Ok(database)
}

/// Test configuration: cheap bcrypt, small standard-tier quota
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig {
        http_port: 0,
        database_url: "sqlite::memory:".to_string(),
        logging: ledger_gate::logging::LoggingConfig::default(),
        auth: ledger_gate::config::AuthConfig::default(),
        rate_limit: RateLimitConfig::default(),
    };
    config.auth.bcrypt_cost = 4;
    config.rate_limit.tiers.insert(
        "standard".to_string(),
        TierLimits {
            requests_per_window: 5,
            window_seconds: 3600,
        },
    );
    config
}

/// Full resource graph over an in-memory database
pub async fn create_test_resources() -> Result<Arc<ServerResources>> {
    let database = create_test_database().await?;
    Ok(Arc::new(ServerResources::new(database, test_config())))
}

/// Create a standard test user with the shared test password
pub async fn create_test_user(database: &Database) -> Result<User> {
    create_test_user_with_email(database, "test@example.com").await
}

/// Create a test user with a custom email
pub async fn create_test_user_with_email(database: &Database, email: &str) -> Result<User> {
    let password_hash = bcrypt::hash(TEST_PASSWORD, 4)?;
    let user = User::new(email.to_string(), password_hash, Some("Test".into()), None);
    database.create_user(&user).await?;
    Ok(user)
}

/// Complete device descriptor accepted by signup and login
pub fn test_device() -> DeviceDescriptor {
    DeviceDescriptor {
        device_id: "test-device-1".into(),
        device_name: "Test Phone".into(),
        platform: "ios".into(),
        os_version: "17.4".into(),
        app_version: "1.0.0".into(),
    }
}

/// Create an active API key for a user, returning the plaintext and the row
pub async fn create_test_api_key(
    resources: &ServerResources,
    user_id: Uuid,
    scopes: &str,
) -> Result<(String, ApiKey)> {
    let plaintext = resources.api_key_manager.generate_key();
    let key = ApiKey {
        id: Uuid::new_v4(),
        user_id,
        name: "test key".into(),
        key_prefix: resources.api_key_manager.extract_key_prefix(&plaintext),
        key_hash: resources.api_key_manager.hash_key(&plaintext),
        scopes: scopes.to_string(),
        tier: "standard".into(),
        is_active: true,
        last_used_at: None,
        created_at: chrono::Utc::now(),
        revoked_at: None,
    };
    resources.database.replace_active_api_key(&key).await?;
    Ok((plaintext, key))
}
