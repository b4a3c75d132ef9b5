// ABOUTME: Core domain models for users, devices, token pairs, and API keys
// ABOUTME: Plain data types shared by the storage layer, managers, and routes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Ledger Gate Contributors

//! # Domain Models
//!
//! The entities the gate persists and passes between layers. Secrets never
//! appear here in plaintext: token pairs and API keys carry SHA-256 digests
//! of their secret material, nothing else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered account holder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user identifier
    pub id: Uuid,
    /// Email address (unique)
    pub email: String,
    /// Bcrypt hash of the password
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Hex-encoded TOTP secret; presence means MFA is enabled
    pub otp_secret: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new user with a generated ID
    #[must_use]
    pub fn new(
        email: String,
        password_hash: String,
        first_name: Option<String>,
        last_name: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            password_hash,
            first_name,
            last_name,
            otp_secret: None,
            created_at: Utc::now(),
        }
    }

    /// Whether login requires a TOTP code
    #[must_use]
    pub fn mfa_enabled(&self) -> bool {
        self.otp_secret.is_some()
    }
}

/// Public user summary embedded in token envelopes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        }
    }
}

/// Client-supplied device description, required on signup and login.
/// All fields default to empty so a partial body deserializes and fails
/// validation instead of failing JSON parsing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub device_name: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub os_version: String,
    #[serde(default)]
    pub app_version: String,
}

impl DeviceDescriptor {
    /// All five fields must be present and non-empty
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.device_id.trim().is_empty()
            && !self.device_name.trim().is_empty()
            && !self.platform.trim().is_empty()
            && !self.os_version.trim().is_empty()
            && !self.app_version.trim().is_empty()
    }
}

/// A device registered to a user, unique per (user_id, device_id)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Row identifier
    pub id: Uuid,
    pub user_id: Uuid,
    /// Client-chosen stable device identifier
    pub device_id: String,
    pub device_name: String,
    pub platform: String,
    pub os_version: String,
    pub app_version: String,
    pub last_seen_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Per-device credential client. Created lazily on first token issuance;
/// every token pair is bound to exactly one client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceClient {
    pub id: Uuid,
    /// The device row this client belongs to (unique)
    pub device_pk: Uuid,
    pub created_at: DateTime<Utc>,
}

/// An opaque access/refresh token pair. Only SHA-256 digests of the token
/// values are stored; the plaintext exists only in the issuance response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub id: Uuid,
    pub client_id: Uuid,
    pub user_id: Uuid,
    pub access_token_hash: String,
    pub refresh_token_hash: String,
    /// Space-separated granted scopes
    pub scopes: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Set when superseded by a newer pair or consumed by a refresh
    pub revoked_at: Option<DateTime<Utc>>,
}

impl TokenPair {
    /// Active means not revoked and not past expiry
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }

    /// Granted scopes as a list
    #[must_use]
    pub fn scope_list(&self) -> Vec<String> {
        self.scopes.split_whitespace().map(str::to_string).collect()
    }
}

/// A long-lived API key. The plaintext is `lk_live_` plus 32 random
/// alphanumerics; storage keeps the SHA-256 digest and a lookup prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub user_id: Uuid,
    /// User-chosen label
    pub name: String,
    /// First characters of the plaintext, for indexed lookup
    pub key_prefix: String,
    /// SHA-256 digest of the full plaintext (hex)
    pub key_hash: String,
    /// Space-separated granted scopes
    pub scopes: String,
    /// Rate-limit tier name (resolved against configuration)
    pub tier: String,
    pub is_active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    /// Granted scopes as a list
    #[must_use]
    pub fn scope_list(&self) -> Vec<String> {
        self.scopes.split_whitespace().map(str::to_string).collect()
    }
}

/// How a request authenticated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthMethod {
    /// Opaque bearer access token bound to a device client
    AccessToken { client_id: Uuid },
    /// Long-lived API key
    ApiKey { key_id: Uuid, tier: String },
}

impl AuthMethod {
    /// Short name used in audit log lines
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AccessToken { .. } => "access_token",
            Self::ApiKey { .. } => "api_key",
        }
    }
}

/// The authenticated caller produced by the access gate
#[derive(Debug, Clone)]
pub struct Principal {
    pub user: User,
    pub auth_method: AuthMethod,
    /// Scopes granted to the presented credential
    pub scopes: Vec<String>,
    /// Present for API-key callers; drives the response rate-limit headers
    pub rate_limit: Option<crate::rate_limiting::RateLimitStatus>,
}
