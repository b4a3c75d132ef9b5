// ABOUTME: Self-service API key endpoints: create, inspect, and revoke
// ABOUTME: A user holds at most one active key; creation replaces atomically
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Ledger Gate Contributors

//! # API Key Routes
//!
//! `POST /api-keys` creates a key and revokes the previous active one in the
//! same transaction; if creation fails the user keeps the old key. The
//! plaintext key appears exactly once, in the creation response.

use crate::context::ServerResources;
use crate::errors::{AppError, AppResult};
use crate::models::{ApiKey, Principal};
use crate::routes::with_rate_limit_headers;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateApiKeyRequest {
    #[serde(default)]
    pub name: String,
    /// Requested scopes; defaults to read-only
    pub scopes: Option<String>,
    /// Rate-limit tier; defaults to the configured default tier
    pub tier: Option<String>,
}

/// Key metadata, never the secret
#[derive(Debug, Serialize)]
pub struct ApiKeyMetadata {
    pub id: Uuid,
    pub name: String,
    pub key_prefix: String,
    pub scopes: Vec<String>,
    pub tier: String,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&ApiKey> for ApiKeyMetadata {
    fn from(key: &ApiKey) -> Self {
        Self {
            id: key.id,
            name: key.name.clone(),
            key_prefix: key.key_prefix.clone(),
            scopes: key.scope_list(),
            tier: key.tier.clone(),
            last_used_at: key.last_used_at,
            created_at: key.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateApiKeyResponse {
    /// The plaintext key, shown exactly once
    pub api_key: String,
    #[serde(flatten)]
    pub metadata: ApiKeyMetadata,
}

pub fn router() -> Router<Arc<ServerResources>> {
    Router::new().route(
        "/api-keys",
        post(create_api_key).get(show_api_key).delete(revoke_api_key),
    )
}

/// Create a new key, replacing the current active one
#[tracing::instrument(skip(resources, headers, request))]
async fn create_api_key(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Json(request): Json<CreateApiKeyRequest>,
) -> AppResult<Response> {
    let principal = resources
        .gate
        .gate(&headers, "POST", "/api-keys", crate::scopes::WRITE)
        .await?;

    let key = build_key(&resources, &principal, &request)?;
    let plaintext = resources.api_key_manager.generate_key();

    let stored = ApiKey {
        key_prefix: resources.api_key_manager.extract_key_prefix(&plaintext),
        key_hash: resources.api_key_manager.hash_key(&plaintext),
        ..key
    };
    resources.database.replace_active_api_key(&stored).await?;

    tracing::info!(user_id = %principal.user.id, key_id = %stored.id, "api key created");
    let body = CreateApiKeyResponse {
        api_key: plaintext,
        metadata: ApiKeyMetadata::from(&stored),
    };
    Ok(with_rate_limit_headers(
        &principal,
        (StatusCode::CREATED, Json(body)),
    ))
}

/// Show the current active key's metadata
#[tracing::instrument(skip(resources, headers))]
async fn show_api_key(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let principal = resources
        .gate
        .gate(&headers, "GET", "/api-keys", crate::scopes::READ)
        .await?;

    let key = resources
        .database
        .get_active_api_key_for_user(principal.user.id)
        .await?
        .ok_or_else(|| AppError::not_found("API key"))?;

    Ok(with_rate_limit_headers(
        &principal,
        Json(ApiKeyMetadata::from(&key)),
    ))
}

/// Revoke the current active key
#[tracing::instrument(skip(resources, headers))]
async fn revoke_api_key(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let principal = resources
        .gate
        .gate(&headers, "DELETE", "/api-keys", crate::scopes::WRITE)
        .await?;

    let revoked = resources
        .database
        .revoke_active_api_keys(principal.user.id)
        .await?;
    if revoked == 0 {
        return Err(AppError::not_found("API key"));
    }

    tracing::info!(user_id = %principal.user.id, revoked, "api key revoked");
    let body = serde_json::json!({ "message": "API key revoked" });
    Ok(with_rate_limit_headers(&principal, Json(body)))
}

fn build_key(
    resources: &ServerResources,
    principal: &Principal,
    request: &CreateApiKeyRequest,
) -> AppResult<ApiKey> {
    let mut errors = Vec::new();
    if request.name.trim().is_empty() {
        errors.push("Name can't be blank".to_string());
    }

    let tier = request
        .tier
        .clone()
        .unwrap_or_else(|| resources.config.rate_limit.default_tier.clone());
    if !resources.config.rate_limit.tiers.contains_key(&tier) {
        errors.push(format!(
            "Tier must be one of: {}",
            resources.config.rate_limit.tier_names().join(", ")
        ));
    }

    let scopes = request.scopes.clone().unwrap_or_else(|| "read".to_string());
    let valid_scopes = scopes
        .split_whitespace()
        .all(|s| s == crate::scopes::READ || s == crate::scopes::READ_WRITE);
    if scopes.trim().is_empty() || !valid_scopes {
        errors.push("Scopes must be 'read' or 'read_write'".to_string());
    }

    if !errors.is_empty() {
        return Err(AppError::validation_failed(errors));
    }

    Ok(ApiKey {
        id: Uuid::new_v4(),
        user_id: principal.user.id,
        name: request.name.trim().to_string(),
        key_prefix: String::new(),
        key_hash: String::new(),
        scopes,
        tier,
        is_active: true,
        last_used_at: None,
        created_at: Utc::now(),
        revoked_at: None,
    })
}
