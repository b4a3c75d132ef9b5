// ABOUTME: Usage reporting endpoint for API-key and bearer callers
// ABOUTME: Reports tier, window quota, current count, and reset time per key
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Ledger Gate Contributors

//! # Usage Route
//!
//! `GET /usage`. API-key callers see their key metadata and current window
//! state (the read never increments the counter, though the gate has already
//! counted this request). Bearer callers are not rate limited and get an
//! informational body instead.

use crate::context::ServerResources;
use crate::errors::{AppError, AppResult};
use crate::models::AuthMethod;
use crate::routes::with_rate_limit_headers;
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use http::HeaderMap;
use std::sync::Arc;

pub fn router() -> Router<Arc<ServerResources>> {
    Router::new().route("/usage", get(usage))
}

#[tracing::instrument(skip(resources, headers))]
async fn usage(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let principal = resources
        .gate
        .gate(&headers, "GET", "/usage", crate::scopes::READ)
        .await?;

    let body = match &principal.auth_method {
        AuthMethod::ApiKey { key_id, .. } => {
            let key = resources
                .database
                .get_active_api_key_for_user(principal.user.id)
                .await?
                .filter(|k| k.id == *key_id)
                .ok_or_else(|| AppError::not_found("API key"))?;

            let status = resources.rate_limiter.usage_info(&key).await?;
            serde_json::json!({
                "api_key": {
                    "name": key.name,
                    "scopes": key.scope_list(),
                    "last_used_at": key.last_used_at,
                    "created_at": key.created_at,
                },
                "rate_limit": {
                    "tier": status.tier,
                    "limit": status.limit,
                    "current_count": status.current_count,
                    "remaining": status.remaining,
                    "reset_at": status.reset_at,
                    "reset_in_seconds": status.reset_in_seconds(),
                },
            })
        }
        AuthMethod::AccessToken { .. } => serde_json::json!({
            "auth_method": "access_token",
            "message": "Access-token requests are not rate limited; usage applies to API keys only",
        }),
    };

    Ok(with_rate_limit_headers(&principal, Json(body)))
}
