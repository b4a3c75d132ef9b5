// ABOUTME: HTTP route assembly for the gate's public surface
// ABOUTME: Merges the auth, api-key, usage, and health routers into one app
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Ledger Gate Contributors

pub mod api_keys;
pub mod auth;
pub mod health;
pub mod usage;

use crate::context::ServerResources;
use crate::models::Principal;
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::sync::Arc;

/// Assemble the complete application router
pub fn router(resources: Arc<ServerResources>) -> Router {
    Router::new()
        .merge(auth::router())
        .merge(api_keys::router())
        .merge(usage::router())
        .merge(health::router())
        .with_state(resources)
}

/// Attach rate-limit headers to a successful response when the caller
/// authenticated with an API key
pub(crate) fn with_rate_limit_headers(
    principal: &Principal,
    response: impl IntoResponse,
) -> Response {
    let mut response = response.into_response();
    if let Some(status) = &principal.rate_limit {
        response
            .headers_mut()
            .extend(crate::middleware::rate_limiting::rate_limit_headers(status));
    }
    response
}
