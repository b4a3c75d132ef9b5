// ABOUTME: Integration tests for the access gate credential resolution
// ABOUTME: Covers precedence, uniform failures, scopes, and rate-limit wiring
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Ledger Gate Contributors

mod common;

use anyhow::Result;
use common::{create_test_api_key, create_test_resources, create_test_user, test_device};
use http::{header::AUTHORIZATION, HeaderMap};
use ledger_gate::errors::ErrorCode;
use ledger_gate::models::AuthMethod;

fn bearer_headers(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, format!("Bearer {token}").parse().unwrap());
    headers
}

fn api_key_headers(key: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("x-api-key", key.parse().unwrap());
    headers
}

#[tokio::test]
async fn test_bearer_token_resolves_to_principal() -> Result<()> {
    let resources = create_test_resources().await?;
    let user = create_test_user(&resources.database).await?;
    let device = resources
        .database
        .upsert_device(user.id, &test_device())
        .await?;
    let envelope = resources
        .token_manager
        .issue_for_device(user.id, device.id)
        .await?;

    let principal = resources
        .gate
        .gate(&bearer_headers(&envelope.access_token), "GET", "/usage", "read")
        .await?;

    assert_eq!(principal.user.id, user.id);
    assert!(matches!(principal.auth_method, AuthMethod::AccessToken { .. }));
    assert!(principal.rate_limit.is_none(), "bearer path is not rate limited");
    Ok(())
}

#[tokio::test]
async fn test_api_key_resolves_and_carries_rate_limit() -> Result<()> {
    let resources = create_test_resources().await?;
    let user = create_test_user(&resources.database).await?;
    let (plaintext, _key) = create_test_api_key(&resources, user.id, "read").await?;

    let principal = resources
        .gate
        .gate(&api_key_headers(&plaintext), "GET", "/usage", "read")
        .await?;

    assert_eq!(principal.user.id, user.id);
    assert!(matches!(principal.auth_method, AuthMethod::ApiKey { .. }));
    let status = principal.rate_limit.expect("api key path carries rate limit");
    assert_eq!(status.current_count, 1);
    Ok(())
}

#[tokio::test]
async fn test_bearer_takes_precedence_over_api_key() -> Result<()> {
    let resources = create_test_resources().await?;
    let user = create_test_user(&resources.database).await?;
    let (plaintext, _key) = create_test_api_key(&resources, user.id, "read").await?;

    // A garbage bearer token plus a valid API key must fail: the bearer
    // header wins and is judged on its own.
    let mut headers = api_key_headers(&plaintext);
    headers.insert(AUTHORIZATION, "Bearer not-a-real-token".parse().unwrap());

    let result = resources.gate.gate(&headers, "GET", "/usage", "read").await;
    assert!(result.is_err());
    assert_eq!(result.unwrap_err().code, ErrorCode::Unauthorized);

    // And the API key was never counted
    let key = resources
        .database
        .get_active_api_key_for_user(user.id)
        .await?
        .unwrap();
    let status = resources.rate_limiter.usage_info(&key).await?;
    assert_eq!(status.current_count, 0);
    Ok(())
}

#[tokio::test]
async fn test_credential_failures_are_uniform() -> Result<()> {
    let resources = create_test_resources().await?;
    let user = create_test_user(&resources.database).await?;
    let (plaintext, _key) = create_test_api_key(&resources, user.id, "read").await?;

    // Revoke the key, then compare the error against an unknown key's
    resources.database.revoke_active_api_keys(user.id).await?;

    let revoked = resources
        .gate
        .gate(&api_key_headers(&plaintext), "GET", "/usage", "read")
        .await
        .unwrap_err();
    let unknown_key = format!("lk_live_{}", "A".repeat(32));
    let unknown = resources
        .gate
        .gate(&api_key_headers(&unknown_key), "GET", "/usage", "read")
        .await
        .unwrap_err();
    let missing = resources
        .gate
        .gate(&HeaderMap::new(), "GET", "/usage", "read")
        .await
        .unwrap_err();

    assert_eq!(revoked.code, ErrorCode::Unauthorized);
    assert_eq!(unknown.code, ErrorCode::Unauthorized);
    assert_eq!(missing.code, ErrorCode::Unauthorized);
    assert_eq!(revoked.message, unknown.message);
    assert_eq!(revoked.message, missing.message);
    Ok(())
}

#[tokio::test]
async fn test_scope_hierarchy_enforced_at_the_gate() -> Result<()> {
    let resources = create_test_resources().await?;
    let user = create_test_user(&resources.database).await?;
    let (read_only, _key) = create_test_api_key(&resources, user.id, "read").await?;

    // read scope satisfies read
    assert!(resources
        .gate
        .gate(&api_key_headers(&read_only), "GET", "/usage", "read")
        .await
        .is_ok());

    // but not write
    let denied = resources
        .gate
        .gate(&api_key_headers(&read_only), "POST", "/api-keys", "write")
        .await
        .unwrap_err();
    assert_eq!(denied.code, ErrorCode::InsufficientScope);
    assert!(denied.message.contains("'write'"));

    // read_write satisfies both
    let (full, _key) = create_test_api_key(&resources, user.id, "read_write").await?;
    assert!(resources
        .gate
        .gate(&api_key_headers(&full), "POST", "/api-keys", "write")
        .await
        .is_ok());
    Ok(())
}

#[tokio::test]
async fn test_denied_request_still_counts_toward_quota() -> Result<()> {
    let resources = create_test_resources().await?;
    let user = create_test_user(&resources.database).await?;
    let (plaintext, key) = create_test_api_key(&resources, user.id, "read").await?;

    // Scope denial happens after the rate limiter has counted the attempt
    let denied = resources
        .gate
        .gate(&api_key_headers(&plaintext), "POST", "/api-keys", "write")
        .await;
    assert!(denied.is_err());

    let status = resources.rate_limiter.usage_info(&key).await?;
    assert_eq!(status.current_count, 1);
    Ok(())
}

#[tokio::test]
async fn test_expired_access_token_is_unauthorized() -> Result<()> {
    let resources = create_test_resources().await?;
    let user = create_test_user(&resources.database).await?;
    let device = resources
        .database
        .upsert_device(user.id, &test_device())
        .await?;

    // An expiry in the past makes the pair dead on arrival
    let expired_manager = ledger_gate::tokens::TokenManager::new(
        std::sync::Arc::clone(&resources.database),
        -60,
        "read_write".to_string(),
    );
    let envelope = expired_manager.issue_for_device(user.id, device.id).await?;

    let result = resources
        .gate
        .gate(&bearer_headers(&envelope.access_token), "GET", "/usage", "read")
        .await;
    assert!(result.is_err());
    assert_eq!(result.unwrap_err().code, ErrorCode::Unauthorized);
    Ok(())
}
