// ABOUTME: HTTP-level tests for API key self-service and the usage endpoint
// ABOUTME: Covers single-active replacement, one-time plaintext, and 429 headers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Ledger Gate Contributors

mod common;

use anyhow::Result;
use axum::body::Body;
use axum::Router;
use common::{create_test_database, test_config, test_device, TEST_PASSWORD};
use http::{Request, StatusCode};
use ledger_gate::context::ServerResources;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn test_app() -> Result<(Router, Arc<ServerResources>)> {
    let database = create_test_database().await?;
    let resources = Arc::new(ServerResources::new(database, test_config()));
    Ok((ledger_gate::routes::router(Arc::clone(&resources)), resources))
}

fn request(method: &str, uri: &str, auth: (&str, &str), body: Option<&Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(auth.0, auth.1)
        .header("content-type", "application/json");
    match body {
        Some(v) => builder.body(Body::from(v.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: axum::response::Response) -> Result<Value> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Sign up and return the bearer auth header value
async fn signup_bearer(app: &Router) -> Result<String> {
    let body = json!({
        "email": "owner@example.com",
        "password": TEST_PASSWORD,
        "device": test_device(),
    });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/signup")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let tokens = body_json(response).await?;
    Ok(format!("Bearer {}", tokens["access_token"].as_str().unwrap()))
}

#[tokio::test]
async fn test_create_key_returns_plaintext_exactly_once() -> Result<()> {
    let (app, _resources) = test_app().await?;
    let bearer = signup_bearer(&app).await?;

    let body = json!({ "name": "ci key", "scopes": "read" });
    let response = app
        .clone()
        .oneshot(request("POST", "/api-keys", ("authorization", &bearer), Some(&body)))
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await?;
    let plaintext = created["api_key"].as_str().unwrap();
    assert!(plaintext.starts_with("lk_live_"));
    assert_eq!(created["tier"], "standard");

    // The metadata view never contains the plaintext again
    let response = app
        .oneshot(request("GET", "/api-keys", ("authorization", &bearer), None))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let shown = body_json(response).await?;
    assert!(shown["api_key"].is_null());
    assert_eq!(shown["name"], "ci key");
    assert_eq!(shown["key_prefix"].as_str().unwrap(), &plaintext[..12]);
    Ok(())
}

#[tokio::test]
async fn test_creating_a_second_key_invalidates_the_first() -> Result<()> {
    let (app, _resources) = test_app().await?;
    let bearer = signup_bearer(&app).await?;

    let body = json!({ "name": "first" });
    let response = app
        .clone()
        .oneshot(request("POST", "/api-keys", ("authorization", &bearer), Some(&body)))
        .await?;
    let first = body_json(response).await?;
    let first_key = first["api_key"].as_str().unwrap().to_string();

    // First key works
    let response = app
        .clone()
        .oneshot(request("GET", "/usage", ("x-api-key", &first_key), None))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json!({ "name": "second" });
    let response = app
        .clone()
        .oneshot(request("POST", "/api-keys", ("authorization", &bearer), Some(&body)))
        .await?;
    let second = body_json(response).await?;
    let second_key = second["api_key"].as_str().unwrap().to_string();

    // Replaced key is dead, new key lives
    let response = app
        .clone()
        .oneshot(request("GET", "/usage", ("x-api-key", &first_key), None))
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let response = app
        .oneshot(request("GET", "/usage", ("x-api-key", &second_key), None))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_invalid_tier_rejected_and_old_key_survives() -> Result<()> {
    let (app, _resources) = test_app().await?;
    let bearer = signup_bearer(&app).await?;

    let body = json!({ "name": "good key" });
    let response = app
        .clone()
        .oneshot(request("POST", "/api-keys", ("authorization", &bearer), Some(&body)))
        .await?;
    let created = body_json(response).await?;
    let key = created["api_key"].as_str().unwrap().to_string();

    // A failed creation must not revoke the existing key
    let body = json!({ "name": "bad key", "tier": "galactic" });
    let response = app
        .clone()
        .oneshot(request("POST", "/api-keys", ("authorization", &bearer), Some(&body)))
        .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .oneshot(request("GET", "/usage", ("x-api-key", &key), None))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_revoke_key_then_show_is_not_found() -> Result<()> {
    let (app, _resources) = test_app().await?;
    let bearer = signup_bearer(&app).await?;

    let body = json!({ "name": "doomed" });
    app.clone()
        .oneshot(request("POST", "/api-keys", ("authorization", &bearer), Some(&body)))
        .await?;

    let response = app
        .clone()
        .oneshot(request("DELETE", "/api-keys", ("authorization", &bearer), None))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(request("GET", "/api-keys", ("authorization", &bearer), None))
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Revoking again finds nothing
    let response = app
        .oneshot(request("DELETE", "/api-keys", ("authorization", &bearer), None))
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn test_usage_reports_window_state_with_headers() -> Result<()> {
    let (app, _resources) = test_app().await?;
    let bearer = signup_bearer(&app).await?;

    let body = json!({ "name": "metered" });
    let response = app
        .clone()
        .oneshot(request("POST", "/api-keys", ("authorization", &bearer), Some(&body)))
        .await?;
    let created = body_json(response).await?;
    let key = created["api_key"].as_str().unwrap().to_string();

    let response = app
        .oneshot(request("GET", "/usage", ("x-api-key", &key), None))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("X-RateLimit-Limit").unwrap(),
        "5"
    );
    assert_eq!(
        response.headers().get("X-RateLimit-Remaining").unwrap(),
        "4"
    );
    assert!(response.headers().get("X-RateLimit-Reset").is_some());

    let body = body_json(response).await?;
    assert_eq!(body["rate_limit"]["tier"], "standard");
    assert_eq!(body["rate_limit"]["limit"], 5);
    // The gate counted this very request
    assert_eq!(body["rate_limit"]["current_count"], 1);
    assert_eq!(body["rate_limit"]["remaining"], 4);
    assert_eq!(body["api_key"]["name"], "metered");
    Ok(())
}

#[tokio::test]
async fn test_usage_for_bearer_caller_is_informational() -> Result<()> {
    let (app, _resources) = test_app().await?;
    let bearer = signup_bearer(&app).await?;

    let response = app
        .oneshot(request("GET", "/usage", ("authorization", &bearer), None))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("X-RateLimit-Limit").is_none());

    let body = body_json(response).await?;
    assert_eq!(body["auth_method"], "access_token");
    Ok(())
}

#[tokio::test]
async fn test_exhausted_key_gets_429_with_retry_after() -> Result<()> {
    let (app, _resources) = test_app().await?;
    let bearer = signup_bearer(&app).await?;

    let body = json!({ "name": "busy" });
    let response = app
        .clone()
        .oneshot(request("POST", "/api-keys", ("authorization", &bearer), Some(&body)))
        .await?;
    let created = body_json(response).await?;
    let key = created["api_key"].as_str().unwrap().to_string();

    // Test tier allows 5 per window
    for _ in 0..5 {
        let response = app
            .clone()
            .oneshot(request("GET", "/usage", ("x-api-key", &key), None))
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .oneshot(request("GET", "/usage", ("x-api-key", &key), None))
        .await?;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        response.headers().get("X-RateLimit-Remaining").unwrap(),
        "0"
    );
    assert!(response.headers().get("Retry-After").is_some());

    let body = body_json(response).await?;
    assert_eq!(body["error"], "rate_limit_exceeded");
    Ok(())
}

#[tokio::test]
async fn test_read_only_key_cannot_manage_keys() -> Result<()> {
    let (app, resources) = test_app().await?;
    let user = common::create_test_user(&resources.database).await?;
    let (plaintext, _key) =
        common::create_test_api_key(&resources, user.id, "read").await?;

    let body = json!({ "name": "sneaky" });
    let response = app
        .oneshot(request("POST", "/api-keys", ("x-api-key", &plaintext), Some(&body)))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await?;
    assert_eq!(body["error"], "insufficient_scope");
    Ok(())
}
