// ABOUTME: Signup, login, and refresh endpoints issuing device-bound token pairs
// ABOUTME: Enforces device descriptors, password policy, invite gating, and MFA
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Ledger Gate Contributors

//! # Authentication Routes
//!
//! `POST /auth/signup`, `POST /auth/login`, and `POST /auth/refresh`. All
//! three are unauthenticated and all issuance paths require a complete
//! device descriptor, validated before any state is touched. Login failures
//! are uniform: a wrong password and an unknown email produce the same
//! response.

use crate::context::ServerResources;
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::models::{DeviceDescriptor, User, UserSummary};
use crate::tokens::TokenEnvelope;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub invite_code: Option<String>,
    #[serde(default)]
    pub device: DeviceDescriptor,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub otp_code: Option<String>,
    #[serde(default)]
    pub device: DeviceDescriptor,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: String,
}

/// Issuance response: the token envelope plus a public user summary
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    #[serde(flatten)]
    pub token: TokenEnvelope,
    pub user: UserSummary,
}

pub fn router() -> Router<Arc<ServerResources>> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

/// Register a new account and issue its first token pair
#[tracing::instrument(skip(resources, request), fields(email = %request.email))]
async fn signup(
    State(resources): State<Arc<ServerResources>>,
    Json(request): Json<SignupRequest>,
) -> AppResult<Response> {
    if !request.device.is_complete() {
        return Err(AppError::invalid_device_info());
    }

    let mut errors = Vec::new();
    if !is_valid_email(&request.email) {
        errors.push("Email is invalid".to_string());
    }
    errors.extend(password_policy_errors(&request.password));
    if !errors.is_empty() {
        return Err(AppError::validation_failed(errors));
    }

    // Invite gating happens before any row is written
    if resources.config.auth.require_invite_code {
        let code = request
            .invite_code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AppError::forbidden("An invite code is required to sign up"))?;
        if !resources.database.invite_code_available(code).await? {
            return Err(AppError::forbidden("Invalid invite code"));
        }
    }

    if resources
        .database
        .get_user_by_email(&request.email)
        .await?
        .is_some()
    {
        return Err(AppError::validation_failed(vec![
            "Email has already been taken".to_string(),
        ]));
    }

    let password_hash = hash_password(request.password, resources.config.auth.bcrypt_cost).await?;

    let user = User::new(
        request.email,
        password_hash,
        request.first_name,
        request.last_name,
    );
    if let Err(e) = resources.database.create_user(&user).await {
        // Two concurrent signups can race past the pre-check; the UNIQUE
        // constraint settles it.
        if e.to_string().contains("UNIQUE") {
            return Err(AppError::validation_failed(vec![
                "Email has already been taken".to_string(),
            ]));
        }
        return Err(e.into());
    }

    if resources.config.auth.require_invite_code {
        if let Some(code) = request.invite_code.as_deref() {
            if !resources.database.claim_invite_code(code, user.id).await? {
                return Err(AppError::forbidden("Invalid invite code"));
            }
        }
    }

    let device = resources
        .database
        .upsert_device(user.id, &request.device)
        .await?;
    let token = resources
        .token_manager
        .issue_for_device(user.id, device.id)
        .await?;

    tracing::info!(user_id = %user.id, "user signed up");
    let body = TokenResponse {
        token,
        user: UserSummary::from(&user),
    };
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

/// Authenticate with email and password and issue a token pair
#[tracing::instrument(skip(resources, request), fields(email = %request.email))]
async fn login(
    State(resources): State<Arc<ServerResources>>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Response> {
    if !request.device.is_complete() {
        return Err(AppError::invalid_device_info());
    }

    let invalid_credentials =
        || AppError::new(ErrorCode::Unauthorized, "Invalid email or password");

    let user = resources
        .database
        .get_user_by_email(&request.email)
        .await?
        .ok_or_else(invalid_credentials)?;

    let verified = verify_password(request.password, user.password_hash.clone()).await?;
    if !verified {
        tracing::warn!(user_id = %user.id, "login failed: bad password");
        return Err(invalid_credentials());
    }

    if let Some(secret) = &user.otp_secret {
        let otp_ok = request
            .otp_code
            .as_deref()
            .is_some_and(|code| crate::crypto::verify_totp(secret, code, chrono::Utc::now()));
        if !otp_ok {
            tracing::info!(user_id = %user.id, "login requires mfa code");
            return Ok(mfa_required_response());
        }
    }

    let device = resources
        .database
        .upsert_device(user.id, &request.device)
        .await?;
    let token = resources
        .token_manager
        .issue_for_device(user.id, device.id)
        .await?;

    tracing::info!(user_id = %user.id, device_pk = %device.id, "user logged in");
    let body = TokenResponse {
        token,
        user: UserSummary::from(&user),
    };
    Ok(Json(body).into_response())
}

/// Rotate a token pair using its single-use refresh token
#[tracing::instrument(skip_all)]
async fn refresh(
    State(resources): State<Arc<ServerResources>>,
    Json(request): Json<RefreshRequest>,
) -> AppResult<Response> {
    if request.refresh_token.is_empty() {
        return Err(AppError::bad_request("refresh_token is required"));
    }

    let token = resources.token_manager.refresh(&request.refresh_token).await?;
    Ok(Json(token).into_response())
}

/// 401 telling the client to retry the login with a TOTP code
fn mfa_required_response() -> Response {
    let body = serde_json::json!({
        "error": "unauthorized",
        "message": "Two-factor authentication required",
        "mfa_required": true,
    });
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

async fn hash_password(password: String, cost: u32) -> AppResult<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::internal(format!("password hashing task failed: {e}")))?
        .map_err(|e| AppError::internal(format!("password hashing failed: {e}")))
}

async fn verify_password(password: String, hash: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AppError::internal(format!("password verification task failed: {e}")))?
        .map_err(|e| AppError::internal(format!("password verification failed: {e}")))
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

/// Collect every violated password rule so the client can show them all
fn password_policy_errors(password: &str) -> Vec<String> {
    let mut errors = Vec::new();
    if password.len() < 8 {
        errors.push("Password must be at least 8 characters".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push("Password must include at least one uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        errors.push("Password must include at least one lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("Password must include at least one number".to_string());
    }
    if password.chars().all(char::is_alphanumeric) {
        errors.push("Password must include at least one special character".to_string());
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("first.last@sub.example.co"));
        assert!(!is_valid_email("no-at-sign.com"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@nodot"));
        assert!(!is_valid_email("user@.com"));
    }

    #[test]
    fn test_password_policy_accepts_strong_password() {
        assert!(password_policy_errors("Str0ng!pass").is_empty());
    }

    #[test]
    fn test_password_policy_collects_all_violations() {
        let errors = password_policy_errors("abc");
        assert_eq!(errors.len(), 4);

        let errors = password_policy_errors("alllowercase1!");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("uppercase"));
    }
}
