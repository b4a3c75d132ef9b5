// ABOUTME: Unified error handling with standard error codes and HTTP responses
// ABOUTME: Collapses credential failures into the uniform wire-level taxonomy
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Ledger Gate Contributors

//! # Unified Error Handling System
//!
//! Centralized error types for the gate. Credential-resolution failures are
//! deliberately collapsed into a single `unauthorized` code on the wire so a
//! response never reveals whether an identifier was unknown, a secret was
//! wrong, or a credential was revoked or expired.

use crate::rate_limiting::RateLimitStatus;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Standard error codes used throughout the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Credential missing, unknown, revoked, or expired (merged externally)
    #[serde(rename = "unauthorized")]
    Unauthorized,
    /// Authenticated but not permitted (invite gating)
    #[serde(rename = "forbidden")]
    Forbidden,
    /// Credential lacks the scope an endpoint requires
    #[serde(rename = "insufficient_scope")]
    InsufficientScope,
    /// Device descriptor missing or incomplete
    #[serde(rename = "invalid_device_info")]
    InvalidDeviceInfo,
    /// Per-key quota exhausted for the current window
    #[serde(rename = "rate_limit_exceeded")]
    RateLimitExceeded,
    /// Signup or business-rule input failed validation
    #[serde(rename = "validation_failed")]
    ValidationFailed,
    /// Malformed or missing request parameters
    #[serde(rename = "bad_request")]
    BadRequest,
    /// Requested resource does not exist
    #[serde(rename = "record_not_found")]
    RecordNotFound,
    /// Unexpected failure, storage included (details logged server-side only)
    #[serde(rename = "internal_error")]
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden | Self::InsufficientScope => StatusCode::FORBIDDEN,
            Self::InvalidDeviceInfo | Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::ValidationFailed => StatusCode::UNPROCESSABLE_ENTITY,
            Self::RecordNotFound => StatusCode::NOT_FOUND,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Wire-level name serialized into the response body
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::InsufficientScope => "insufficient_scope",
            Self::InvalidDeviceInfo => "invalid_device_info",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::ValidationFailed => "validation_failed",
            Self::BadRequest => "bad_request",
            Self::RecordNotFound => "record_not_found",
            Self::InternalError => "internal_error",
        }
    }
}

/// Unified error type for the application
#[derive(Debug, Error)]
pub struct AppError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable error message (safe for the wire unless internal)
    pub message: String,
    /// Rate-limit state to report via response headers, when applicable
    pub rate_limit: Option<RateLimitStatus>,
    /// Per-field validation messages (422 responses)
    pub validation_errors: Vec<String>,
}

impl AppError {
    /// Create a new `AppError` with the given code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            rate_limit: None,
            validation_errors: Vec::new(),
        }
    }

    /// Attach rate-limit state so the response carries the standard headers
    #[must_use]
    pub fn with_rate_limit(mut self, status: RateLimitStatus) -> Self {
        self.rate_limit = Some(status);
        self
    }

    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    /// Generic credential failure. The message never distinguishes unknown
    /// identifiers from bad secrets or revoked/expired credentials.
    #[must_use]
    pub fn unauthorized() -> Self {
        Self::new(
            ErrorCode::Unauthorized,
            "Access token or API key is invalid, expired, or missing",
        )
    }

    /// Scope denial, naming the scope the endpoint requires
    #[must_use]
    pub fn insufficient_scope(required: &str) -> Self {
        Self::new(
            ErrorCode::InsufficientScope,
            format!("This action requires the '{required}' scope"),
        )
    }

    /// Incomplete device descriptor
    #[must_use]
    pub fn invalid_device_info() -> Self {
        Self::new(
            ErrorCode::InvalidDeviceInfo,
            "Device information is required (device_id, device_name, platform, os_version, app_version)",
        )
    }

    /// Quota exhausted for the current window
    #[must_use]
    pub fn rate_limit_exceeded(status: RateLimitStatus) -> Self {
        Self::new(
            ErrorCode::RateLimitExceeded,
            format!(
                "Rate limit exceeded. Try again in {} seconds.",
                status.reset_in_seconds()
            ),
        )
        .with_rate_limit(status)
    }

    /// Validation failure carrying the collected field errors
    #[must_use]
    pub fn validation_failed(errors: Vec<String>) -> Self {
        let mut err = Self::new(ErrorCode::ValidationFailed, "Validation failed");
        err.validation_errors = errors;
        err
    }

    /// Forbidden action (invite gating)
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    /// Malformed request input
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    /// Resource not found
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::RecordNotFound,
            format!("{} not found", resource.into()),
        )
    }

    /// Internal server error. The message is logged, never sent to the caller.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// HTTP error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.http_status();

        // Internal failures are logged with full context here and surface as
        // an opaque message to the caller.
        let message = if self.code == ErrorCode::InternalError {
            tracing::error!("Internal error: {}", self.message);
            "An internal server error occurred".to_string()
        } else {
            self.message
        };

        let body = ErrorResponse {
            error: self.code.as_str().to_string(),
            message,
            errors: self.validation_errors,
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(rl) = &self.rate_limit {
            response
                .headers_mut()
                .extend(crate::middleware::rate_limiting::rate_limit_headers(rl));
        }
        response
    }
}

/// Storage failures cross the route boundary as opaque internal errors
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::internal(format!("{error:#}"))
    }
}
