// ABOUTME: Main library entry point for the ledger-gate access-control service
// ABOUTME: Fronts a financial-data API with token, API-key, and rate-limit gating
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Ledger Gate Contributors

#![deny(unsafe_code)]

//! # Ledger Gate
//!
//! An access-control gate in front of a financial-data API. It owns the
//! credentials and the gatekeeping, not the financial domain:
//!
//! - **Opaque token pairs** bound to a per-device client, one active pair
//!   per client, single-use refresh rotation
//! - **API keys** with at most one active key per user, stored only as
//!   SHA-256 digests and verified in constant time
//! - **Hierarchical scopes**: `read_write` subsumes `read`
//! - **Fixed-window rate limiting** on the API-key path with atomic
//!   counters and standard `X-RateLimit-*` headers
//! - **Device registry** keyed on (user, device) with atomic upsert
//!
//! Every credential failure leaves the gate as the same generic
//! `unauthorized` response; callers never learn whether an identifier was
//! unknown, a secret wrong, or a credential revoked.

pub mod api_keys;
pub mod config;
pub mod context;
pub mod crypto;
pub mod database;
pub mod errors;
pub mod logging;
pub mod middleware;
pub mod models;
pub mod rate_limiting;
pub mod routes;
pub mod scopes;
pub mod tokens;
