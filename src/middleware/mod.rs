// ABOUTME: Request middleware: credential resolution, authorization, rate headers
// ABOUTME: Exposes the AccessGate façade used by every protected route
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Ledger Gate Contributors

pub mod auth;
pub mod rate_limiting;

pub use auth::AccessGate;
