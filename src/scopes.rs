// ABOUTME: Pure scope authorization with hierarchical read/read_write semantics
// ABOUTME: Decides whether a credential's granted scopes satisfy a required scope
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Ledger Gate Contributors

//! # Scope Authorizer
//!
//! A pure decision: does a set of granted scopes satisfy a required scope?
//! `read_write` subsumes `read`; `write` is only satisfied by `read_write`;
//! any other scope name requires exact membership. No I/O, no clock, no
//! state, so callers can rely on it being cheap and deterministic.

/// Scope that grants read-only access
pub const READ: &str = "read";
/// Scope that grants both read and write access
pub const READ_WRITE: &str = "read_write";
/// Virtual requirement satisfied only by `read_write`
pub const WRITE: &str = "write";

/// Whether `granted` satisfies the `required` scope.
///
/// An empty grant set satisfies nothing, including an empty requirement.
#[must_use]
pub fn grants<S: AsRef<str>>(granted: &[S], required: &str) -> bool {
    let has = |scope: &str| granted.iter().any(|g| g.as_ref() == scope);

    match required {
        READ => has(READ) || has(READ_WRITE),
        WRITE => has(READ_WRITE),
        other => !other.is_empty() && has(other),
    }
}
