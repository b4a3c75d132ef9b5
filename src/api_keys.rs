// ABOUTME: API key generation, format validation, and digest handling
// ABOUTME: Produces lk_live_ keys and the prefix/hash pair the storage layer keeps
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Ledger Gate Contributors

//! # API Key Management
//!
//! API keys are `lk_live_` plus 32 random alphanumeric characters. Storage
//! never sees the plaintext: lookups use the first 12 characters as an
//! indexed prefix, and verification compares SHA-256 digests in constant
//! time. The plaintext is returned to the user exactly once, at creation.

use crate::errors::{AppError, AppResult};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Prefix identifying a live API key
pub const KEY_PREFIX: &str = "lk_live_";
/// Length of the random portion
const KEY_RANDOM_LENGTH: usize = 32;
/// Characters of the plaintext stored for indexed lookup
const LOOKUP_PREFIX_LENGTH: usize = 12;

/// Manager for API key generation and validation
#[derive(Debug, Clone, Default)]
pub struct ApiKeyManager;

impl ApiKeyManager {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Generate a new API key plaintext
    #[must_use]
    pub fn generate_key(&self) -> String {
        let random: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(KEY_RANDOM_LENGTH)
            .map(char::from)
            .collect();
        format!("{KEY_PREFIX}{random}")
    }

    /// Validate the shape of a presented key before touching storage
    ///
    /// # Errors
    ///
    /// Returns the generic `unauthorized` error on any format mismatch, so
    /// malformed keys are indistinguishable from unknown ones.
    pub fn validate_key_format(&self, key: &str) -> AppResult<()> {
        if !key.starts_with(KEY_PREFIX) {
            return Err(AppError::unauthorized());
        }
        let random = &key[KEY_PREFIX.len()..];
        if random.len() != KEY_RANDOM_LENGTH || !random.bytes().all(|b| b.is_ascii_alphanumeric())
        {
            return Err(AppError::unauthorized());
        }
        Ok(())
    }

    /// Extract the lookup prefix stored alongside the digest
    #[must_use]
    pub fn extract_key_prefix(&self, key: &str) -> String {
        key.chars().take(LOOKUP_PREFIX_LENGTH).collect()
    }

    /// SHA-256 digest of the full plaintext, hex-encoded
    #[must_use]
    pub fn hash_key(&self, key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Constant-time comparison of two hex digests
    #[must_use]
    pub fn digests_match(&self, a: &str, b: &str) -> bool {
        a.as_bytes().ct_eq(b.as_bytes()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys_have_expected_shape() {
        let manager = ApiKeyManager::new();
        let key = manager.generate_key();
        assert!(key.starts_with(KEY_PREFIX));
        assert_eq!(key.len(), KEY_PREFIX.len() + KEY_RANDOM_LENGTH);
        assert!(manager.validate_key_format(&key).is_ok());
    }

    #[test]
    fn test_generated_keys_are_unique() {
        let manager = ApiKeyManager::new();
        let a = manager.generate_key();
        let b = manager.generate_key();
        assert_ne!(a, b);
    }

    #[test]
    fn test_format_validation_rejects_bad_keys() {
        let manager = ApiKeyManager::new();
        assert!(manager.validate_key_format("sk_live_abc").is_err());
        assert!(manager.validate_key_format("lk_live_short").is_err());
        assert!(manager
            .validate_key_format(&format!("{KEY_PREFIX}{}", "!".repeat(32)))
            .is_err());
        assert!(manager.validate_key_format("").is_err());
    }

    #[test]
    fn test_prefix_extraction() {
        let manager = ApiKeyManager::new();
        let key = manager.generate_key();
        let prefix = manager.extract_key_prefix(&key);
        assert_eq!(prefix.len(), 12);
        assert!(key.starts_with(&prefix));
    }

    #[test]
    fn test_hash_is_deterministic_and_hex() {
        let manager = ApiKeyManager::new();
        let key = manager.generate_key();
        let h1 = manager.hash_key(&key);
        let h2 = manager.hash_key(&key);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert!(h1.bytes().all(|b| b.is_ascii_hexdigit()));
        assert!(manager.digests_match(&h1, &h2));
        assert!(!manager.digests_match(&h1, &manager.hash_key("other")));
    }
}
