// ABOUTME: Secret generation and TOTP verification for the login MFA gate
// ABOUTME: Uses ring for secure randomness and the RFC 6238 HMAC computation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Ledger Gate Contributors

//! # Cryptographic Helpers
//!
//! Secure random secret generation and RFC 6238 TOTP verification. TOTP
//! secrets are stored hex-encoded; verification accepts one time step of
//! clock skew in either direction.

use chrono::{DateTime, Utc};
use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};
use subtle::ConstantTimeEq;

/// TOTP time step in seconds (RFC 6238 default)
const TOTP_STEP_SECONDS: i64 = 30;
/// Accepted clock skew, in steps, in each direction
const TOTP_SKEW_STEPS: i64 = 1;
/// TOTP code length
const TOTP_DIGITS: u32 = 6;

/// Generate a hex-encoded random secret of `len` bytes
///
/// # Errors
///
/// Returns an error if the system RNG fails.
pub fn generate_secret_hex(len: usize) -> anyhow::Result<String> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes)
        .map_err(|_| anyhow::anyhow!("system RNG failure"))?;
    Ok(hex::encode(bytes))
}

/// Compute the TOTP code for a given counter value
fn totp_at(secret: &[u8], counter: u64) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, secret);
    let tag = hmac::sign(&key, &counter.to_be_bytes());
    let digest = tag.as_ref();

    // RFC 4226 dynamic truncation
    let offset = usize::from(digest[digest.len() - 1] & 0x0f);
    let binary = (u32::from(digest[offset] & 0x7f) << 24)
        | (u32::from(digest[offset + 1]) << 16)
        | (u32::from(digest[offset + 2]) << 8)
        | u32::from(digest[offset + 3]);

    let code = binary % 10u32.pow(TOTP_DIGITS);
    format!("{code:06}")
}

/// Current TOTP code for a hex-encoded secret, or `None` if the secret is
/// not valid hex
#[must_use]
pub fn totp_code(secret_hex: &str, now: DateTime<Utc>) -> Option<String> {
    let secret = hex::decode(secret_hex).ok()?;
    let step = now.timestamp() / TOTP_STEP_SECONDS;
    u64::try_from(step).ok().map(|counter| totp_at(&secret, counter))
}

/// Verify a 6-digit TOTP code against a hex-encoded secret at time `now`,
/// allowing one step of skew in either direction.
#[must_use]
pub fn verify_totp(secret_hex: &str, code: &str, now: DateTime<Utc>) -> bool {
    if code.len() != TOTP_DIGITS as usize || !code.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let Ok(secret) = hex::decode(secret_hex) else {
        return false;
    };

    let step = now.timestamp() / TOTP_STEP_SECONDS;
    for skew in -TOTP_SKEW_STEPS..=TOTP_SKEW_STEPS {
        let counter = step + skew;
        if counter < 0 {
            continue;
        }
        #[allow(clippy::cast_sign_loss)]
        let expected = totp_at(&secret, counter as u64);
        if expected.as_bytes().ct_eq(code.as_bytes()).into() {
            return true;
        }
    }
    false
}
