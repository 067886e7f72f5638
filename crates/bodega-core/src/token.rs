//! Digest helpers for reset tokens and legacy password hashes.
//!
//! Plaintext reset tokens leave the store exactly once (on issue). Only
//! their SHA-256 digest is persisted and looked up.

use sha2::{Digest, Sha256};

/// Lower-case hex SHA-256 of `input`.
pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Plaintext form of a reset token: lower-case hex of its random bytes.
pub fn encode_token(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// True when `hash` has the shape of a legacy unsalted SHA-256 digest.
pub fn is_legacy_sha256(hash: &str) -> bool {
    hash.len() == 64 && hash.chars().all(|c| c.is_ascii_hexdigit())
}

/// Compares a password against a legacy SHA-256 hex digest.
pub fn verify_legacy_sha256(password: &str, hash: &str) -> bool {
    sha256_hex(password).eq_ignore_ascii_case(hash)
}
