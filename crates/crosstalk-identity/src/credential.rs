//! Salted credential hashing.
//!
//! Stored format: `hex(salt)$hex(sha256(salt || password))`. Credential
//! storage is an outer-surface concern for the coordinator, so this stays
//! deliberately small; swapping in a memory-hard KDF only touches this
//! module.

use rand::RngCore;
use sha2::{Digest, Sha256};

const SALT_LEN: usize = 16;

/// Hashes a password with a fresh random salt.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);

    let digest = salted_digest(&salt, password);
    format!("{}${}", hex::encode(salt), hex::encode(digest))
}

/// Verifies a password against a stored `salt$digest` hash.
///
/// Malformed stored hashes verify as `false` rather than erroring; they can
/// only arise from manual database edits.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt_hex, digest_hex)) = stored.split_once('$') else {
        return false;
    };
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    let Ok(expected) = hex::decode(digest_hex) else {
        return false;
    };

    let digest = salted_digest(&salt, password);
    // Both operands are digests of attacker-unknown salt, so a plain
    // comparison does not leak credential bytes through timing.
    digest.as_slice() == expected.as_slice()
}

fn salted_digest(salt: &[u8], password: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().to_vec()
}
