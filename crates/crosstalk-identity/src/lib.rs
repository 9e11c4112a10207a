//! Identity records for the Crosstalk platform.
//!
//! An identity is a registered username with a hashed credential, a
//! persisted presence flag, a last-seen timestamp, and a preferred
//! language. The coordinator mutates presence and last-seen; identities
//! are created by registration and never deleted here.

mod credential;

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use thiserror::Error;

pub use credential::{hash_password, verify_password};

/// Errors that can occur during identity operations.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// A persisted identity record.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserRecord {
    /// Internal database ID.
    pub id: i64,
    /// Unique username.
    pub username: String,
    /// Salted credential hash. Never serialized to clients.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Persisted presence flag (the live flag lives in the Session Registry).
    pub online_status: bool,
    /// Creation timestamp (ISO 8601).
    pub created_at: String,
    /// Last-seen timestamp (ISO 8601), updated on presence changes.
    pub last_seen: String,
    /// Preferred language tag for the translation pipeline.
    pub preferred_language: String,
}

fn map_row_to_user(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        online_status: row.get(3)?,
        created_at: row.get(4)?,
        last_seen: row.get(5)?,
        preferred_language: row.get(6)?,
    })
}

/// Creates a new identity with a hashed credential.
///
/// Returns `false` without touching the database if the username is
/// already taken.
pub fn create_user(
    conn: &Connection,
    username: &str,
    password: &str,
    preferred_language: &str,
) -> Result<bool, IdentityError> {
    if get_user(conn, username)?.is_some() {
        return Ok(false);
    }

    let hash = hash_password(password);
    conn.execute(
        "INSERT INTO users (username, password_hash, preferred_language)
         VALUES (?1, ?2, ?3)",
        params![username, hash, preferred_language],
    )?;
    Ok(true)
}

/// Retrieves an identity by username.
pub fn get_user(conn: &Connection, username: &str) -> Result<Option<UserRecord>, IdentityError> {
    let user = conn
        .query_row(
            "SELECT id, username, password_hash, online_status, created_at,
                    last_seen, preferred_language
             FROM users WHERE username = ?1",
            [username],
            map_row_to_user,
        )
        .optional()?;
    Ok(user)
}

/// Verifies a username/password pair against the stored credential hash.
///
/// Unknown usernames verify as `false`, indistinguishable from a wrong
/// password.
pub fn verify_credentials(
    conn: &Connection,
    username: &str,
    password: &str,
) -> Result<bool, IdentityError> {
    match get_user(conn, username)? {
        Some(user) => Ok(verify_password(password, &user.password_hash)),
        None => Ok(false),
    }
}

/// Updates the persisted presence flag and stamps `last_seen`.
///
/// Returns `false` if no such user exists. Unknown usernames are not an
/// error: a disconnect for a never-registered identity is a no-op.
pub fn update_online_status(
    conn: &Connection,
    username: &str,
    online: bool,
) -> Result<bool, IdentityError> {
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let changed = conn.execute(
        "UPDATE users SET online_status = ?1, last_seen = ?2 WHERE username = ?3",
        params![online, now, username],
    )?;
    Ok(changed > 0)
}
