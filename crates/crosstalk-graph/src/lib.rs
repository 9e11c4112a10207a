//! Friend graph store for the Crosstalk platform.
//!
//! Maintains the symmetric friend graph and the directed pending-request
//! sets. Edges are stored one row per record side, so `friends(A)` contains
//! B exactly when a `(A, B)` row exists; [`accept_request`] inserts both
//! sides inside a single transaction, making a half-created friendship
//! structurally impossible rather than merely unlikely.
//!
//! Conflicting mutations (duplicate pending request, accept of a consumed
//! request) surface as an `Ok(false)` result, never as an error: the caller
//! reports the failure to the client and moves on.

use rusqlite::{params, Connection};
use serde::Serialize;
use thiserror::Error;

/// Errors that can occur during friend-graph operations.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// A friend as stored on an identity's record: the friend's username and
/// persisted last-seen timestamp. Live presence is a Session Registry
/// concern and is merged in by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FriendRecord {
    pub username: String,
    pub last_seen: String,
}

fn user_exists(conn: &Connection, username: &str) -> Result<bool, GraphError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)",
        [username],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Returns whether a confirmed edge exists on `owner`'s record.
pub fn are_friends(conn: &Connection, owner: &str, friend: &str) -> Result<bool, GraphError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM friend_edges WHERE owner = ?1 AND friend = ?2)",
        params![owner, friend],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Records a pending friend request `from → to`.
///
/// Reports `false` (no state change) when the target does not exist, when
/// an identical request is already pending, or when the two identities are
/// already friends.
pub fn send_request(conn: &Connection, from: &str, to: &str) -> Result<bool, GraphError> {
    if !user_exists(conn, to)? {
        return Ok(false);
    }

    let pending: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM friend_requests WHERE from_user = ?1 AND to_user = ?2)",
        params![from, to],
        |row| row.get(0),
    )?;
    if pending || are_friends(conn, from, to)? {
        return Ok(false);
    }

    conn.execute(
        "INSERT INTO friend_requests (from_user, to_user) VALUES (?1, ?2)",
        params![from, to],
    )?;
    Ok(true)
}

/// Consumes the pending request `from → to` and creates the friendship.
///
/// The request removal and both edge insertions run in one transaction:
/// either the request is consumed and both record sides gain the edge, or
/// nothing changes. Reports `false` when no such pending request exists
/// (already consumed, or never sent).
pub fn accept_request(conn: &mut Connection, to: &str, from: &str) -> Result<bool, GraphError> {
    let tx = conn.transaction()?;

    let consumed = tx.execute(
        "DELETE FROM friend_requests WHERE from_user = ?1 AND to_user = ?2",
        params![from, to],
    )?;
    if consumed == 0 {
        // Nothing to accept; the implicit rollback leaves the graph untouched.
        return Ok(false);
    }

    // OR IGNORE guards against an edge that already exists on one side
    // (e.g. after crossed requests accepted concurrently) without aborting
    // the transaction.
    tx.execute(
        "INSERT OR IGNORE INTO friend_edges (owner, friend) VALUES (?1, ?2)",
        params![to, from],
    )?;
    tx.execute(
        "INSERT OR IGNORE INTO friend_edges (owner, friend) VALUES (?1, ?2)",
        params![from, to],
    )?;

    tx.commit()?;
    Ok(true)
}

/// Removes the pending request `from → to`, if any.
///
/// Reports whether a removal occurred.
pub fn reject_request(conn: &Connection, to: &str, from: &str) -> Result<bool, GraphError> {
    let removed = conn.execute(
        "DELETE FROM friend_requests WHERE from_user = ?1 AND to_user = ?2",
        params![from, to],
    )?;
    Ok(removed > 0)
}

/// Lists the friends on `username`'s record with their persisted last-seen
/// timestamps.
pub fn list_friends(conn: &Connection, username: &str) -> Result<Vec<FriendRecord>, GraphError> {
    let mut stmt = conn.prepare(
        "SELECT u.username, u.last_seen
         FROM friend_edges fe
         JOIN users u ON u.username = fe.friend
         WHERE fe.owner = ?1
         ORDER BY u.username ASC",
    )?;

    let rows = stmt.query_map([username], |row| {
        Ok(FriendRecord {
            username: row.get(0)?,
            last_seen: row.get(1)?,
        })
    })?;

    let mut friends = Vec::new();
    for row in rows {
        friends.push(row?);
    }
    Ok(friends)
}

/// Lists the usernames with a pending request toward `username`, oldest
/// first.
pub fn list_pending_requests(
    conn: &Connection,
    username: &str,
) -> Result<Vec<String>, GraphError> {
    let mut stmt = conn.prepare(
        "SELECT from_user FROM friend_requests WHERE to_user = ?1 ORDER BY id ASC",
    )?;

    let rows = stmt.query_map([username], |row| row.get(0))?;
    let mut requests = Vec::new();
    for row in rows {
        requests.push(row?);
    }
    Ok(requests)
}
