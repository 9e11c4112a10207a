//! SQLite connection pooling.
//!
//! One coordinator process owns the database file, so pooling is about
//! bounded reuse, not contention across processes. Every connection is
//! prepared before it is handed out: WAL journaling (presence writes
//! interleave with friend-list reads), enforced foreign keys (the friend
//! graph references `users` rows), and a busy timeout so a blocked writer
//! waits instead of failing.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};
use thiserror::Error;

/// A pooled set of SQLite handles.
pub type DbPool = Pool<SqliteConnectionManager>;

/// Per-connection tunables, fed from the server's `[database]` config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// How long a connection waits on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,

    /// Upper bound on pooled connections.
    pub pool_max_size: u32,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 8,
        }
    }
}

/// Errors that can occur when creating the database pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Failed to build the connection pool.
    #[error("failed to create database connection pool: {0}")]
    PoolInit(#[from] r2d2::Error),
}

/// Prepares a fresh connection: WAL journaling, foreign keys, busy timeout.
///
/// Runs once per connection the pool opens. A file database that refuses
/// WAL is a hard error; in-memory databases report "memory" and keep no
/// journal, which is fine for tests.
fn initialize_connection(conn: &Connection, busy_timeout_ms: u64) -> rusqlite::Result<()> {
    let journal_mode: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
    if !matches!(journal_mode.as_str(), "wal" | "memory") {
        return Err(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
            Some(format!("WAL journal mode refused, got: {}", journal_mode)),
        ));
    }

    conn.execute_batch(&format!(
        "PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = {};",
        busy_timeout_ms
    ))
}

/// Creates the SQLite connection pool for the coordinator.
///
/// `db_path` may be `:memory:` for tests; note that each pooled connection
/// then gets its own private database, so multi-connection tests want a
/// file path instead.
///
/// # Errors
///
/// Returns `PoolError::PoolInit` if the pool cannot be built.
pub fn create_pool(db_path: &str, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    let manager = SqliteConnectionManager::file(db_path)
        .with_flags(
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )
        .with_init(move |conn| initialize_connection(conn, settings.busy_timeout_ms));

    let pool = Pool::builder()
        .max_size(settings.pool_max_size)
        .build(manager)?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tempfile_path() -> String {
        let file = tempfile::NamedTempFile::new().expect("tempfile creation failed");
        let path = file.path().to_str().expect("utf-8 path").to_string();
        std::mem::forget(file);
        path
    }

    #[test]
    fn file_backed_pool_lands_in_wal_with_configured_settings() {
        let path = tempfile_path();
        let settings = DbRuntimeSettings {
            busy_timeout_ms: 1_250,
            pool_max_size: 2,
        };

        let pool = create_pool(&path, settings).expect("pool creation failed");
        assert_eq!(pool.max_size(), 2);

        let conn = pool.get().expect("connection checkout failed");
        let mode: String = conn
            .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
            .expect("journal_mode query failed");
        assert_eq!(mode, "wal", "file databases must journal in WAL mode");

        let busy_timeout: i64 = conn
            .query_row("PRAGMA busy_timeout;", [], |row| row.get(0))
            .expect("busy_timeout query failed");
        assert_eq!(busy_timeout, 1_250);
    }

    #[test]
    fn pooled_connections_enforce_the_friend_graph_references() {
        let path = tempfile_path();
        let pool = create_pool(&path, DbRuntimeSettings::default()).expect("pool creation failed");

        let conn = pool.get().expect("connection checkout failed");
        crate::run_migrations(&conn).expect("migrations failed");

        // No such users exist, so the edge row must be refused.
        let result = conn.execute(
            "INSERT INTO friend_edges (owner, friend) VALUES ('ghost', 'phantom')",
            [],
        );
        assert!(result.is_err(), "orphan edge must violate the users reference");
    }

    #[test]
    fn every_checkout_sees_the_same_initialized_state() {
        let path = tempfile_path();
        let pool = create_pool(&path, DbRuntimeSettings::default()).expect("pool creation failed");

        // Two live checkouts force two distinct underlying connections.
        let first = pool.get().expect("first checkout failed");
        let second = pool.get().expect("second checkout failed");

        for conn in [&first, &second] {
            let fk: i64 = conn
                .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
                .expect("foreign_keys query failed");
            assert_eq!(fk, 1, "foreign keys must be on for every connection");
        }
    }
}
