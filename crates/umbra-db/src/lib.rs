//! # umbra-db
//!
//! SQLite persistence for pool state.
//!
//! - WAL mode, foreign keys on
//! - Timestamps and epoch ids are INTEGER, amounts and per-share values
//!   are decimal TEXT (SQLite integers stop at `i64`)
//! - Schema version stored in `PRAGMA user_version`
//!
//! A snapshot is written in one transaction and replaces whatever was stored
//! before, so a crash never leaves a half-written pool.

pub mod meta;
pub mod migrations;
pub mod schema;
pub mod snapshot;

use std::path::Path;

use rusqlite::Connection;

pub use snapshot::{load_snapshot, load_state, save_snapshot, save_state};

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Database error types.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("ledger: {0}")]
    Ledger(#[from] umbra_ledger::LedgerError),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Open or create the pool database at the given path.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing and dry runs).
pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    Ok(())
}

pub(crate) fn encode_u128(value: u128) -> String {
    value.to_string()
}

pub(crate) fn decode_u128(text: &str) -> Result<u128> {
    text.parse()
        .map_err(|e: std::num::ParseIntError| DbError::Serialization(format!("{text:?}: {e}")))
}

pub(crate) fn encode_u64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| DbError::Serialization(format!("{value} exceeds INTEGER")))
}

pub(crate) fn decode_u64(value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| DbError::Serialization(format!("negative value {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_memory() {
        let conn = open_memory().expect("open in-memory db");
        let version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .expect("get user_version");
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let conn = open_memory().expect("open");
        let fk: i32 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .expect("get foreign_keys");
        assert_eq!(fk, 1);
    }

    #[test]
    fn test_u128_text() {
        assert_eq!(decode_u128(&encode_u128(u128::MAX)).expect("decode"), u128::MAX);
        assert!(matches!(decode_u128("-1"), Err(DbError::Serialization(_))));
    }

    #[test]
    fn test_u64_integer_bounds() {
        assert_eq!(encode_u64(42).expect("encode"), 42);
        assert!(encode_u64(u64::MAX).is_err());
        assert!(decode_u64(-1).is_err());
    }
}
