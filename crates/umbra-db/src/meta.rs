//! Scalar pool fields in the `pool_meta` key/value table.

use rusqlite::Connection;

use crate::{decode_u128, DbError, Result};

/// Get a value by key.
pub fn get(conn: &Connection, key: &str) -> Result<String> {
    conn.query_row("SELECT value FROM pool_meta WHERE key = ?1", [key], |row| {
        row.get(0)
    })
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => DbError::NotFound(format!("meta '{key}'")),
        other => DbError::Sqlite(other),
    })
}

/// Set a value.
pub fn set(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO pool_meta (key, value) VALUES (?1, ?2)",
        rusqlite::params![key, value],
    )?;
    Ok(())
}

/// Get a value as u128.
pub fn get_u128(conn: &Connection, key: &str) -> Result<u128> {
    decode_u128(&get(conn, key)?)
}

/// Get a value as u64.
pub fn get_u64(conn: &Connection, key: &str) -> Result<u64> {
    get(conn, key)?
        .parse()
        .map_err(|e: std::num::ParseIntError| DbError::Serialization(format!("{key}: {e}")))
}

/// Get a value as a boolean.
pub fn get_bool(conn: &Connection, key: &str) -> Result<bool> {
    Ok(get(conn, key)? == "true")
}
