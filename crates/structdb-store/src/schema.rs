//! SQL schema helpers for the SQLite backing store.
//!
//! Structures own one table each, named from a caller-supplied base name.
//! Tables are created lazily with `CREATE TABLE IF NOT EXISTS`, so
//! constructing a structure with an existing name reattaches to its data.

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

use crate::error::StoreError;

/// Suffix of the NestedMap table holding `owner¤key -> value` rows.
pub const PROPERTIES_MAP_SUFFIX: &str = "_properties_map";

/// Suffix of the NestedMap set of every property key ever written.
pub const ENCOUNTERED_KEYS_SUFFIX: &str = "_encountered_property_keys";

/// Opens (or creates) a SQLite database at `path` with WAL mode.
pub fn open_database(path: &Path, busy_timeout: Duration) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    configure(&conn, busy_timeout)?;
    // WAL lets readers on other connections proceed during a write.
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    tracing::debug!(path = %path.display(), journal_mode = %mode, "opened database");
    Ok(conn)
}

/// Opens a private in-memory SQLite database.
pub fn open_in_memory(busy_timeout: Duration) -> Result<Connection, StoreError> {
    let conn = Connection::open_in_memory()?;
    configure(&conn, busy_timeout)?;
    Ok(conn)
}

fn configure(conn: &Connection, busy_timeout: Duration) -> Result<(), StoreError> {
    conn.busy_timeout(busy_timeout)?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(())
}

/// Quotes `name` as an SQL identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub(crate) fn create_key_value_table(conn: &Connection, table: &str) -> Result<(), StoreError> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
        quote_ident(table)
    ))?;
    Ok(())
}

pub(crate) fn create_set_table(conn: &Connection, table: &str) -> Result<(), StoreError> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} (value TEXT PRIMARY KEY)",
        quote_ident(table)
    ))?;
    Ok(())
}

pub(crate) fn create_list_table(conn: &Connection, table: &str) -> Result<(), StoreError> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} (id INTEGER PRIMARY KEY AUTOINCREMENT, value TEXT NOT NULL)",
        quote_ident(table)
    ))?;
    Ok(())
}

pub(crate) fn clear_table(conn: &Connection, table: &str) -> Result<(), StoreError> {
    conn.execute(&format!("DELETE FROM {}", quote_ident(table)), [])?;
    Ok(())
}

pub(crate) fn drop_table(conn: &Connection, table: &str) -> Result<(), StoreError> {
    conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)))?;
    Ok(())
}

pub(crate) fn count_rows(conn: &Connection, table: &str) -> Result<usize, StoreError> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
        [],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}
