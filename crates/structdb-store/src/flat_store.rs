//! Single-table key/value store.
//!
//! [`FlatStore`] is an upserting `key -> value` table. Reads of a missing
//! key fail with [`StoreError::NotFound`], so an absent key is never confused
//! with a key holding the empty string.
//!
//! `set`, `get` and `del` have `*_in` variants taking a [`Transaction`].
//! Those variants leave commit and rollback to the caller.

use rusqlite::{params, Connection, OptionalExtension};

use crate::codec;
use crate::error::StoreError;
use crate::host::Host;
use crate::schema::{self, quote_ident};
use crate::transaction::Transaction;

#[derive(Debug, Clone)]
pub struct FlatStore {
    host: Host,
    table: String,
}

impl FlatStore {
    /// Binds to the table `name`, creating it if needed.
    pub fn new(host: &Host, name: &str) -> Result<Self, StoreError> {
        schema::create_key_value_table(&*host.lock()?, name)?;
        Ok(FlatStore {
            host: host.clone(),
            table: name.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.set_with(&*self.host.lock()?, key, value)
    }

    pub fn set_in(&self, tx: &Transaction<'_>, key: &str, value: &str) -> Result<(), StoreError> {
        self.set_with(tx, key, value)
    }

    pub fn get(&self, key: &str) -> Result<String, StoreError> {
        self.get_with(&*self.host.lock()?, key)
    }

    pub fn get_in(&self, tx: &Transaction<'_>, key: &str) -> Result<String, StoreError> {
        self.get_with(tx, key)
    }

    /// True if `key` is present, whatever its value.
    pub fn contains(&self, key: &str) -> Result<bool, StoreError> {
        match self.get(key) {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Deletes `key`. Deleting a missing key is a no-op.
    pub fn del(&self, key: &str) -> Result<(), StoreError> {
        self.del_with(&*self.host.lock()?, key)
    }

    pub fn del_in(&self, tx: &Transaction<'_>, key: &str) -> Result<(), StoreError> {
        self.del_with(tx, key)
    }

    /// Increments the integer stored at `key` and returns the new value. A
    /// missing key counts as 0. Safe against concurrent increments from
    /// other connections on the same file.
    pub fn inc(&self, key: &str) -> Result<i64, StoreError> {
        self.host.run_immediate(|tx| {
            let current = match self.get_with(tx, key) {
                Ok(value) => value.trim().parse::<i64>().map_err(|_| StoreError::Validation {
                    reason: format!("value at {key:?} is not an integer: {value:?}"),
                })?,
                Err(err) if err.is_not_found() => 0,
                Err(err) => return Err(err),
            };
            let next = current.checked_add(1).ok_or_else(|| StoreError::Validation {
                reason: format!("value at {key:?} overflows"),
            })?;
            self.set_with(tx, key, &next.to_string())?;
            Ok(next)
        })
    }

    /// All keys, in no particular order.
    pub fn all(&self) -> Result<Vec<String>, StoreError> {
        self.all_with(&*self.host.lock()?)
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        schema::count_rows(&*self.host.lock()?, &self.table)
    }

    /// Deletes every row, keeping the table.
    pub fn clear(&self) -> Result<(), StoreError> {
        schema::clear_table(&*self.host.lock()?, &self.table)
    }

    /// Drops the table.
    pub fn remove(self) -> Result<(), StoreError> {
        let conn = self.host.lock()?;
        schema::drop_table(&conn, &self.table)
    }

    // -----------------------------------------------------------------------
    // Connection-level helpers, shared by the locking and `*_in` variants
    // -----------------------------------------------------------------------

    pub(crate) fn set_with(&self, conn: &Connection, key: &str, value: &str) -> Result<(), StoreError> {
        let stored = codec::for_storage(self.host.raw_utf8(), value);
        let mut stmt = conn.prepare_cached(&format!(
            "INSERT INTO {} (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            quote_ident(&self.table)
        ))?;
        stmt.execute(params![key, stored])?;
        Ok(())
    }

    pub(crate) fn get_with(&self, conn: &Connection, key: &str) -> Result<String, StoreError> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT value FROM {} WHERE key = ?1",
            quote_ident(&self.table)
        ))?;
        let stored: Option<String> = stmt.query_row(params![key], |row| row.get(0)).optional()?;
        match stored {
            Some(stored) => codec::from_storage(self.host.raw_utf8(), &self.table, stored),
            None => Err(StoreError::not_found(&self.table, key)),
        }
    }

    pub(crate) fn del_with(&self, conn: &Connection, key: &str) -> Result<(), StoreError> {
        let mut stmt = conn.prepare_cached(&format!(
            "DELETE FROM {} WHERE key = ?1",
            quote_ident(&self.table)
        ))?;
        stmt.execute(params![key])?;
        Ok(())
    }

    pub(crate) fn all_with(&self, conn: &Connection) -> Result<Vec<String>, StoreError> {
        let mut stmt = conn.prepare_cached(&format!("SELECT key FROM {}", quote_ident(&self.table)))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }
}
