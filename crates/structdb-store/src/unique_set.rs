//! Single-table set of distinct strings.

use rusqlite::{params, Connection, OptionalExtension};

use crate::codec;
use crate::error::StoreError;
use crate::host::Host;
use crate::schema::{self, quote_ident};
use crate::transaction::Transaction;

/// A set of strings backed by one table. Adding a present value is a no-op.
/// Enumeration order is unspecified.
#[derive(Debug, Clone)]
pub struct UniqueSet {
    host: Host,
    table: String,
}

impl UniqueSet {
    /// Binds to the table `name`, creating it if needed.
    pub fn new(host: &Host, name: &str) -> Result<Self, StoreError> {
        schema::create_set_table(&*host.lock()?, name)?;
        Ok(UniqueSet {
            host: host.clone(),
            table: name.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn add(&self, value: &str) -> Result<(), StoreError> {
        self.add_with(&*self.host.lock()?, value)
    }

    pub fn add_in(&self, tx: &Transaction<'_>, value: &str) -> Result<(), StoreError> {
        self.add_with(tx, value)
    }

    /// An absent value is `Ok(false)`, never an error.
    pub fn has(&self, value: &str) -> Result<bool, StoreError> {
        let conn = self.host.lock()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT 1 FROM {} WHERE value = ?1",
            quote_ident(&self.table)
        ))?;
        let stored = codec::for_storage(self.host.raw_utf8(), value);
        let found: Option<i64> = stmt.query_row(params![stored], |row| row.get(0)).optional()?;
        Ok(found.is_some())
    }

    pub fn del(&self, value: &str) -> Result<(), StoreError> {
        self.del_with(&*self.host.lock()?, value)
    }

    pub fn del_in(&self, tx: &Transaction<'_>, value: &str) -> Result<(), StoreError> {
        self.del_with(tx, value)
    }

    pub fn all(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.host.lock()?;
        let mut stmt = conn.prepare_cached(&format!("SELECT value FROM {}", quote_ident(&self.table)))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut values = Vec::new();
        for row in rows {
            values.push(codec::from_storage(self.host.raw_utf8(), &self.table, row?)?);
        }
        Ok(values)
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        schema::count_rows(&*self.host.lock()?, &self.table)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        schema::clear_table(&*self.host.lock()?, &self.table)
    }

    pub fn remove(self) -> Result<(), StoreError> {
        let conn = self.host.lock()?;
        schema::drop_table(&conn, &self.table)
    }

    fn add_with(&self, conn: &Connection, value: &str) -> Result<(), StoreError> {
        let mut stmt = conn.prepare_cached(&format!(
            "INSERT OR IGNORE INTO {} (value) VALUES (?1)",
            quote_ident(&self.table)
        ))?;
        stmt.execute(params![codec::for_storage(self.host.raw_utf8(), value)])?;
        Ok(())
    }

    fn del_with(&self, conn: &Connection, value: &str) -> Result<(), StoreError> {
        let mut stmt = conn.prepare_cached(&format!(
            "DELETE FROM {} WHERE value = ?1",
            quote_ident(&self.table)
        ))?;
        stmt.execute(params![codec::for_storage(self.host.raw_utf8(), value)])?;
        Ok(())
    }
}
