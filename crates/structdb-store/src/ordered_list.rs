//! Append-only list with tail access.
//!
//! Order is the table's autoincrement id, so [`OrderedList::all`] and
//! [`OrderedList::last_n`] always return values in append order. Tail reads
//! walk the id index backwards instead of scanning from the front.

use rusqlite::{params, OptionalExtension};

use crate::codec;
use crate::error::StoreError;
use crate::host::Host;
use crate::schema::{self, quote_ident};
use crate::transaction::Transaction;

#[derive(Debug, Clone)]
pub struct OrderedList {
    host: Host,
    table: String,
}

impl OrderedList {
    /// Binds to the table `name`, creating it if needed.
    pub fn new(host: &Host, name: &str) -> Result<Self, StoreError> {
        schema::create_list_table(&*host.lock()?, name)?;
        Ok(OrderedList {
            host: host.clone(),
            table: name.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Appends `value`.
    pub fn add(&self, value: &str) -> Result<(), StoreError> {
        let conn = self.host.lock()?;
        self.add_with(&conn, value)
    }

    pub fn add_in(&self, tx: &Transaction<'_>, value: &str) -> Result<(), StoreError> {
        self.add_with(tx, value)
    }

    pub fn all(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.host.lock()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT value FROM {} ORDER BY id",
            quote_ident(&self.table)
        ))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut values = Vec::new();
        for row in rows {
            values.push(self.decode(row?)?);
        }
        Ok(values)
    }

    /// The most recently appended value; `NotFound` when the list is empty.
    pub fn last(&self) -> Result<String, StoreError> {
        let conn = self.host.lock()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT value FROM {} ORDER BY id DESC LIMIT 1",
            quote_ident(&self.table)
        ))?;
        let stored: Option<String> = stmt.query_row([], |row| row.get(0)).optional()?;
        match stored {
            Some(stored) => self.decode(stored),
            None => Err(StoreError::not_found(&self.table, "last")),
        }
    }

    /// Up to `n` most recently appended values, oldest first. Asking for
    /// more than the list holds returns the whole list.
    pub fn last_n(&self, n: usize) -> Result<Vec<String>, StoreError> {
        let limit = i64::try_from(n).unwrap_or(i64::MAX);
        let conn = self.host.lock()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT value FROM (SELECT id, value FROM {} ORDER BY id DESC LIMIT ?1) ORDER BY id",
            quote_ident(&self.table)
        ))?;
        let rows = stmt.query_map(params![limit], |row| row.get::<_, String>(0))?;
        let mut values = Vec::new();
        for row in rows {
            values.push(self.decode(row?)?);
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

    fn add_with(&self, conn: &rusqlite::Connection, value: &str) -> Result<(), StoreError> {
        let mut stmt = conn.prepare_cached(&format!(
            "INSERT INTO {} (value) VALUES (?1)",
            quote_ident(&self.table)
        ))?;
        stmt.execute(params![codec::for_storage(self.host.raw_utf8(), value)])?;
        Ok(())
    }

    fn decode(&self, stored: String) -> Result<String, StoreError> {
        codec::from_storage(self.host.raw_utf8(), &self.table, stored)
    }
}
