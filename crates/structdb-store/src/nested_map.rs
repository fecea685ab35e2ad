//! Map of maps synthesized from a [`FlatStore`] and a [`UniqueSet`].
//!
//! # Layout
//!
//! A [`NestedMap`] named `users` owns two tables:
//! - `users_properties_map`: a [`FlatStore`] keyed by the composite key
//!   `owner + FIELD_SEPARATOR + property`.
//! - `users_encountered_property_keys`: a [`UniqueSet`] of every property key
//!   ever written for any owner (the property index).
//!
//! The property index only grows. Deleting a key or an owner leaves its
//! property names in place, so the index is always a superset of the
//! property keys present in the data table. Owner-level reads (`exists`,
//! `keys`, `del`) walk the index and re-check each candidate against the data
//! table, so stale index entries cost one lookup each and never change a
//! result.
//!
//! Nothing is cached in memory: two maps built with the same name, on the
//! same or different hosts, read and write the same rows.
//!
//! # Write paths
//!
//! - [`NestedMap::set_map`] is the checked path. It rejects owners and keys
//!   containing the separator and writes all pairs in one transaction.
//! - [`NestedMap::set_large_map`] is the bulk path. It skips separator checks
//!   and writes every owner in one transaction.
//!
//! On both paths new property keys are added to the index before the data
//! transaction opens and are not rolled back with it.

use std::collections::{HashMap, HashSet};

use rusqlite::Connection;

use crate::config::Verbosity;
use crate::error::StoreError;
use crate::flat_store::FlatStore;
use crate::host::Host;
use crate::schema::{ENCOUNTERED_KEYS_SUFFIX, PROPERTIES_MAP_SUFFIX};
use crate::unique_set::UniqueSet;

/// Joins owner and property key in the flat key space.
pub const FIELD_SEPARATOR: &str = "¤";

/// Builds the flat key for `(owner, key)`.
pub fn composite_key(owner: &str, key: &str) -> String {
    let mut composite = String::with_capacity(owner.len() + FIELD_SEPARATOR.len() + key.len());
    composite.push_str(owner);
    composite.push_str(FIELD_SEPARATOR);
    composite.push_str(key);
    composite
}

/// Splits a flat key on the first separator into `(owner, key)`.
pub fn split_composite(composite: &str) -> Option<(&str, &str)> {
    composite.split_once(FIELD_SEPARATOR)
}

fn check_separator(field: &'static str, value: &str) -> Result<(), StoreError> {
    if value.contains(FIELD_SEPARATOR) {
        return Err(StoreError::SeparatorCollision {
            field,
            separator: FIELD_SEPARATOR,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Owner -> property key -> value map over two tables.
#[derive(Debug, Clone)]
pub struct NestedMap {
    name: String,
    data: FlatStore,
    properties: UniqueSet,
    verbosity: Verbosity,
}

impl NestedMap {
    /// Binds to (creating if needed) the two tables derived from `name`.
    /// Diagnostics follow the host's verbosity.
    pub fn new(host: &Host, name: &str) -> Result<Self, StoreError> {
        let data = FlatStore::new(host, &format!("{name}{PROPERTIES_MAP_SUFFIX}"))?;
        let properties = UniqueSet::new(host, &format!("{name}{ENCOUNTERED_KEYS_SUFFIX}"))?;
        Ok(NestedMap {
            name: name.to_string(),
            data,
            properties,
            verbosity: host.verbosity(),
        })
    }

    /// Overrides the diagnostic policy for this handle.
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The table of composite-keyed values.
    pub fn flat_store(&self) -> &FlatStore {
        &self.data
    }

    /// The set of every property key ever written.
    pub fn property_index(&self) -> &UniqueSet {
        &self.properties
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Sets one property of `owner`. Same contract as [`set_map`](Self::set_map).
    pub fn set(&self, owner: &str, key: &str, value: &str) -> Result<(), StoreError> {
        self.set_map(owner, [(key, value)])
    }

    /// Sets several properties of `owner` atomically.
    ///
    /// Fails with [`StoreError::SeparatorCollision`] before writing anything
    /// if the owner or any key contains [`FIELD_SEPARATOR`]. Otherwise new
    /// keys are recorded in the property index and all values are written in
    /// one transaction; on failure no value from this call is visible, while
    /// the index additions stay.
    pub fn set_map<I, K, V>(&self, owner: &str, properties: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let pairs: Vec<(K, V)> = properties.into_iter().collect();
        check_separator("owner", owner)?;
        for (key, _) in &pairs {
            check_separator("key", key.as_ref())?;
        }

        let known: HashSet<String> = self.properties.all()?.into_iter().collect();
        let mut added = HashSet::new();
        for (key, _) in &pairs {
            let key = key.as_ref();
            if !known.contains(key) && added.insert(key) {
                self.properties.add(key)?;
            }
        }

        tracing::debug!(map = %self.name, owner, count = pairs.len(), "set_map");
        self.data.host().run_immediate(|tx| {
            for (key, value) in &pairs {
                tx.check_cancelled()?;
                self.data
                    .set_with(tx, &composite_key(owner, key.as_ref()), value.as_ref())?;
            }
            Ok(())
        })
    }

    /// Writes many owners in one transaction without separator checks.
    ///
    /// Intended for loading brand new owners. Existing owners are not
    /// detected: their listed properties are overwritten. Owners or keys
    /// containing [`FIELD_SEPARATOR`] are stored but corrupt later owner
    /// enumeration; keeping them out is the caller's job.
    pub fn set_large_map(
        &self,
        all_properties: &HashMap<String, HashMap<String, String>>,
    ) -> Result<(), StoreError> {
        let verbose = self.verbosity.is_verbose();

        let known: HashSet<String> = self.properties.all()?.into_iter().collect();
        let mut new_props: Vec<&str> = Vec::new();
        let mut seen = HashSet::new();
        for props in all_properties.values() {
            for key in props.keys() {
                if !known.contains(key) && seen.insert(key.as_str()) {
                    new_props.push(key);
                }
            }
        }
        for prop in new_props {
            if verbose {
                tracing::info!(map = %self.name, property = prop, "adding property key");
            }
            self.properties.add(prop)?;
        }

        if verbose {
            tracing::info!(map = %self.name, owners = all_properties.len(), "starting transaction");
        }
        self.data.host().run_immediate(|tx| {
            for (owner, props) in all_properties {
                for (key, value) in props {
                    tx.check_cancelled()?;
                    if verbose {
                        tracing::info!(map = %self.name, owner = %owner, key = %key, value = %value, "setting property");
                    }
                    self.data.set_with(tx, &composite_key(owner, key), value)?;
                }
            }
            if verbose {
                tracing::info!(map = %self.name, "committing transaction");
            }
            Ok(())
        })?;
        if verbose {
            tracing::info!(map = %self.name, "transaction complete");
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// `NotFound` if `owner` has no such property.
    pub fn get(&self, owner: &str, key: &str) -> Result<String, StoreError> {
        self.data.get(&composite_key(owner, key))
    }

    /// Reads several properties of `owner` in one transaction. Any failure,
    /// including a missing key, fails the whole call.
    pub fn get_map<I, K>(&self, owner: &str, keys: I) -> Result<HashMap<String, String>, StoreError>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        self.data.host().run_in_transaction(|tx| {
            let mut results = HashMap::new();
            for key in keys {
                let key = key.as_ref();
                let value = self.data.get_with(tx, &composite_key(owner, key))?;
                results.insert(key.to_string(), value);
            }
            Ok(results)
        })
    }

    /// True if `owner` holds `key`, even with an empty value. The Go
    /// `HashMap2.Has` this replaces answered `false` for an empty value;
    /// here an empty string is a held property, matching [`keys`](Self::keys).
    pub fn has(&self, owner: &str, key: &str) -> Result<bool, StoreError> {
        self.has_with(&*self.data.host().lock()?, owner, key)
    }

    /// True if `owner` holds any property.
    pub fn exists(&self, owner: &str) -> Result<bool, StoreError> {
        let props = self.properties.all()?;
        let conn = self.data.host().lock()?;
        for key in &props {
            if self.has_with(&conn, owner, key)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Property keys currently held by `owner`.
    pub fn keys(&self, owner: &str) -> Result<Vec<String>, StoreError> {
        let props = self.properties.all()?;
        let conn = self.data.host().lock()?;
        let mut found = Vec::new();
        for key in props {
            if self.has_with(&conn, owner, &key)? {
                found.push(key);
            }
        }
        Ok(found)
    }

    /// Every distinct owner.
    pub fn all(&self) -> Result<Vec<String>, StoreError> {
        let composites = self.data.all()?;
        let mut seen = HashSet::new();
        let mut owners = Vec::new();
        for composite in &composites {
            if let Some((owner, _)) = split_composite(composite) {
                if seen.insert(owner) {
                    owners.push(owner.to_string());
                }
            }
        }
        Ok(owners)
    }

    /// Owners whose `key` equals `value`. Scans every owner.
    pub fn all_where(&self, key: &str, value: &str) -> Result<Vec<String>, StoreError> {
        let owners = self.all()?;
        let conn = self.data.host().lock()?;
        let mut matching = Vec::new();
        for owner in owners {
            match self.data.get_with(&conn, &composite_key(&owner, key)) {
                Ok(v) if v == value => matching.push(owner),
                Ok(_) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }
        Ok(matching)
    }

    /// Every property key ever written, including ones no owner holds now.
    pub fn all_encountered_keys(&self) -> Result<Vec<String>, StoreError> {
        self.properties.all()
    }

    /// Number of distinct owners (not composite rows).
    pub fn count(&self) -> Result<usize, StoreError> {
        Ok(self.all()?.len())
    }

    // -----------------------------------------------------------------------
    // Deletes
    // -----------------------------------------------------------------------

    /// Removes one property of `owner`. The key stays in the property index.
    pub fn del_key(&self, owner: &str, key: &str) -> Result<(), StoreError> {
        self.data.del(&composite_key(owner, key))
    }

    /// Removes every property of `owner`, trying each indexed key.
    pub fn del(&self, owner: &str) -> Result<(), StoreError> {
        let props = self.properties.all()?;
        self.data.host().run_immediate(|tx| {
            for key in &props {
                tx.check_cancelled()?;
                self.data.del_with(tx, &composite_key(owner, key))?;
            }
            Ok(())
        })
    }

    /// Empties both tables; the map stays usable.
    pub fn clear(&self) -> Result<(), StoreError> {
        let props_result = self.properties.clear();
        let data_result = self.data.clear();
        if self.verbosity.is_verbose() {
            tracing::info!(map = %self.name, "cleared");
        }
        props_result.and(data_result)
    }

    /// Drops both tables. Both drops are attempted; the first error wins.
    pub fn remove(self) -> Result<(), StoreError> {
        let NestedMap {
            name,
            data,
            properties,
            verbosity,
        } = self;
        let props_result = properties.remove();
        let data_result = data.remove();
        if verbosity.is_verbose() {
            tracing::info!(map = %name, "removed");
        }
        props_result.and(data_result)
    }

    fn has_with(&self, conn: &Connection, owner: &str, key: &str) -> Result<bool, StoreError> {
        match self.data.get_with(conn, &composite_key(owner, key)) {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::quote_ident;

    fn map(name: &str) -> (Host, NestedMap) {
        let host = Host::in_memory().unwrap();
        let map = NestedMap::new(&host, name).unwrap();
        (host, map)
    }

    fn sorted(mut v: Vec<String>) -> Vec<String> {
        v.sort();
        v
    }

    #[test]
    fn test_split_on_first_separator() {
        assert_eq!(
            split_composite("test1¤test2¤test3"),
            Some(("test1", "test2¤test3"))
        );
        assert_eq!(split_composite("no separator"), None);
        assert_eq!(split_composite(&composite_key("bob", "")), Some(("bob", "")));
    }

    #[test]
    fn test_table_names_derived_from_base() {
        let (_host, m) = map("users");
        assert_eq!(m.flat_store().table(), "users_properties_map");
        assert_eq!(m.property_index().table(), "users_encountered_property_keys");
    }

    #[test]
    fn test_set_get_single() {
        let (_host, m) = map("testhashmap");
        m.set("bob", "password", "hunter1").unwrap();
        assert_eq!(m.all().unwrap(), vec!["bob"]);
        assert_eq!(m.get("bob", "password").unwrap(), "hunter1");
        assert!(m.get("bob", "email").unwrap_err().is_not_found());
        assert!(m.get("alice", "password").unwrap_err().is_not_found());
    }

    #[test]
    fn test_repeated_set_does_not_duplicate() {
        let (_host, m) = map("h");
        m.set("bob", "password", "x").unwrap();
        m.set("bob", "password", "x").unwrap();
        assert_eq!(m.get("bob", "password").unwrap(), "x");
        assert_eq!(m.all().unwrap(), vec!["bob"]);
        assert_eq!(m.flat_store().count().unwrap(), 1);
        assert_eq!(m.all_encountered_keys().unwrap(), vec!["password"]);
    }

    #[test]
    fn test_count_is_owners_not_rows() {
        let (_host, m) = map("h");
        m.set("bob", "password", "x").unwrap();
        m.set("bob", "number", "42").unwrap();
        m.set("alice", "number", "42").unwrap();
        assert_eq!(m.count().unwrap(), 2);
        assert_eq!(m.flat_store().count().unwrap(), 3);
        assert_eq!(sorted(m.all_where("number", "42").unwrap()), vec!["alice", "bob"]);
        assert_eq!(m.all_where("password", "x").unwrap(), vec!["bob"]);
        assert!(m.all_where("number", "7").unwrap().is_empty());
    }

    #[test]
    fn test_keys_per_owner() {
        let (_host, m) = map("h");
        m.set_map("bob", [("password", "x"), ("email", "bob@example.com")]).unwrap();
        m.set("alice", "admin", "true").unwrap();
        assert_eq!(sorted(m.keys("bob").unwrap()), vec!["email", "password"]);
        assert_eq!(m.keys("alice").unwrap(), vec!["admin"]);
        assert!(m.keys("carol").unwrap().is_empty());
    }

    #[test]
    fn test_has_and_exists() {
        let (_host, m) = map("h");
        assert!(!m.exists("bob").unwrap());
        m.set("bob", "note", "").unwrap();
        assert!(m.has("bob", "note").unwrap());
        assert!(!m.has("bob", "other").unwrap());
        assert!(m.exists("bob").unwrap());
        assert!(!m.exists("alice").unwrap());
    }

    #[test]
    fn test_del_key_keeps_property_index() {
        let (_host, m) = map("h");
        m.set("bob", "email", "b@x").unwrap();
        m.set("alice", "email", "a@x").unwrap();
        m.del_key("bob", "email").unwrap();
        assert!(!m.has("bob", "email").unwrap());
        assert!(m.has("alice", "email").unwrap());

        m.del_key("alice", "email").unwrap();
        // No owner holds "email" any more; the index still does.
        assert_eq!(m.all_encountered_keys().unwrap(), vec!["email"]);
        assert!(!m.exists("alice").unwrap());
        assert_eq!(m.count().unwrap(), 0);
    }

    #[test]
    fn test_del_owner_tolerates_missing_keys() {
        let (_host, m) = map("h");
        m.set_map("bob", [("a", "1"), ("b", "2")]).unwrap();
        m.set_map("alice", [("a", "1"), ("c", "3")]).unwrap();
        m.del("bob").unwrap();
        assert!(!m.exists("bob").unwrap());
        assert_eq!(sorted(m.keys("alice").unwrap()), vec!["a", "c"]);
        // Deleting an unknown owner is a no-op.
        m.del("nobody").unwrap();
        assert_eq!(m.all().unwrap(), vec!["alice"]);
    }

    #[test]
    fn test_separator_rejected_without_partial_writes() {
        let (_host, m) = map("h");
        let err = m
            .set_map("bob", [("good", "1"), ("bad¤key", "2")])
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::SeparatorCollision { field: "key", .. }
        ));
        assert!(!m.has("bob", "good").unwrap());
        assert_eq!(m.count().unwrap(), 0);

        let err = m.set("bo¤b", "good", "1").unwrap_err();
        assert!(matches!(
            err,
            StoreError::SeparatorCollision { field: "owner", .. }
        ));
        assert!(m.flat_store().all().unwrap().is_empty());
    }

    #[test]
    fn test_set_map_rolls_back_on_write_failure() {
        let (host, m) = map("h");
        m.set("bob", "good", "old").unwrap();
        host.lock()
            .unwrap()
            .execute_batch(&format!(
                "CREATE TRIGGER reject_bad BEFORE INSERT ON {}
                 WHEN NEW.key LIKE '%bad' BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
                quote_ident(m.flat_store().table())
            ))
            .unwrap();

        let err = m.set_map("bob", vec![("good", "new"), ("bad", "x")]).unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        assert_eq!(m.get("bob", "good").unwrap(), "old");
        assert!(!m.has("bob", "bad").unwrap());
        // The index addition is outside the rolled-back transaction.
        assert!(m.property_index().has("bad").unwrap());
    }

    #[test]
    fn test_property_index_grows_even_when_data_write_fails() {
        let (host, m) = map("h");
        host.lock()
            .unwrap()
            .execute_batch(&format!("DROP TABLE {}", quote_ident(m.flat_store().table())))
            .unwrap();
        let err = m.set("bob", "orphan", "1").unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        assert_eq!(m.all_encountered_keys().unwrap(), vec!["orphan"]);
    }

    #[test]
    fn test_get_map() {
        let (_host, m) = map("h");
        m.set_map("bob", [("a", "1"), ("b", "2"), ("c", "3")]).unwrap();
        let got = m.get_map("bob", ["a", "c"]).unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got["a"], "1");
        assert_eq!(got["c"], "3");

        let err = m.get_map("bob", ["a", "missing"]).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_set_large_map_skips_separator_check() {
        let (_host, m) = map("h");
        let mut all = HashMap::new();
        for (owner, number) in [("u1", "1"), ("u2", "2"), ("u3", "2")] {
            let mut props = HashMap::new();
            props.insert("number".to_string(), number.to_string());
            props.insert("name".to_string(), owner.to_uppercase());
            all.insert(owner.to_string(), props);
        }
        all.insert(
            "we¤ird".to_string(),
            HashMap::from([("number".to_string(), "9".to_string())]),
        );
        m.set_large_map(&all).unwrap();

        assert_eq!(m.get("u2", "name").unwrap(), "U2");
        assert_eq!(sorted(m.all_where("number", "2").unwrap()), vec!["u2", "u3"]);
        assert_eq!(sorted(m.all_encountered_keys().unwrap()), vec!["name", "number"]);
        // The unchecked owner is stored, and mis-split on enumeration.
        assert_eq!(m.get("we¤ird", "number").unwrap(), "9");
        assert!(m.all().unwrap().contains(&"we".to_string()));
    }

    #[test]
    fn test_clear_and_remove() {
        let (host, m) = map("h");
        m.set("bob", "a", "1").unwrap();
        m.clear().unwrap();
        assert_eq!(m.count().unwrap(), 0);
        assert!(m.all_encountered_keys().unwrap().is_empty());
        m.set("bob", "a", "2").unwrap();
        assert_eq!(m.get("bob", "a").unwrap(), "2");

        let stale = m.clone();
        m.remove().unwrap();
        assert!(matches!(stale.all(), Err(StoreError::Backend(_))));

        // Same name reattaches to fresh tables.
        let again = NestedMap::new(&host, "h").unwrap();
        assert_eq!(again.count().unwrap(), 0);
    }

    #[test]
    fn test_two_handles_share_tables() {
        let (host, first) = map("shared");
        let second = NestedMap::new(&host, "shared").unwrap();
        first.set("bob", "email", "b@x").unwrap();
        assert_eq!(second.get("bob", "email").unwrap(), "b@x");
        second.set("alice", "phone", "123").unwrap();
        assert_eq!(sorted(first.all_encountered_keys().unwrap()), vec!["email", "phone"]);
        assert_eq!(first.keys("alice").unwrap(), vec!["phone"]);
    }
}
