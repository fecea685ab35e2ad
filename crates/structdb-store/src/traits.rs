//! Capability traits for downstream consumers.
//!
//! Higher layers (for example a user-account store) depend on these narrow
//! interfaces instead of the concrete structures, so they can be handed any
//! implementation with the same contract.

use crate::error::StoreError;
use crate::flat_store::FlatStore;
use crate::nested_map::NestedMap;
use crate::ordered_list::OrderedList;
use crate::unique_set::UniqueSet;

/// Append-only list with tail access.
pub trait ListStore {
    fn add(&self, value: &str) -> Result<(), StoreError>;
    fn get_all(&self) -> Result<Vec<String>, StoreError>;
    fn get_last(&self) -> Result<String, StoreError>;
    fn get_last_n(&self, n: usize) -> Result<Vec<String>, StoreError>;
    fn remove(self) -> Result<(), StoreError>
    where
        Self: Sized;
    fn clear(&self) -> Result<(), StoreError>;
}

/// Set of distinct strings.
pub trait SetStore {
    fn add(&self, value: &str) -> Result<(), StoreError>;
    fn has(&self, value: &str) -> Result<bool, StoreError>;
    fn get_all(&self) -> Result<Vec<String>, StoreError>;
    fn del(&self, value: &str) -> Result<(), StoreError>;
    fn remove(self) -> Result<(), StoreError>
    where
        Self: Sized;
    fn clear(&self) -> Result<(), StoreError>;
}

/// Flat key/value store.
pub trait KeyValueStore {
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn get(&self, key: &str) -> Result<String, StoreError>;
    fn del(&self, key: &str) -> Result<(), StoreError>;
    fn remove(self) -> Result<(), StoreError>
    where
        Self: Sized;
    fn clear(&self) -> Result<(), StoreError>;
}

/// Owner -> property -> value map.
pub trait HashMapStore {
    fn set(&self, owner: &str, key: &str, value: &str) -> Result<(), StoreError>;
    fn get(&self, owner: &str, key: &str) -> Result<String, StoreError>;
    fn has(&self, owner: &str, key: &str) -> Result<bool, StoreError>;
    fn exists(&self, owner: &str) -> Result<bool, StoreError>;
    /// All owners.
    fn get_all(&self) -> Result<Vec<String>, StoreError>;
    fn del_key(&self, owner: &str, key: &str) -> Result<(), StoreError>;
    fn del(&self, owner: &str) -> Result<(), StoreError>;
    fn remove(self) -> Result<(), StoreError>
    where
        Self: Sized;
    fn clear(&self) -> Result<(), StoreError>;
}

impl ListStore for OrderedList {
    fn add(&self, value: &str) -> Result<(), StoreError> {
        OrderedList::add(self, value)
    }

    fn get_all(&self) -> Result<Vec<String>, StoreError> {
        self.all()
    }

    fn get_last(&self) -> Result<String, StoreError> {
        self.last()
    }

    fn get_last_n(&self, n: usize) -> Result<Vec<String>, StoreError> {
        self.last_n(n)
    }

    fn remove(self) -> Result<(), StoreError> {
        OrderedList::remove(self)
    }

    fn clear(&self) -> Result<(), StoreError> {
        OrderedList::clear(self)
    }
}

impl SetStore for UniqueSet {
    fn add(&self, value: &str) -> Result<(), StoreError> {
        UniqueSet::add(self, value)
    }

    fn has(&self, value: &str) -> Result<bool, StoreError> {
        UniqueSet::has(self, value)
    }

    fn get_all(&self) -> Result<Vec<String>, StoreError> {
        self.all()
    }

    fn del(&self, value: &str) -> Result<(), StoreError> {
        UniqueSet::del(self, value)
    }

    fn remove(self) -> Result<(), StoreError> {
        UniqueSet::remove(self)
    }

    fn clear(&self) -> Result<(), StoreError> {
        UniqueSet::clear(self)
    }
}

impl KeyValueStore for FlatStore {
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        FlatStore::set(self, key, value)
    }

    fn get(&self, key: &str) -> Result<String, StoreError> {
        FlatStore::get(self, key)
    }

    fn del(&self, key: &str) -> Result<(), StoreError> {
        FlatStore::del(self, key)
    }

    fn remove(self) -> Result<(), StoreError> {
        FlatStore::remove(self)
    }

    fn clear(&self) -> Result<(), StoreError> {
        FlatStore::clear(self)
    }
}

impl HashMapStore for NestedMap {
    fn set(&self, owner: &str, key: &str, value: &str) -> Result<(), StoreError> {
        NestedMap::set(self, owner, key, value)
    }

    fn get(&self, owner: &str, key: &str) -> Result<String, StoreError> {
        NestedMap::get(self, owner, key)
    }

    fn has(&self, owner: &str, key: &str) -> Result<bool, StoreError> {
        NestedMap::has(self, owner, key)
    }

    fn exists(&self, owner: &str) -> Result<bool, StoreError> {
        NestedMap::exists(self, owner)
    }

    fn get_all(&self) -> Result<Vec<String>, StoreError> {
        self.all()
    }

    fn del_key(&self, owner: &str, key: &str) -> Result<(), StoreError> {
        NestedMap::del_key(self, owner, key)
    }

    fn del(&self, owner: &str) -> Result<(), StoreError> {
        NestedMap::del(self, owner)
    }

    fn remove(self) -> Result<(), StoreError> {
        NestedMap::remove(self)
    }

    fn clear(&self) -> Result<(), StoreError> {
        NestedMap::clear(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Host;

    fn record_login<M: HashMapStore>(users: &M, name: &str) -> Result<bool, StoreError> {
        let existed = users.exists(name)?;
        users.set(name, "loggedin", "true")?;
        Ok(existed)
    }

    fn drain<L: ListStore>(list: L) -> Result<Vec<String>, StoreError> {
        let items = list.get_all()?;
        list.remove()?;
        Ok(items)
    }

    #[test]
    fn test_hash_map_through_trait() {
        let host = Host::in_memory().unwrap();
        let users = NestedMap::new(&host, "users").unwrap();
        assert!(!record_login(&users, "bob").unwrap());
        assert!(record_login(&users, "bob").unwrap());
        assert_eq!(HashMapStore::get_all(&users).unwrap(), vec!["bob"]);
        HashMapStore::del(&users, "bob").unwrap();
        assert!(!HashMapStore::exists(&users, "bob").unwrap());
    }

    #[test]
    fn test_list_set_kv_through_traits() {
        let host = Host::in_memory().unwrap();
        let list = OrderedList::new(&host, "l").unwrap();
        ListStore::add(&list, "a").unwrap();
        ListStore::add(&list, "b").unwrap();
        assert_eq!(list.get_last().unwrap(), "b");
        assert_eq!(list.get_last_n(1).unwrap(), vec!["b"]);
        assert_eq!(drain(list).unwrap(), vec!["a", "b"]);

        let set = UniqueSet::new(&host, "s").unwrap();
        SetStore::add(&set, "x").unwrap();
        assert!(SetStore::has(&set, "x").unwrap());
        assert_eq!(SetStore::get_all(&set).unwrap(), vec!["x"]);

        let kv = FlatStore::new(&host, "kv").unwrap();
        KeyValueStore::set(&kv, "k", "v").unwrap();
        assert_eq!(KeyValueStore::get(&kv, "k").unwrap(), "v");
        KeyValueStore::clear(&kv).unwrap();
        assert!(KeyValueStore::get(&kv, "k").unwrap_err().is_not_found());
    }
}
