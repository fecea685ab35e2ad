//! List, set, key/value and nested-map structures on SQLite tables.
//!
//! Each structure owns one table named from a caller-supplied base name, so
//! constructing a structure with a known name reattaches to its data. The
//! [`NestedMap`] is built from a [`FlatStore`] and a [`UniqueSet`] and adds
//! atomic multi-key writes on top of them.
//!
//! # Modules
//!
//! - [`error`]: StoreError enum with all failure modes
//! - [`config`]: HostConfig (env / JSON) and Verbosity
//! - [`host`]: Host, the shared connection every structure binds to
//! - [`schema`]: table naming, identifier quoting and DDL
//! - [`codec`]: value encoding for hosts that are not raw-UTF-8 safe
//! - [`transaction`]: Transaction wrapper and commit/rollback coordination
//! - [`flat_store`], [`unique_set`], [`ordered_list`]: single-table structures
//! - [`nested_map`]: NestedMap and the composite-key helpers
//! - [`traits`]: capability traits for downstream consumers

pub mod codec;
pub mod config;
pub mod error;
pub mod flat_store;
pub mod host;
pub mod nested_map;
pub mod ordered_list;
pub mod schema;
pub mod traits;
pub mod transaction;
pub mod unique_set;

// Re-export key types for ergonomic use.
pub use config::{HostConfig, Verbosity};
pub use error::{StoreError, TxStage};
pub use flat_store::FlatStore;
pub use host::{CancelHandle, Host};
pub use nested_map::{composite_key, split_composite, NestedMap, FIELD_SEPARATOR};
pub use ordered_list::OrderedList;
pub use traits::{HashMapStore, KeyValueStore, ListStore, SetStore};
pub use transaction::Transaction;
pub use unique_set::UniqueSet;
