//! Storage error types for structdb-store.
//!
//! [`StoreError`] covers every failure mode of the structures: absent keys,
//! caller validation errors (separator collisions), transaction failures,
//! and opaque backing-store errors passed through from SQLite.

use std::fmt;

use thiserror::Error;

/// Phase of a transaction that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStage {
    Begin,
    Commit,
    Rollback,
    /// A statement inside the transaction was cancelled through the host's
    /// interrupt handle.
    Interrupted,
}

impl fmt::Display for TxStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            TxStage::Begin => "begin",
            TxStage::Commit => "commit",
            TxStage::Rollback => "rollback",
            TxStage::Interrupted => "interrupted",
        };
        f.write_str(stage)
    }
}

/// Errors produced by structure operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key (or list element) is absent. Often translated to `false` by
    /// callers such as `has` and `exists`.
    #[error("not found: table={table}, key={key}")]
    NotFound { table: String, key: String },

    /// An owner or property key contains the composite-key separator.
    #[error("{field} can not contain the separator {separator:?}: {value:?}")]
    SeparatorCollision {
        field: &'static str,
        separator: &'static str,
        value: String,
    },

    /// Any other caller error.
    #[error("validation error: {reason}")]
    Validation { reason: String },

    /// Transaction begin/commit/rollback failed, or the transaction was
    /// interrupted. Nothing from the in-flight call is visible.
    #[error("transaction error ({stage}): {source}")]
    Transaction {
        stage: TxStage,
        #[source]
        source: rusqlite::Error,
    },

    /// Opaque failure from SQLite, propagated unchanged.
    #[error("backing store error: {0}")]
    Backend(#[from] rusqlite::Error),

    /// A stored value could not be decoded.
    #[error("decode error in table {table}: {reason}")]
    Decode { table: String, reason: String },

    /// A thread panicked while holding the connection lock.
    #[error("connection lock poisoned")]
    ConnectionPoisoned,

    /// Invalid host configuration.
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// JSON configuration could not be parsed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn not_found(table: &str, key: &str) -> Self {
        StoreError::NotFound {
            table: table.to_string(),
            key: key.to_string(),
        }
    }

    /// A transaction cancelled through the host's cancel handle.
    pub(crate) fn interrupted() -> Self {
        StoreError::Transaction {
            stage: TxStage::Interrupted,
            source: rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_INTERRUPT),
                None,
            ),
        }
    }

    /// True for [`StoreError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// True for caller errors that must never be retried.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StoreError::SeparatorCollision { .. } | StoreError::Validation { .. }
        )
    }

    /// True for transaction-level failures.
    pub fn is_transaction(&self) -> bool {
        matches!(self, StoreError::Transaction { .. })
    }

    /// True when a transaction was cancelled and rolled back.
    pub fn is_interrupted(&self) -> bool {
        matches!(
            self,
            StoreError::Transaction {
                stage: TxStage::Interrupted,
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_separator_collision_names_constraint() {
        let err = StoreError::SeparatorCollision {
            field: "owner",
            separator: "¤",
            value: "a¤b".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("owner"));
        assert!(msg.contains("separator"));
        assert!(err.is_validation());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_transaction_stage_in_message() {
        let err = StoreError::Transaction {
            stage: TxStage::Commit,
            source: rusqlite::Error::InvalidQuery,
        };
        assert!(err.to_string().starts_with("transaction error (commit)"));
        assert!(err.is_transaction());
        assert!(!err.is_interrupted());
    }

    #[test]
    fn test_interrupted_carries_sqlite_code() {
        let err = StoreError::interrupted();
        assert!(err.is_interrupted());
        assert!(err.to_string().starts_with("transaction error (interrupted)"));
        match err {
            StoreError::Transaction { source, .. } => assert_eq!(
                source.sqlite_error_code(),
                Some(rusqlite::ErrorCode::OperationInterrupted)
            ),
            other => panic!("unexpected {other:?}"),
        }
    }
}
