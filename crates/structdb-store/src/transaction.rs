//! Transaction coordinator.
//!
//! [`Transaction`] is a thin wrapper over SQLite's begin/commit/rollback
//! that reports failures as [`StoreError::Transaction`]. Structures do not
//! open transactions on their own for single-key calls; batch operations
//! (and callers composing several structures) go through
//! [`run_in_transaction`], which commits on `Ok` and rolls back on the first
//! `Err`.
//!
//! Every transaction watches the host's cancel flag. A cancel requested
//! while the transaction is open is seen at the next
//! [`Transaction::check_cancelled`] or, at the latest, before commit, so a
//! cancelled transaction never commits.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};

use rusqlite::{Connection, ErrorCode, TransactionBehavior};

use crate::error::{StoreError, TxStage};

/// An open transaction on a locked connection.
///
/// Dereferences to the connection, so every `*_in` structure method accepts
/// it. Dropping without commit rolls back.
pub struct Transaction<'c> {
    inner: rusqlite::Transaction<'c>,
    cancel: &'c AtomicBool,
}

impl<'c> Transaction<'c> {
    pub(crate) fn begin(
        conn: &'c mut Connection,
        behavior: TransactionBehavior,
        cancel: &'c AtomicBool,
    ) -> Result<Self, StoreError> {
        let inner = conn
            .transaction_with_behavior(behavior)
            .map_err(|source| StoreError::Transaction {
                stage: TxStage::Begin,
                source,
            })?;
        tracing::trace!("transaction begin");
        Ok(Transaction { inner, cancel })
    }

    /// Fails with [`TxStage::Interrupted`] if a cancel is pending. The
    /// pending cancel is consumed.
    pub fn check_cancelled(&self) -> Result<(), StoreError> {
        if self.cancel.swap(false, Ordering::SeqCst) {
            return Err(StoreError::interrupted());
        }
        Ok(())
    }

    pub fn commit(self) -> Result<(), StoreError> {
        self.inner.commit().map_err(|source| StoreError::Transaction {
            stage: TxStage::Commit,
            source,
        })?;
        tracing::trace!("transaction commit");
        Ok(())
    }

    pub fn rollback(self) -> Result<(), StoreError> {
        self.inner.rollback().map_err(|source| StoreError::Transaction {
            stage: TxStage::Rollback,
            source,
        })?;
        tracing::trace!("transaction rollback");
        Ok(())
    }
}

impl fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction").finish_non_exhaustive()
    }
}

impl Deref for Transaction<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.inner
    }
}

/// Runs `f` inside one transaction on `conn`.
///
/// On `Err` the transaction is rolled back and the closure's error returned;
/// a failing rollback is logged, not reported, so the caller sees the cause.
/// A cancel pending when `f` returns `Ok` rolls back too. Cancellation, by
/// flag or by SQLite interrupt, is reported as [`TxStage::Interrupted`].
///
/// Read-modify-write callers pass [`TransactionBehavior::Immediate`] so the
/// write lock is taken up front, where the busy timeout applies.
pub(crate) fn run_in_transaction<T, F>(
    conn: &mut Connection,
    behavior: TransactionBehavior,
    cancel: &AtomicBool,
    f: F,
) -> Result<T, StoreError>
where
    F: FnOnce(&Transaction<'_>) -> Result<T, StoreError>,
{
    let tx = Transaction::begin(conn, behavior, cancel)?;
    match f(&tx).and_then(|value| tx.check_cancelled().map(|()| value)) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback() {
                tracing::warn!(error = %rollback_err, cause = %err, "rollback failed");
            }
            let err = mark_interrupted(err);
            if err.is_interrupted() {
                cancel.store(false, Ordering::SeqCst);
                tracing::debug!("transaction cancelled");
            }
            Err(err)
        }
    }
}

fn mark_interrupted(err: StoreError) -> StoreError {
    match err {
        StoreError::Backend(source)
            if source.sqlite_error_code() == Some(ErrorCode::OperationInterrupted) =>
        {
            StoreError::Transaction {
                stage: TxStage::Interrupted,
                source,
            }
        }
        other => other,
    }
}
