//! The shared database handle every structure is bound to.
//!
//! A [`Host`] owns one SQLite connection behind a mutex. Cloning a host is
//! cheap and shares the connection, so structures built from clones of the
//! same host see each other's writes immediately. Hosts opened separately on
//! the same file are independent connections and interoperate through
//! SQLite's own locking.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, InterruptHandle, TransactionBehavior};

use crate::config::{HostConfig, Verbosity};
use crate::error::StoreError;
use crate::schema;
use crate::transaction::{self, Transaction};

#[derive(Debug)]
struct HostInner {
    conn: Mutex<Connection>,
    cancel: Arc<AtomicBool>,
    raw_utf8: bool,
    verbosity: Verbosity,
}

/// Shared connection to the backing store.
#[derive(Debug, Clone)]
pub struct Host {
    inner: Arc<HostInner>,
}

impl Host {
    /// Opens (or creates) a database file with default settings.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::from_config(&HostConfig {
            path: Some(path.as_ref().to_path_buf()),
            ..HostConfig::default()
        })
    }

    /// Opens a private in-memory database (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::from_config(&HostConfig::default())
    }

    pub fn from_config(config: &HostConfig) -> Result<Self, StoreError> {
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        let conn = match &config.path {
            Some(path) => schema::open_database(path, busy_timeout)?,
            None => schema::open_in_memory(busy_timeout)?,
        };
        Ok(Host {
            inner: Arc::new(HostInner {
                conn: Mutex::new(conn),
                cancel: Arc::new(AtomicBool::new(false)),
                raw_utf8: config.raw_utf8,
                verbosity: config.verbosity(),
            }),
        })
    }

    /// Whether values are stored verbatim (no encoding).
    pub fn raw_utf8(&self) -> bool {
        self.inner.raw_utf8
    }

    /// Default diagnostic policy for structures built on this host.
    pub fn verbosity(&self) -> Verbosity {
        self.inner.verbosity
    }

    /// Handle that cancels the transaction in flight on this host, from any
    /// thread. The batch fails with [`TxStage::Interrupted`] and is rolled
    /// back. A cancel issued while no transaction is open applies to the
    /// next one.
    ///
    /// [`TxStage::Interrupted`]: crate::TxStage::Interrupted
    pub fn cancel_handle(&self) -> Result<CancelHandle, StoreError> {
        Ok(CancelHandle {
            flag: Arc::clone(&self.inner.cancel),
            interrupt: Arc::new(self.lock()?.get_interrupt_handle()),
        })
    }

    /// Runs `f` in one transaction, committing on `Ok` and rolling back on
    /// `Err`. The connection stays locked while `f` runs, so `f` must only
    /// use the `*_in` structure methods; calling a locking method of a
    /// structure on this host from inside `f` deadlocks.
    pub fn run_in_transaction<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, StoreError>,
    {
        self.run_with_behavior(TransactionBehavior::Deferred, f)
    }

    /// Like [`run_in_transaction`](Self::run_in_transaction) but takes the
    /// write lock at begin. Used for writes, and required for
    /// read-then-write, so contention with other connections waits on the
    /// busy timeout instead of failing the upgrade.
    pub(crate) fn run_immediate<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, StoreError>,
    {
        self.run_with_behavior(TransactionBehavior::Immediate, f)
    }

    fn run_with_behavior<T, F>(&self, behavior: TransactionBehavior, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, StoreError>,
    {
        let mut conn = self.lock()?;
        transaction::run_in_transaction(&mut conn, behavior, &self.inner.cancel, f)
    }

    /// Locks the connection for the duration of the returned guard.
    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.inner
            .conn
            .lock()
            .map_err(|_| StoreError::ConnectionPoisoned)
    }

    /// Closes the connection if this is the last handle to it. With other
    /// clones still alive the connection stays open for them.
    pub fn close(self) -> Result<(), StoreError> {
        match Arc::try_unwrap(self.inner) {
            Ok(inner) => {
                let conn = inner
                    .conn
                    .into_inner()
                    .map_err(|_| StoreError::ConnectionPoisoned)?;
                conn.close().map_err(|(_, err)| StoreError::Backend(err))
            }
            Err(_) => Ok(()),
        }
    }
}

/// Cancels work on one [`Host`]. Cheap to clone and `Send`.
#[derive(Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
    interrupt: Arc<InterruptHandle>,
}

impl CancelHandle {
    /// Marks the host's current (or next) transaction cancelled and aborts
    /// the statement running right now, if any.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.interrupt.interrupt();
    }

    /// True while a cancel is pending.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
