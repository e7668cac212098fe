//! Transactions with explicit success and failure markers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use sqlx::{Executor, Sqlite, SqliteConnection, SqlitePool, Transaction};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::debug;

use scopedb_core::{FixtureError, FixtureResult};

use crate::runner::backend_error;

type TxSlot = Arc<Mutex<Option<Transaction<'static, Sqlite>>>>;

/// How a unit of work will finish when closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Undecided,
    Success,
    Failure,
}

/// A transaction that commits on close only if marked successful.
///
/// `mark_failure` wins over `mark_success` regardless of call order. An
/// undecided unit of work rolls back, as does one that is dropped without
/// being closed.
pub struct UnitOfWork {
    tx: TxSlot,
    outcome: Outcome,
    closed: Arc<AtomicBool>,
}

/// Observer for whether a [`UnitOfWork`] has been closed.
///
/// Stays valid after the unit of work itself is gone.
#[derive(Debug, Clone)]
pub struct CloseWatch(Arc<AtomicBool>);

impl CloseWatch {
    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Second handle onto a unit of work's transaction.
///
/// The fixture holds one while a scoped unit of work is open so its own
/// queries join that transaction.
#[derive(Clone)]
pub(crate) struct JoinedTransaction(TxSlot);

impl std::fmt::Debug for JoinedTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinedTransaction").finish_non_exhaustive()
    }
}

impl JoinedTransaction {
    /// The open transaction, or `None` once the unit of work has closed.
    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) async fn lock(&self) -> Option<MappedMutexGuard<'_, Transaction<'static, Sqlite>>> {
        MutexGuard::try_map(self.0.lock().await, Option::as_mut).ok()
    }

    /// The transaction slot itself; `None` inside once the unit of work has
    /// closed. Unlike a mapped guard this can be held across `.await` in a
    /// `Send` future.
    pub(crate) async fn slot(&self) -> MutexGuard<'_, Option<Transaction<'static, Sqlite>>> {
        self.0.lock().await
    }
}

impl UnitOfWork {
    pub(crate) async fn begin(pool: &SqlitePool) -> FixtureResult<Self> {
        let tx = pool.begin().await.map_err(backend_error)?;
        Ok(Self {
            tx: Arc::new(Mutex::new(Some(tx))),
            outcome: Outcome::Undecided,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    pub(crate) fn join(&self) -> JoinedTransaction {
        JoinedTransaction(Arc::clone(&self.tx))
    }

    /// Commit when closed, unless also marked as failed.
    pub fn mark_success(&mut self) {
        if self.outcome == Outcome::Undecided {
            self.outcome = Outcome::Success;
        }
    }

    /// Roll back when closed.
    pub fn mark_failure(&mut self) {
        self.outcome = Outcome::Failure;
    }

    /// Whether closing now would commit.
    pub fn will_commit(&self) -> bool {
        self.outcome == Outcome::Success
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn watch(&self) -> CloseWatch {
        CloseWatch(Arc::clone(&self.closed))
    }

    /// Lock the underlying transaction, for anything beyond the helpers below.
    pub async fn transaction(
        &self,
    ) -> FixtureResult<MappedMutexGuard<'_, Transaction<'static, Sqlite>>> {
        MutexGuard::try_map(self.tx.lock().await, Option::as_mut).map_err(|_| closed_error())
    }

    /// Execute a single statement and return the number of rows affected.
    pub async fn execute(&mut self, statement: &str) -> FixtureResult<u64> {
        let mut slot = self.tx.lock().await;
        let tx = slot.as_mut().ok_or_else(closed_error)?;
        execute_on(tx, statement).await
    }

    /// Execute a script of one or more statements.
    pub async fn execute_script(&mut self, script: &str) -> FixtureResult<()> {
        let mut slot = self.tx.lock().await;
        let tx = slot.as_mut().ok_or_else(closed_error)?;
        execute_script_on(tx, script).await
    }

    /// Run a query returning one row with one integer column.
    pub async fn fetch_i64(&mut self, query: &str) -> FixtureResult<i64> {
        let mut slot = self.tx.lock().await;
        let tx = slot.as_mut().ok_or_else(closed_error)?;
        fetch_i64_on(tx, query).await
    }

    /// Commit or roll back according to the markers. Closing twice is a no-op.
    pub async fn close(&mut self) -> FixtureResult<()> {
        let Some(tx) = self.tx.lock().await.take() else {
            return Ok(());
        };
        self.closed.store(true, Ordering::SeqCst);

        if self.will_commit() {
            debug!("Committing unit of work");
            tx.commit().await.map_err(backend_error)
        } else {
            debug!(outcome = ?self.outcome, "Rolling back unit of work");
            tx.rollback().await.map_err(backend_error)
        }
    }
}

pub(crate) async fn execute_on(conn: &mut SqliteConnection, statement: &str) -> FixtureResult<u64> {
    let result = sqlx::query(statement)
        .execute(conn)
        .await
        .map_err(backend_error)?;
    Ok(result.rows_affected())
}

pub(crate) async fn execute_script_on(
    conn: &mut SqliteConnection,
    script: &str,
) -> FixtureResult<()> {
    conn.execute(script).await.map_err(backend_error)?;
    Ok(())
}

pub(crate) async fn fetch_i64_on(conn: &mut SqliteConnection, query: &str) -> FixtureResult<i64> {
    sqlx::query_scalar::<_, i64>(query)
        .fetch_one(conn)
        .await
        .map_err(backend_error)
}

fn closed_error() -> FixtureError {
    FixtureError::Backend("unit of work is closed".to_string())
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        // Joined handles may outlive the unit of work
        if let Ok(mut tx) = self.tx.try_lock() {
            if tx.take().is_some() {
                debug!("Unit of work dropped without close; rolling back");
            }
        }
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("outcome", &self.outcome)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::QueryRunner;

    async fn pool_with_table() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        pool.execute_script("CREATE TABLE t (n INTEGER)").await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_success_commits() {
        let pool = pool_with_table().await;
        let mut unit = UnitOfWork::begin(&pool).await.unwrap();

        unit.execute("INSERT INTO t VALUES (1)").await.unwrap();
        unit.mark_success();
        unit.close().await.unwrap();

        assert_eq!(pool.fetch_i64("SELECT COUNT(*) FROM t").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_undecided_rolls_back() {
        let pool = pool_with_table().await;
        let mut unit = UnitOfWork::begin(&pool).await.unwrap();

        unit.execute("INSERT INTO t VALUES (1)").await.unwrap();
        unit.close().await.unwrap();

        assert_eq!(pool.fetch_i64("SELECT COUNT(*) FROM t").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failure_overrides_success() {
        let pool = pool_with_table().await;
        let mut unit = UnitOfWork::begin(&pool).await.unwrap();

        unit.execute("INSERT INTO t VALUES (1)").await.unwrap();
        unit.mark_failure();
        unit.mark_success();
        assert!(!unit.will_commit());
        unit.close().await.unwrap();

        assert_eq!(pool.fetch_i64("SELECT COUNT(*) FROM t").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let pool = pool_with_table().await;
        let mut unit = UnitOfWork::begin(&pool).await.unwrap();
        let watch = unit.watch();

        unit.close().await.unwrap();
        unit.close().await.unwrap();

        assert!(unit.is_closed());
        assert!(watch.is_closed());
        assert!(unit.execute("SELECT 1").await.is_err());
    }

    #[tokio::test]
    async fn test_joined_handle_shares_transaction() {
        let pool = pool_with_table().await;
        let mut unit = UnitOfWork::begin(&pool).await.unwrap();
        let joined = unit.join();

        {
            let mut tx = joined.lock().await.unwrap();
            execute_on(&mut tx, "INSERT INTO t VALUES (1)").await.unwrap();
        }
        assert_eq!(unit.fetch_i64("SELECT COUNT(*) FROM t").await.unwrap(), 1);

        unit.close().await.unwrap();
        assert!(joined.lock().await.is_none());
        assert_eq!(pool.fetch_i64("SELECT COUNT(*) FROM t").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_drop_marks_watch_closed() {
        let pool = pool_with_table().await;
        let unit = UnitOfWork::begin(&pool).await.unwrap();
        let watch = unit.watch();
        assert!(!watch.is_closed());

        drop(unit);
        assert!(watch.is_closed());
    }
}
