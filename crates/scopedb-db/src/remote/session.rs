//! Sessions opened against a remote fixture, and the registry that tracks
//! them for leak detection.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{Any, AnyConnection, Executor};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};

use scopedb_core::{FixtureError, FixtureResult};

use crate::runner::{QueryRunner, backend_error};

struct SessionSlot {
    id: u64,
    conn: Mutex<Option<PoolConnection<Any>>>,
}

/// A pooled connection checked out for one caller.
///
/// Cloning yields another handle to the same session. Closing returns the
/// connection to the pool; closing again is a no-op.
#[derive(Clone)]
pub struct Session {
    slot: Arc<SessionSlot>,
}

impl Session {
    fn new(id: u64, conn: PoolConnection<Any>) -> Self {
        Self {
            slot: Arc::new(SessionSlot {
                id,
                conn: Mutex::new(Some(conn)),
            }),
        }
    }

    /// Identifier unique within the owning fixture.
    pub fn id(&self) -> u64 {
        self.slot.id
    }

    pub async fn is_open(&self) -> bool {
        self.slot.conn.lock().await.is_some()
    }

    /// Return the connection to the pool.
    pub async fn close(&self) {
        self.close_if_open().await;
    }

    /// Close the session, reporting whether it was still open.
    pub(crate) async fn close_if_open(&self) -> bool {
        self.slot.conn.lock().await.take().is_some()
    }

    /// Non-blocking open check; a session whose connection is currently
    /// locked is in use and therefore open.
    fn is_open_now(&self) -> bool {
        self.slot.conn.try_lock().map_or(true, |conn| conn.is_some())
    }

    /// Close without waiting; used on unwind where awaiting is impossible.
    pub(crate) fn try_close_now(&self) {
        if let Ok(mut conn) = self.slot.conn.try_lock() {
            conn.take();
        }
    }

    /// Lock the underlying connection for direct `sqlx` use.
    pub async fn connection(&self) -> FixtureResult<MappedMutexGuard<'_, AnyConnection>> {
        let guard = self.slot.conn.lock().await;
        MutexGuard::try_map(guard, |conn| conn.as_deref_mut())
            .map_err(|_| FixtureError::SessionClosed(self.slot.id))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("id", &self.slot.id).finish()
    }
}

#[async_trait]
impl QueryRunner for Session {
    async fn execute(&self, statement: &str) -> FixtureResult<u64> {
        let mut conn = self.connection().await?;
        let result = sqlx::query(statement)
            .execute(&mut *conn)
            .await
            .map_err(backend_error)?;
        Ok(result.rows_affected())
    }

    async fn execute_script(&self, script: &str) -> FixtureResult<()> {
        let mut conn = self.connection().await?;
        Executor::execute(&mut *conn, script)
            .await
            .map_err(backend_error)?;
        Ok(())
    }

    async fn fetch_i64(&self, query: &str) -> FixtureResult<i64> {
        let mut conn = self.connection().await?;
        sqlx::query_scalar::<_, i64>(query)
            .fetch_one(&mut *conn)
            .await
            .map_err(backend_error)
    }
}

/// Every session handed out by a fixture, open or not.
#[derive(Default)]
pub(crate) struct SessionRegistry {
    next_id: AtomicU64,
    sessions: Mutex<Vec<Session>>,
}

impl SessionRegistry {
    pub(crate) async fn register(&self, conn: PoolConnection<Any>) -> Session {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let session = Session::new(id, conn);

        let mut sessions = self.sessions.lock().await;
        // Closed sessions need no teardown
        sessions.retain(Session::is_open_now);
        sessions.push(session.clone());

        session
    }

    pub(crate) async fn open_count(&self) -> usize {
        let sessions = self.sessions.lock().await;
        sessions.iter().filter(|s| s.is_open_now()).count()
    }

    /// Take every tracked session, leaving the registry empty.
    pub(crate) async fn drain(&self) -> Vec<Session> {
        std::mem::take(&mut *self.sessions.lock().await)
    }
}

/// Closes the session when dropped, including during unwind.
pub(crate) struct CloseOnDrop(pub(crate) Session);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.try_close_now();
    }
}
