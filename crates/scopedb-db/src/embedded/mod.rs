//! Embedded in-memory database fixture.
//!
//! Each [`EmbeddedFixture::start`] creates a brand-new `SQLite` in-memory
//! database shared by the connections of one pool, so nothing carries over
//! between fixtures or between runs of the same test.

mod seed;
mod unit_of_work;

pub use seed::SeedScript;
pub use unit_of_work::{CloseWatch, UnitOfWork};

use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{info, warn};

use scopedb_core::{FixtureError, FixtureResult, Lifecycle, LifecycleState, ScopedResource};

use crate::runner::{QueryRunner, backend_error};
use unit_of_work::{JoinedTransaction, execute_on, execute_script_on, fetch_i64_on};

const FIXTURE_NAME: &str = "EmbeddedFixture";

/// A fresh in-memory database bound to a test scope.
///
/// While [`run_scoped`](Self::run_scoped) is running, queries made through
/// the fixture's [`QueryRunner`] methods join the scoped unit of work.
///
/// # Example
///
/// ```rust,no_run
/// use futures_util::FutureExt;
/// use scopedb_db::{EmbeddedFixture, QueryRunner};
///
/// # async fn example() -> anyhow::Result<()> {
/// let mut db = EmbeddedFixture::with_seed("CREATE TABLE person (name TEXT);");
/// db.start().await?;
///
/// db.run_scoped(|tx, _db| {
///     async move {
///         tx.execute("INSERT INTO person VALUES ('Ada')").await?;
///         tx.mark_success();
///         Ok::<_, anyhow::Error>(())
///     }
///     .boxed()
/// })
/// .await?;
///
/// assert_eq!(db.fetch_i64("SELECT COUNT(*) FROM person").await?, 1);
/// db.stop().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct EmbeddedFixture {
    seed: Option<SeedScript>,
    lifecycle: Lifecycle<SqlitePool>,
    scope: Mutex<Option<JoinedTransaction>>,
}

impl Default for EmbeddedFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddedFixture {
    /// Fixture with an empty database.
    pub const fn new() -> Self {
        Self {
            seed: None,
            lifecycle: Lifecycle::new(FIXTURE_NAME),
            scope: Mutex::new(None),
        }
    }

    /// Fixture whose database is populated by `seed` on start.
    pub fn with_seed(seed: impl Into<SeedScript>) -> Self {
        Self {
            seed: Some(seed.into()),
            lifecycle: Lifecycle::new(FIXTURE_NAME),
            scope: Mutex::new(None),
        }
    }

    pub const fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// The backing pool. Only available while running.
    pub fn pool(&self) -> FixtureResult<&SqlitePool> {
        self.lifecycle.handle()
    }

    /// Create the database and run the seed script.
    ///
    /// A failing seed releases the new database before returning
    /// [`FixtureError::Seed`]; the fixture stays unstarted.
    pub async fn start(&mut self) -> FixtureResult<()> {
        self.lifecycle.ensure_startable()?;
        let pool = open_instance().await?;
        self.start_on(pool).await
    }

    async fn start_on(&mut self, pool: SqlitePool) -> FixtureResult<()> {
        if let Some(seed) = &self.seed {
            if let Err(e) = apply_seed(&pool, seed).await {
                pool.close().await;
                return Err(e);
            }
        }

        self.lifecycle.mark_running(pool)?;
        info!(seeded = self.seed.is_some(), "Embedded database started");
        Ok(())
    }

    /// Release the database. A no-op when the fixture never started.
    pub async fn stop(&mut self) -> FixtureResult<()> {
        if let Some(pool) = self.lifecycle.begin_stop()? {
            pool.close().await;
            info!("Embedded database stopped");
        }
        Ok(())
    }

    /// Open a unit of work. The caller must close it.
    ///
    /// Unlike [`run_scoped`](Self::run_scoped), fixture queries do not join
    /// a unit of work opened this way.
    pub async fn begin(&self) -> FixtureResult<UnitOfWork> {
        UnitOfWork::begin(self.lifecycle.handle()?).await
    }

    /// Run `work` inside a unit of work that is closed before returning.
    ///
    /// `work` receives the unit of work and the fixture itself; queries on
    /// either run in the same transaction. Changes are committed only if
    /// `work` calls [`UnitOfWork::mark_success`]. An error from `work` is
    /// returned unchanged after the unit of work is closed.
    ///
    /// Scopes do not nest: calling this while another scope is open fails
    /// with [`FixtureError::ScopeActive`].
    pub async fn run_scoped<T, E, F>(&self, work: F) -> Result<T, E>
    where
        E: From<FixtureError>,
        F: for<'a> FnOnce(&'a mut UnitOfWork, &'a Self) -> BoxFuture<'a, Result<T, E>>,
    {
        let mut unit = self.begin().await?;
        let scope = ActiveScope::enter(&self.scope, unit.join())?;
        let outcome = work(&mut unit, self).await;
        drop(scope);
        let closed = unit.close().await;

        match (outcome, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(close)) => Err(close.into()),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close)) => {
                warn!(error = %close, "Failed to close unit of work after callback error");
                Err(e)
            }
        }
    }

    /// Whether a scoped unit of work is currently open.
    pub fn in_scope(&self) -> bool {
        self.joined().is_some()
    }

    fn joined(&self) -> Option<JoinedTransaction> {
        self.scope
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Marks a scoped unit of work as open on the fixture until dropped,
/// including during unwind.
struct ActiveScope<'a>(&'a Mutex<Option<JoinedTransaction>>);

impl<'a> ActiveScope<'a> {
    fn enter(
        slot: &'a Mutex<Option<JoinedTransaction>>,
        joined: JoinedTransaction,
    ) -> FixtureResult<Self> {
        let mut active = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if active.is_some() {
            return Err(FixtureError::ScopeActive(FIXTURE_NAME));
        }
        *active = Some(joined);
        Ok(Self(slot))
    }
}

impl Drop for ActiveScope<'_> {
    fn drop(&mut self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

async fn open_instance() -> FixtureResult<SqlitePool> {
    // Every parse of `sqlite::memory:` names a new shared-cache database
    let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(backend_error)?;

    SqlitePoolOptions::new()
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .map_err(backend_error)
}

async fn apply_seed(pool: &SqlitePool, seed: &SeedScript) -> FixtureResult<()> {
    let mut unit = UnitOfWork::begin(pool).await?;
    unit.execute_script(seed.as_str())
        .await
        .map_err(|e| FixtureError::Seed(seed_message(e)))?;
    unit.mark_success();
    unit.close()
        .await
        .map_err(|e| FixtureError::Seed(seed_message(e)))
}

fn seed_message(e: FixtureError) -> String {
    match e {
        FixtureError::Backend(msg) => msg,
        other => other.to_string(),
    }
}

#[async_trait]
impl QueryRunner for EmbeddedFixture {
    async fn execute(&self, statement: &str) -> FixtureResult<u64> {
        if let Some(joined) = self.joined() {
            let mut slot = joined.slot().await;
            if let Some(tx) = slot.as_mut() {
                return execute_on(tx, statement).await;
            }
        }
        self.pool()?.execute(statement).await
    }

    async fn execute_script(&self, script: &str) -> FixtureResult<()> {
        if let Some(joined) = self.joined() {
            let mut slot = joined.slot().await;
            if let Some(tx) = slot.as_mut() {
                return execute_script_on(tx, script).await;
            }
        }
        self.pool()?.execute_script(script).await
    }

    async fn fetch_i64(&self, query: &str) -> FixtureResult<i64> {
        if let Some(joined) = self.joined() {
            let mut slot = joined.slot().await;
            if let Some(tx) = slot.as_mut() {
                return fetch_i64_on(tx, query).await;
            }
        }
        self.pool()?.fetch_i64(query).await
    }
}

#[async_trait]
impl ScopedResource for EmbeddedFixture {
    async fn before_scope(&mut self) -> FixtureResult<()> {
        self.start().await
    }

    async fn after_scope(&mut self) -> FixtureResult<()> {
        self.stop().await
    }
}
