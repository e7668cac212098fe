//! The query capability shared by backing handles and fixtures.
//!
//! [`QueryRunner`] is implemented for the raw `sqlx` pools and, by
//! forwarding, for the fixtures that wrap them. Test helpers written
//! against `&impl QueryRunner` accept either.

use async_trait::async_trait;
use sqlx::{AnyPool, Executor, SqlitePool};

use scopedb_core::{FixtureError, FixtureResult};

/// Map `sqlx` errors to the fixture error type.
pub(crate) fn backend_error(e: sqlx::Error) -> FixtureError {
    FixtureError::Backend(e.to_string())
}

/// Statement execution against a live database handle.
#[async_trait]
pub trait QueryRunner: Send + Sync {
    /// Execute a single statement and return the number of rows affected.
    async fn execute(&self, statement: &str) -> FixtureResult<u64>;

    /// Execute a script of one or more `;`-separated statements.
    async fn execute_script(&self, script: &str) -> FixtureResult<()>;

    /// Run a query returning one row with one integer column.
    async fn fetch_i64(&self, query: &str) -> FixtureResult<i64>;
}

macro_rules! impl_query_runner_for_pool {
    ($pool:ty) => {
        #[async_trait]
        impl QueryRunner for $pool {
            async fn execute(&self, statement: &str) -> FixtureResult<u64> {
                let result = sqlx::query(statement)
                    .execute(self)
                    .await
                    .map_err(backend_error)?;
                Ok(result.rows_affected())
            }

            async fn execute_script(&self, script: &str) -> FixtureResult<()> {
                Executor::execute(self, script)
                    .await
                    .map_err(backend_error)?;
                Ok(())
            }

            async fn fetch_i64(&self, query: &str) -> FixtureResult<i64> {
                sqlx::query_scalar::<_, i64>(query)
                    .fetch_one(self)
                    .await
                    .map_err(backend_error)
            }
        }
    };
}

impl_query_runner_for_pool!(SqlitePool);
impl_query_runner_for_pool!(AnyPool);

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sqlite_pool_runs_queries() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();

        pool.execute_script("CREATE TABLE t (n INTEGER); INSERT INTO t VALUES (1), (2);")
            .await
            .unwrap();
        let affected = QueryRunner::execute(&pool, "UPDATE t SET n = n + 1").await.unwrap();

        assert_eq!(affected, 2);
        assert_eq!(pool.fetch_i64("SELECT SUM(n) FROM t").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_sqlx_errors_map_to_backend() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();

        let err = pool.fetch_i64("SELECT * FROM missing").await.unwrap_err();
        assert!(matches!(err, FixtureError::Backend(msg) if msg.contains("missing")));
    }
}
