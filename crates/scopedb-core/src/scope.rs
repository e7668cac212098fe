//! Test-scope hooks.
//!
//! A test harness drives a fixture through exactly two entry points:
//! [`ScopedResource::before_scope`] when the test starts and
//! [`ScopedResource::after_scope`] when it ends. [`run_in_scope`] is the
//! harness: it brackets a test body with both hooks and always runs the
//! teardown hook, including when setup fails or the body panics.

use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tracing::warn;

use crate::error::{FixtureError, FixtureResult};

/// A resource whose lifetime is bound to a single test scope.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScopedResource: Send + Sync {
    /// Called once when the test scope opens.
    async fn before_scope(&mut self) -> FixtureResult<()>;

    /// Called once when the test scope closes.
    async fn after_scope(&mut self) -> FixtureResult<()>;
}

/// Run `body` inside the scope of `resource`.
///
/// Teardown runs after the body regardless of how it finished. If setup
/// fails, teardown still runs and the setup error is returned. A panic in
/// the body is resumed once teardown completes. A teardown error is only
/// returned when the body itself succeeded.
pub async fn run_in_scope<R, T, E, F>(resource: &mut R, body: F) -> Result<T, E>
where
    R: ScopedResource + ?Sized,
    E: From<FixtureError>,
    F: for<'a> FnOnce(&'a R) -> BoxFuture<'a, Result<T, E>>,
{
    if let Err(setup) = resource.before_scope().await {
        if let Err(teardown) = resource.after_scope().await {
            warn!(error = %teardown, "Teardown after failed setup also failed");
        }
        return Err(setup.into());
    }

    let outcome = AssertUnwindSafe(body(&*resource)).catch_unwind().await;
    let teardown = resource.after_scope().await;

    match outcome {
        Err(panic) => {
            if let Err(e) = teardown {
                warn!(error = %e, "Teardown failed while unwinding a panicked test body");
            }
            std::panic::resume_unwind(panic)
        }
        Ok(Err(e)) => {
            if let Err(teardown) = teardown {
                warn!(error = %teardown, "Teardown failed after test body error");
            }
            Err(e)
        }
        Ok(Ok(value)) => {
            teardown?;
            Ok(value)
        }
    }
}
