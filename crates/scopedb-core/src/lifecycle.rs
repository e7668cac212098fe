//! Fixture lifecycle state machine.
//!
//! Every fixture owns exactly one backing handle and moves through
//! `Unstarted -> Running -> Stopped` exactly once. [`Lifecycle`] enforces the
//! transitions and hands out the handle only while running.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{FixtureError, FixtureResult};

/// Lifecycle state of a fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Constructed, backing handle not yet created.
    Unstarted,
    /// Backing handle is live.
    Running,
    /// Torn down; the fixture cannot be reused.
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unstarted => "unstarted",
            Self::Running => "running",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Owner of a fixture's backing handle.
///
/// The handle is created by the fixture and installed with
/// [`Lifecycle::mark_running`]; [`Lifecycle::begin_stop`] takes it back out
/// for release. A failed start leaves the lifecycle `Unstarted`, so a later
/// `stop()` is a plain no-op.
pub struct Lifecycle<H> {
    fixture: &'static str,
    state: LifecycleState,
    handle: Option<H>,
}

impl<H> Lifecycle<H> {
    /// Create a lifecycle for the named fixture type.
    pub const fn new(fixture: &'static str) -> Self {
        Self {
            fixture,
            state: LifecycleState::Unstarted,
            handle: None,
        }
    }

    /// Current state.
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// Name of the fixture type this lifecycle belongs to.
    pub const fn fixture(&self) -> &'static str {
        self.fixture
    }

    /// Check that `start()` is allowed. Only valid from `Unstarted`.
    pub fn ensure_startable(&self) -> FixtureResult<()> {
        match self.state {
            LifecycleState::Unstarted => Ok(()),
            state => Err(self.invalid("start", state)),
        }
    }

    /// Install the freshly created handle and transition to `Running`.
    pub fn mark_running(&mut self, handle: H) -> FixtureResult<()> {
        self.ensure_startable()?;
        debug!(fixture = self.fixture, "Fixture running");
        self.handle = Some(handle);
        self.state = LifecycleState::Running;
        Ok(())
    }

    /// Transition to `Stopped`, returning the handle to release.
    ///
    /// Returns `Ok(None)` when stopping a fixture that never started.
    pub fn begin_stop(&mut self) -> FixtureResult<Option<H>> {
        match self.state {
            LifecycleState::Running => {
                debug!(fixture = self.fixture, "Fixture stopping");
                self.state = LifecycleState::Stopped;
                Ok(self.handle.take())
            }
            LifecycleState::Unstarted => {
                debug!(fixture = self.fixture, "Stopping fixture that never started");
                self.state = LifecycleState::Stopped;
                Ok(None)
            }
            LifecycleState::Stopped => Err(self.invalid("stop", LifecycleState::Stopped)),
        }
    }

    /// Borrow the backing handle. Only valid while `Running`.
    pub fn handle(&self) -> FixtureResult<&H> {
        match (&self.handle, self.state) {
            (Some(handle), LifecycleState::Running) => Ok(handle),
            (_, state) => Err(self.invalid("use", state)),
        }
    }

    fn invalid(&self, operation: &'static str, state: LifecycleState) -> FixtureError {
        FixtureError::InvalidState {
            fixture: self.fixture,
            operation,
            state,
        }
    }
}

impl<H> Drop for Lifecycle<H> {
    fn drop(&mut self) {
        if self.state == LifecycleState::Running {
            warn!(
                fixture = self.fixture,
                "Fixture dropped while running; backing handle released without teardown"
            );
        }
    }
}

impl<H> fmt::Debug for Lifecycle<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("fixture", &self.fixture)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_then_stop() {
        let mut lifecycle = Lifecycle::new("Test");
        assert_eq!(lifecycle.state(), LifecycleState::Unstarted);

        lifecycle.mark_running(7_u32).unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Running);
        assert_eq!(*lifecycle.handle().unwrap(), 7);

        assert_eq!(lifecycle.begin_stop().unwrap(), Some(7));
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    }

    #[test]
    fn test_second_start_is_rejected() {
        let mut lifecycle = Lifecycle::new("Test");
        lifecycle.mark_running(1_u32).unwrap();

        let err = lifecycle.mark_running(2).unwrap_err();
        assert!(err.is_invalid_state());
        assert_eq!(*lifecycle.handle().unwrap(), 1);
        lifecycle.begin_stop().unwrap();
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let mut lifecycle = Lifecycle::<u32>::new("Test");
        assert_eq!(lifecycle.begin_stop().unwrap(), None);
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    }

    #[test]
    fn test_nothing_is_valid_after_stop() {
        let mut lifecycle = Lifecycle::new("Test");
        lifecycle.mark_running(1_u32).unwrap();
        lifecycle.begin_stop().unwrap();

        assert!(lifecycle.handle().unwrap_err().is_invalid_state());
        assert!(lifecycle.ensure_startable().unwrap_err().is_invalid_state());
        assert!(lifecycle.begin_stop().unwrap_err().is_invalid_state());
    }

    #[test]
    fn test_handle_unavailable_before_start() {
        let lifecycle = Lifecycle::<u32>::new("Test");
        let err = lifecycle.handle().unwrap_err();
        assert_eq!(err.to_string(), "Cannot use fixture 'Test' while unstarted");
    }

    #[test]
    fn test_state_display() {
        assert_eq!(LifecycleState::Unstarted.to_string(), "unstarted");
        assert_eq!(LifecycleState::Stopped.to_string(), "stopped");
    }
}
