//! Error types shared by every fixture.
//!
//! Adapters map their driver errors into [`FixtureError`] at the boundary so
//! test code only ever sees one error type from a fixture.

use std::path::PathBuf;

use thiserror::Error;

use crate::lifecycle::LifecycleState;

/// Result type alias for fixture operations.
pub type FixtureResult<T> = Result<T, FixtureError>;

/// Errors raised while resolving or validating connection configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No configuration source was given and the properties resource
    /// could not be located.
    #[error("Configuration resource '{name}' not found (searched: {})", display_paths(.searched))]
    NotFound {
        /// File name of the resource that was looked up
        name: String,
        /// Directories that were searched, in order
        searched: Vec<PathBuf>,
    },

    /// No server address was configured.
    #[error("No server address configured")]
    MissingAddress,

    /// A password was configured without a username.
    #[error("Password is set but username is missing")]
    MissingUsername,

    /// A username was configured without a password.
    #[error("Username is set but password is missing")]
    MissingPassword,

    /// The configured address could not be parsed.
    #[error("Invalid server address '{address}': {reason}")]
    InvalidAddress {
        /// The address as configured
        address: String,
        /// Parser error message
        reason: String,
    },

    /// The properties resource exists but could not be read.
    #[error("Failed to read '{path}': {source}")]
    Io {
        /// Path of the resource
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors surfaced by fixture lifecycle and delegated operations.
#[derive(Debug, Error)]
pub enum FixtureError {
    /// Configuration was missing or inconsistent; the fixture never started.
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// An operation was attempted in a lifecycle state that does not allow it.
    #[error("Cannot {operation} fixture '{fixture}' while {state}")]
    InvalidState {
        /// Name of the fixture type
        fixture: &'static str,
        /// Operation that was rejected
        operation: &'static str,
        /// State the fixture was in
        state: LifecycleState,
    },

    /// The seed script failed during startup.
    #[error("Seed script failed: {0}")]
    Seed(String),

    /// The backing engine or driver reported an error.
    #[error("Backend error: {0}")]
    Backend(String),

    /// A session was used after it had been closed.
    #[error("Session {0} is closed")]
    SessionClosed(u64),

    /// A scoped unit of work was requested while another one is still open.
    #[error("Fixture '{0}' already has an open scoped unit of work")]
    ScopeActive(&'static str),
}

impl FixtureError {
    /// Returns true if this error is a lifecycle state violation.
    pub const fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_lists_searched_paths() {
        let err = ConfigError::NotFound {
            name: "neoserver.properties".to_string(),
            searched: vec![PathBuf::from("."), PathBuf::from("resources")],
        };
        assert_eq!(
            err.to_string(),
            "Configuration resource 'neoserver.properties' not found (searched: ., resources)"
        );
    }

    #[test]
    fn test_configuration_error_is_transparent() {
        let err = FixtureError::from(ConfigError::MissingPassword);
        assert_eq!(err.to_string(), "Username is set but password is missing");
        assert!(!err.is_invalid_state());
    }

    #[test]
    fn test_invalid_state_message() {
        let err = FixtureError::InvalidState {
            fixture: "EmbeddedFixture",
            operation: "start",
            state: LifecycleState::Running,
        };
        assert!(err.is_invalid_state());
        assert_eq!(
            err.to_string(),
            "Cannot start fixture 'EmbeddedFixture' while running"
        );
    }
}
