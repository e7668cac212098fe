#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod scope;

pub use config::{
    ConfigResolver, ConfigSource, ConnectionConfig, Credentials, Properties, PropertiesResource,
};
pub use error::{ConfigError, FixtureError, FixtureResult};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use logging::init_test_logging;
pub use scope::{ScopedResource, run_in_scope};
