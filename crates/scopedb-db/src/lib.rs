#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]

pub mod embedded;
pub mod remote;
pub mod runner;

pub use embedded::{CloseWatch, EmbeddedFixture, SeedScript, UnitOfWork};
pub use remote::{RemoteFixture, Session, TeardownReport};
pub use runner::QueryRunner;

// Fixture-facing core types, so tests only need one import path
pub use scopedb_core::{
    ConfigError, ConfigResolver, ConnectionConfig, FixtureError, FixtureResult, LifecycleState,
    Properties, PropertiesResource, ScopedResource, init_test_logging, run_in_scope,
};

// The bundled SQLite build is pulled in for its features only
use libsqlite3_sys as _;
