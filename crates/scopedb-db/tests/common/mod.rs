//! Shared helpers for fixture integration tests.

#![allow(dead_code)]

use std::path::Path;

use tempfile::TempDir;

/// `sqlx` URL for a file-backed `SQLite` database inside `dir`.
///
/// Remote-fixture tests use a file rather than `sqlite::memory:` because
/// the `Any` driver parses the URL per connection, which would give every
/// pooled connection its own in-memory database.
pub fn sqlite_url(dir: &TempDir) -> String {
    format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("server.db").display()
    )
}

/// Write a `neoserver.properties` file into `dir`.
pub fn write_properties(dir: &Path, contents: &str) {
    std::fs::write(dir.join("neoserver.properties"), contents).unwrap();
}

pub fn init() {
    scopedb_db::init_test_logging();
}
