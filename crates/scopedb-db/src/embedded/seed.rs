//! Seed scripts run once when an embedded fixture starts.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// A script executed verbatim right after the database is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedScript {
    text: String,
}

impl SeedScript {
    /// Use literal script text.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Read every line from `reader`, joined with `\n`.
    pub fn from_reader<R: BufRead>(reader: R) -> io::Result<Self> {
        let lines = reader.lines().collect::<io::Result<Vec<_>>>()?;
        Ok(Self {
            text: lines.join("\n"),
        })
    }

    /// Read a script file.
    pub fn from_file(path: impl AsRef<Path>) -> io::Result<Self> {
        Self::from_reader(BufReader::new(File::open(path)?))
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl From<&str> for SeedScript {
    fn from(text: &str) -> Self {
        Self::from_text(text)
    }
}

impl From<String> for SeedScript {
    fn from(text: String) -> Self {
        Self::from_text(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_reader_lines_are_joined() {
        let source = "CREATE TABLE t (n INTEGER);\r\nINSERT INTO t VALUES (1);\n";
        let seed = SeedScript::from_reader(source.as_bytes()).unwrap();
        assert_eq!(
            seed.as_str(),
            "CREATE TABLE t (n INTEGER);\nINSERT INTO t VALUES (1);"
        );
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "CREATE TABLE a (x);").unwrap();
        writeln!(file, "CREATE TABLE b (y);").unwrap();

        let seed = SeedScript::from_file(file.path()).unwrap();
        assert_eq!(seed.as_str(), "CREATE TABLE a (x);\nCREATE TABLE b (y);");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SeedScript::from_file(dir.path().join("nope.sql")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
