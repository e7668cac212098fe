//! Properties-file loading.
//!
//! The format is the usual one for test resources. Each entry is a key
//! followed by `=`, `:` or whitespace and then the value; `#` and `!` start
//! comment lines. A line ending in an unescaped backslash continues on the
//! next line. Backslash escapes (`\t`, `\n`, `\uXXXX`, `\=`, ...) work in
//! keys and values. Later duplicates override earlier ones.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ConfigError;

/// Environment variable holding extra directories to search for resources.
pub const RESOURCE_PATH_ENV: &str = "SCOPEDB_RESOURCE_PATH";

/// Directories searched after [`RESOURCE_PATH_ENV`], relative to the
/// working directory.
const DEFAULT_SEARCH_ROOTS: &[&str] = &[".", "resources", "tests/resources"];

/// A parsed set of string properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: BTreeMap<String, String>,
}

impl Properties {
    /// Create an empty property set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse properties from text.
    pub fn parse(text: &str) -> Self {
        let entries = logical_lines(text)
            .iter()
            .map(|line| {
                let (key, value) = split_entry(line);
                (unescape(key), unescape(value))
            })
            .collect();

        Self { entries }
    }

    /// Read and parse a properties file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&text))
    }

    /// Set a property, replacing any previous value.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Look up a property. Empty values are treated as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Join continued lines and drop blanks and comments.
fn logical_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut pending: Option<String> = None;

    for raw in text.lines() {
        let line = raw.trim_start();
        let mut current = match pending.take() {
            Some(prefix) => prefix,
            None if line.is_empty() || line.starts_with('#') || line.starts_with('!') => continue,
            None => String::new(),
        };

        if ends_with_continuation(line) {
            current.push_str(&line[..line.len() - 1]);
            pending = Some(current);
        } else {
            current.push_str(line);
            lines.push(current);
        }
    }

    lines.extend(pending);
    lines
}

fn ends_with_continuation(line: &str) -> bool {
    line.bytes().rev().take_while(|&b| b == b'\\').count() % 2 == 1
}

/// Split at the first unescaped `=`, `:` or whitespace. A bare key has an
/// empty value.
fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    let mut key_end = line.len();

    for (idx, ch) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '=' | ':' => return (&line[..idx], line[idx + 1..].trim_start()),
            c if c.is_whitespace() => {
                key_end = idx;
                break;
            }
            _ => {}
        }
    }

    let rest = line[key_end..].trim_start();
    let value = rest.strip_prefix(['=', ':']).map_or(rest, str::trim_start);
    (&line[..key_end], value)
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{c}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    // Malformed escapes are kept as written
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }

    out
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// A named properties resource located on a search path.
///
/// Stands in for a classpath resource: the first directory containing a
/// file called `name` wins.
#[derive(Debug, Clone)]
pub struct PropertiesResource {
    name: String,
    search_roots: Vec<PathBuf>,
}

impl PropertiesResource {
    /// Resource with the default search path: directories from
    /// `SCOPEDB_RESOURCE_PATH`, then `.`, `resources/`, `tests/resources/`.
    pub fn new(name: impl Into<String>) -> Self {
        let mut search_roots: Vec<PathBuf> = env::var_os(RESOURCE_PATH_ENV)
            .map(|paths| env::split_paths(&paths).collect())
            .unwrap_or_default();
        search_roots.extend(DEFAULT_SEARCH_ROOTS.iter().map(PathBuf::from));

        Self { name: name.into(), search_roots }
    }

    /// Resource searched only in the given directories.
    pub fn in_dirs<I, P>(name: impl Into<String>, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            name: name.into(),
            search_roots: dirs.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Find the first matching file on the search path.
    pub fn locate(&self) -> Result<PathBuf, ConfigError> {
        self.search_roots
            .iter()
            .map(|root| root.join(&self.name))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| ConfigError::NotFound {
                name: self.name.clone(),
                searched: self.search_roots.clone(),
            })
    }

    /// Locate and parse the resource.
    pub fn load(&self) -> Result<Properties, ConfigError> {
        let path = self.locate()?;
        debug!(path = %path.display(), "Loading properties resource");
        Properties::load(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_separators_and_comments() {
        let props = Properties::parse(
            "# server settings\n\
             ! legacy comment\n\
             neoserver.url = sqlite::memory:\n\
             neoserver.username: admin\n\
             \n\
             neoserver.password=s3cret=\n",
        );

        assert_eq!(props.len(), 3);
        assert_eq!(props.get("neoserver.url"), Some("sqlite::memory:"));
        assert_eq!(props.get("neoserver.username"), Some("admin"));
        // Only the first separator splits
        assert_eq!(props.get("neoserver.password"), Some("s3cret="));
    }

    #[test]
    fn test_empty_value_reads_as_absent() {
        let props = Properties::parse("neoserver.username=\nflag\n");
        assert_eq!(props.get("neoserver.username"), None);
        assert_eq!(props.get("flag"), None);
        assert_eq!(props.len(), 2);
    }

    #[test]
    fn test_whitespace_separates_key_and_value() {
        let props = Properties::parse("neoserver.url  sqlite::memory:\nname\t= neo\n");
        assert_eq!(props.get("neoserver.url"), Some("sqlite::memory:"));
        assert_eq!(props.get("name"), Some("neo"));
    }

    #[test]
    fn test_continuation_lines_join() {
        let props =
            Properties::parse("neoserver.url = postgres://db.local:5432/\\\n    scopedb\n# done\n");
        assert_eq!(
            props.get("neoserver.url"),
            Some("postgres://db.local:5432/scopedb")
        );
        assert_eq!(props.len(), 1);
    }

    #[test]
    fn test_escapes_are_decoded() {
        let props = Properties::parse(
            "path\\ with\\=sep = a\\tb\n\
             greeting = caf\\u00e9\n\
             literal = back\\\\slash\n",
        );
        assert_eq!(props.get("path with=sep"), Some("a\tb"));
        assert_eq!(props.get("greeting"), Some("café"));
        assert_eq!(props.get("literal"), Some("back\\slash"));
    }

    #[test]
    fn test_later_duplicate_wins() {
        let props = Properties::parse("a=1\na=2\n");
        assert_eq!(props.get("a"), Some("2"));
    }

    #[test]
    fn test_resource_first_root_wins() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::write(first.path().join("db.properties"), "a=first").unwrap();
        fs::write(second.path().join("db.properties"), "a=second").unwrap();

        let resource =
            PropertiesResource::in_dirs("db.properties", [first.path(), second.path()]);
        assert_eq!(resource.load().unwrap().get("a"), Some("first"));
    }

    #[test]
    fn test_resource_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let resource = PropertiesResource::in_dirs("missing.properties", [dir.path()]);

        match resource.load() {
            Err(ConfigError::NotFound { name, searched }) => {
                assert_eq!(name, "missing.properties");
                assert_eq!(searched, vec![dir.path().to_path_buf()]);
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }
}
