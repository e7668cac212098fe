//! Connection configuration for remote fixtures.
//!
//! A [`ConnectionConfig`] comes from exactly one source, chosen by
//! [`ConfigResolver`] in priority order: explicit values, then a
//! [`Properties`] object, then a [`PropertiesResource`] on the search path.

mod properties;

pub use properties::{Properties, PropertiesResource, RESOURCE_PATH_ENV};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

/// Property key holding the server address.
pub const URL_KEY: &str = "neoserver.url";
/// Property key holding the username.
pub const USERNAME_KEY: &str = "neoserver.username";
/// Property key holding the password.
pub const PASSWORD_KEY: &str = "neoserver.password";

/// Resource name used when no other configuration source is given.
pub const DEFAULT_RESOURCE_NAME: &str = "neoserver.properties";

/// Address and optional credentials for a database server.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub address: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Basic-auth credentials, present only when both halves are configured.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ConnectionConfig {
    /// Configuration with an address and no credentials.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            ..Self::default()
        }
    }

    /// Set the username.
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Build from the `neoserver.*` keys of a property set.
    pub fn from_properties(props: &Properties) -> Self {
        Self {
            address: props.get(URL_KEY).map(str::to_string),
            username: props.get(USERNAME_KEY).map(str::to_string),
            password: props.get(PASSWORD_KEY).map(str::to_string),
        }
    }

    /// The configured address.
    pub fn address(&self) -> Result<&str, ConfigError> {
        self.address
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .ok_or(ConfigError::MissingAddress)
    }

    /// Validated credentials.
    ///
    /// `Ok(None)` means connect anonymously. Supplying only one of username
    /// and password is an error naming the missing half.
    pub fn credentials(&self) -> Result<Option<Credentials>, ConfigError> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Ok(Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            })),
            (None, None) => Ok(None),
            (Some(_), None) => Err(ConfigError::MissingPassword),
            (None, Some(_)) => Err(ConfigError::MissingUsername),
        }
    }

    /// Check the whole configuration: address present, credentials consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.address()?;
        self.credentials()?;
        Ok(())
    }
}

/// One configuration source.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// Values passed directly by the caller.
    Explicit(ConnectionConfig),
    /// An in-memory property set.
    Properties(Properties),
    /// A properties file located on a search path.
    Resource(PropertiesResource),
}

impl ConfigSource {
    /// Produce the configuration this source describes.
    pub fn load(&self) -> Result<ConnectionConfig, ConfigError> {
        match self {
            Self::Explicit(config) => Ok(config.clone()),
            Self::Properties(props) => Ok(ConnectionConfig::from_properties(props)),
            Self::Resource(resource) => {
                let props = resource.load()?;
                Ok(ConnectionConfig::from_properties(&props))
            }
        }
    }

    const fn label(&self) -> &'static str {
        match self {
            Self::Explicit(_) => "explicit",
            Self::Properties(_) => "properties",
            Self::Resource(_) => "resource",
        }
    }
}

/// Picks the highest-priority configuration source that was supplied.
///
/// # Example
///
/// ```
/// use scopedb_core::config::{ConfigResolver, ConnectionConfig, Properties};
///
/// let resolver = ConfigResolver::new()
///     .with_properties(Properties::new().with("neoserver.url", "sqlite::memory:"))
///     .with_explicit(ConnectionConfig::new("postgres://localhost/test"));
///
/// let config = resolver.resolve().unwrap();
/// assert_eq!(config.address().unwrap(), "postgres://localhost/test");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    explicit: Option<ConnectionConfig>,
    properties: Option<Properties>,
    resource: Option<PropertiesResource>,
}

impl ConfigResolver {
    /// Resolver with no sources; resolving falls back to the default resource.
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_explicit(mut self, config: ConnectionConfig) -> Self {
        self.explicit = Some(config);
        self
    }

    #[must_use]
    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = Some(properties);
        self
    }

    #[must_use]
    pub fn with_resource(mut self, resource: PropertiesResource) -> Self {
        self.resource = Some(resource);
        self
    }

    /// The source that [`ConfigResolver::resolve`] will read.
    pub fn source(&self) -> ConfigSource {
        if let Some(config) = &self.explicit {
            ConfigSource::Explicit(config.clone())
        } else if let Some(props) = &self.properties {
            ConfigSource::Properties(props.clone())
        } else {
            ConfigSource::Resource(
                self.resource
                    .clone()
                    .unwrap_or_else(|| PropertiesResource::new(DEFAULT_RESOURCE_NAME)),
            )
        }
    }

    /// Load the configuration from the winning source.
    ///
    /// Validation of the loaded values is left to the caller, so a fixture
    /// can report credential problems when it starts.
    pub fn resolve(&self) -> Result<ConnectionConfig, ConfigError> {
        let source = self.source();
        debug!(source = source.label(), "Resolving connection configuration");
        source.load()
    }
}
