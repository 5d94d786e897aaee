//! Client configuration.
//!
//! The endpoint is the only setting read from the environment. It is resolved
//! once, at startup, with the precedence:
//!
//! 1. an explicit argument
//! 2. the `CONNECTION_URL` environment variable
//! 3. failure with [`ConfigError::MissingEndpoint`]
//!
//! A supplied but malformed endpoint fails with [`ConfigError::InvalidEndpoint`];
//! it never falls through to the next source.

use std::{env, time::Duration};
use tracing::debug;

use crate::{endpoint::Endpoint, error::ConfigError};

/// Environment variable consulted when no endpoint is passed explicitly.
pub const ENDPOINT_ENV_VAR: &str = "CONNECTION_URL";

/// Upper bound on a single connection attempt unless configured otherwise.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolved client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Endpoint used by [`ConnectionManager::connect_default`](crate::connection::ConnectionManager::connect_default).
    pub endpoint: Endpoint,
    /// Upper bound on establishing a connection.
    pub connect_timeout: Duration,
    /// Default upper bound on each dispatched operation. `None` waits indefinitely.
    pub operation_timeout: Option<Duration>,
}

impl ClientConfig {
    /// Creates a configuration for an explicit endpoint.
    pub fn new(endpoint: &str) -> Result<Self, ConfigError> {
        Ok(Self::from_endpoint(
            Endpoint::parse(endpoint).map_err(ConfigError::InvalidEndpoint)?,
        ))
    }

    /// Creates a configuration from an already parsed endpoint.
    pub fn from_endpoint(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            operation_timeout: None,
        }
    }

    /// Resolves the endpoint from `explicit`, falling back to `CONNECTION_URL`.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::MissingEndpoint`] if neither source provides an endpoint
    /// - [`ConfigError::InvalidEndpoint`] if the chosen source is malformed
    pub fn resolve(explicit: Option<&str>) -> Result<Self, ConfigError> {
        match explicit {
            Some(endpoint) => {
                debug!("Using explicitly supplied endpoint");
                Self::new(endpoint)
            }
            None => match env::var(ENDPOINT_ENV_VAR) {
                Ok(endpoint) => {
                    debug!(var = ENDPOINT_ENV_VAR, "Using endpoint from environment");
                    Self::new(&endpoint)
                }
                Err(_) => Err(ConfigError::MissingEndpoint(ENDPOINT_ENV_VAR.to_string())),
            },
        }
    }

    /// Resolves the endpoint from `CONNECTION_URL` only.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve(None)
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }
}
