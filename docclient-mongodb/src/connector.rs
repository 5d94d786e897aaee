use async_trait::async_trait;
use bson::doc;
use mongodb::{Client, options::ClientOptions};
use std::time::Duration;
use tracing::debug;

use docclient_core::{driver::DriverConnector, endpoint::Endpoint, error::ConnectionError};

use crate::{error::connection_error, store::MongoDbClient};

/// Server selection timeout the driver uses when none is configured.
const DEFAULT_SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Connects to MongoDB deployments over `mongodb://` and `mongodb+srv://` endpoints.
///
/// Options set here override the same options given in the connection string.
/// A connection is only handed out after the deployment has answered a `ping`,
/// so unreachable servers and rejected credentials surface at connect time.
///
/// # Example
///
/// ```ignore
/// use docclient::mongodb::MongoDbConnector;
///
/// let connector = MongoDbConnector::builder()
///     .app_name("inventory")
///     .server_selection_timeout(Duration::from_secs(5))
///     .build();
/// let manager = ConnectionManager::new(connector, ClientConfig::from_env()?);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MongoDbConnector {
    app_name: Option<String>,
    connect_timeout: Option<Duration>,
    server_selection_timeout: Option<Duration>,
    max_pool_size: Option<u32>,
    min_pool_size: Option<u32>,
}

impl MongoDbConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> MongoDbConnectorBuilder {
        MongoDbConnectorBuilder::default()
    }

    fn apply(&self, options: &mut ClientOptions) {
        if let Some(app_name) = &self.app_name {
            options.app_name = Some(app_name.clone());
        }
        if let Some(timeout) = self.connect_timeout {
            options.connect_timeout = Some(timeout);
        }
        if let Some(timeout) = self.server_selection_timeout {
            options.server_selection_timeout = Some(timeout);
        }
        if let Some(size) = self.max_pool_size {
            options.max_pool_size = Some(size);
        }
        if let Some(size) = self.min_pool_size {
            options.min_pool_size = Some(size);
        }
    }
}

#[async_trait]
impl DriverConnector for MongoDbConnector {
    type Client = MongoDbClient;

    fn schemes(&self) -> &[&'static str] {
        &["mongodb", "mongodb+srv"]
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<MongoDbClient, ConnectionError> {
        let mut options = ClientOptions::parse(endpoint.as_str())
            .await
            .map_err(|err| connection_error(endpoint, err, DEFAULT_SERVER_SELECTION_TIMEOUT))?;
        self.apply(&mut options);

        let waited = options
            .server_selection_timeout
            .unwrap_or(DEFAULT_SERVER_SELECTION_TIMEOUT);

        let client = Client::with_options(options).map_err(|err| connection_error(endpoint, err, waited))?;

        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|err| connection_error(endpoint, err, waited))?;

        debug!(%endpoint, "connected to MongoDB");
        Ok(MongoDbClient::new(client))
    }
}

/// Builder for [`MongoDbConnector`].
#[derive(Debug, Default)]
pub struct MongoDbConnectorBuilder {
    connector: MongoDbConnector,
}

impl MongoDbConnectorBuilder {
    /// Name reported to the server in the connection handshake.
    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.connector.app_name = Some(app_name.into());
        self
    }

    /// Timeout for establishing each socket connection.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connector.connect_timeout = Some(timeout);
        self
    }

    /// How long the driver waits for a suitable server before giving up.
    pub fn server_selection_timeout(mut self, timeout: Duration) -> Self {
        self.connector.server_selection_timeout = Some(timeout);
        self
    }

    pub fn max_pool_size(mut self, size: u32) -> Self {
        self.connector.max_pool_size = Some(size);
        self
    }

    pub fn min_pool_size(mut self, size: u32) -> Self {
        self.connector.min_pool_size = Some(size);
        self
    }

    pub fn build(self) -> MongoDbConnector {
        self.connector
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(raw: &str) -> Endpoint {
        Endpoint::parse(raw).unwrap()
    }

    #[test]
    fn accepts_mongodb_schemes() {
        let connector = MongoDbConnector::new();

        assert!(connector.supports(&endpoint("mongodb://localhost:27017")));
        assert!(connector.supports(&endpoint("mongodb+srv://cluster.example.com")));
        assert!(!connector.supports(&endpoint("memory://local")));
    }

    #[tokio::test]
    async fn builder_options_override_the_connection_string() {
        let connector = MongoDbConnector::builder()
            .app_name("inventory")
            .server_selection_timeout(Duration::from_secs(2))
            .max_pool_size(4)
            .build();
        let mut options = ClientOptions::parse("mongodb://localhost:27017/?maxPoolSize=50&appName=other")
            .await
            .unwrap();

        connector.apply(&mut options);

        assert_eq!(options.app_name.as_deref(), Some("inventory"));
        assert_eq!(options.server_selection_timeout, Some(Duration::from_secs(2)));
        assert_eq!(options.max_pool_size, Some(4));
    }

    #[tokio::test]
    async fn invalid_options_are_an_invalid_endpoint() {
        let err = MongoDbConnector::new()
            .connect(&endpoint("mongodb://localhost:27017/?maxPoolSize=lots"))
            .await
            .unwrap_err();

        assert!(matches!(err, ConnectionError::InvalidEndpoint { .. }), "{err}");
    }

    #[tokio::test]
    async fn unreachable_server_fails_to_connect() {
        let connector = MongoDbConnector::builder()
            .server_selection_timeout(Duration::from_millis(200))
            .build();

        let err = connector.connect(&endpoint("mongodb://127.0.0.1:1")).await.unwrap_err();

        assert!(
            matches!(err, ConnectionError::Refused { .. } | ConnectionError::Timeout { .. }),
            "{err}"
        );
    }

    #[tokio::test]
    #[ignore = "requires a MongoDB server at CONNECTION_URL"]
    async fn connects_and_pings_live_server() {
        let raw = std::env::var("CONNECTION_URL").unwrap();
        let client = MongoDbConnector::new().connect(&endpoint(&raw)).await.unwrap();

        docclient_core::driver::DriverClient::ping(&client).await.unwrap();
    }
}
