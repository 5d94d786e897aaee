//! Connector for named in-memory servers.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tracing::debug;

use docclient_core::{driver::DriverConnector, endpoint::Endpoint, error::ConnectionError};

use crate::store::{InMemoryClient, ServerState};

/// URL scheme handled by [`InMemoryConnector`].
pub const MEMORY_SCHEME: &str = "memory";

#[derive(Debug, Default)]
struct ConnectorOptions {
    credentials: Option<(String, String)>,
    offline: HashSet<String>,
    connect_latency: Duration,
    operation_latency: Duration,
}

/// Connects to in-process servers addressed as `memory://<name>`.
///
/// Servers are created on first connect and live as long as the connector (or
/// any clone of it), so data survives a connection being torn down and
/// re-established. The builder can make servers require credentials, refuse
/// connections or respond slowly.
///
/// # Example
///
/// ```ignore
/// use docclient::memory::InMemoryConnector;
/// use std::time::Duration;
///
/// let connector = InMemoryConnector::builder()
///     .credentials("app", "secret")
///     .offline("backup")
///     .connect_latency(Duration::from_millis(5))
///     .build();
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryConnector {
    servers: Arc<Mutex<HashMap<String, ServerState>>>,
    options: Arc<ConnectorOptions>,
    attempts: Arc<AtomicUsize>,
}

impl InMemoryConnector {
    /// Creates a connector with no credentials, latency or offline servers.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> InMemoryConnectorBuilder {
        InMemoryConnectorBuilder::default()
    }

    /// Number of connection attempts made through this connector and its clones.
    pub fn connect_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn server(&self, name: &str) -> ServerState {
        self.servers.lock().entry(name.to_string()).or_default().clone()
    }
}

#[async_trait]
impl DriverConnector for InMemoryConnector {
    type Client = InMemoryClient;

    fn schemes(&self) -> &[&'static str] {
        &[MEMORY_SCHEME]
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<InMemoryClient, ConnectionError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if !self.options.connect_latency.is_zero() {
            tokio::time::sleep(self.options.connect_latency).await;
        }

        let name = endpoint.primary_host().name.to_ascii_lowercase();

        if self.options.offline.contains(&name) {
            return Err(ConnectionError::Refused {
                endpoint: endpoint.redacted(),
                message: format!("server '{name}' is offline"),
            });
        }

        if let Some((username, password)) = &self.options.credentials {
            let supplied = (endpoint.username(), endpoint.password());
            if supplied != (Some(username.as_str()), Some(password.as_str())) {
                return Err(ConnectionError::AuthFailed {
                    endpoint: endpoint.redacted(),
                    message: "invalid username or password".to_string(),
                });
            }
        }

        debug!(server = %name, "connected to in-memory server");
        Ok(InMemoryClient::new(
            name.clone(),
            self.server(&name),
            self.options.operation_latency,
        ))
    }
}

/// Builder for [`InMemoryConnector`].
#[derive(Debug, Default)]
pub struct InMemoryConnectorBuilder {
    options: ConnectorOptions,
}

impl InMemoryConnectorBuilder {
    /// Requires every connection to authenticate with these credentials.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.options.credentials = Some((username.into(), password.into()));
        self
    }

    /// Makes connections to the named server fail as refused.
    pub fn offline(mut self, server: impl Into<String>) -> Self {
        self.options.offline.insert(server.into().to_ascii_lowercase());
        self
    }

    /// Delay before each connection attempt completes.
    pub fn connect_latency(mut self, latency: Duration) -> Self {
        self.options.connect_latency = latency;
        self
    }

    /// Delay before each operation on a connected client runs.
    pub fn operation_latency(mut self, latency: Duration) -> Self {
        self.options.operation_latency = latency;
        self
    }

    pub fn build(self) -> InMemoryConnector {
        InMemoryConnector {
            options: Arc::new(self.options),
            ..InMemoryConnector::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docclient_core::{collection::Namespace, driver::DriverClient};

    fn endpoint(raw: &str) -> Endpoint {
        Endpoint::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn clients_of_one_server_share_data() {
        let connector = InMemoryConnector::new();
        let ns = Namespace::new("db", "c").unwrap();

        let writer = connector.connect(&endpoint("memory://alpha")).await.unwrap();
        writer.insert_one(&ns, doc! { "a": 1 }).await.unwrap();

        let reader = connector.clone().connect(&endpoint("memory://ALPHA")).await.unwrap();
        assert!(reader.find_one(&ns, doc! { "a": 1 }).await.unwrap().is_some());

        let other = connector.connect(&endpoint("memory://beta")).await.unwrap();
        assert!(other.find_one(&ns, doc! {}).await.unwrap().is_none());
        assert_eq!(connector.connect_attempts(), 3);
    }

    #[tokio::test]
    async fn offline_server_refuses() {
        let connector = InMemoryConnector::builder().offline("down").build();

        let err = connector.connect(&endpoint("memory://down")).await.unwrap_err();

        assert!(matches!(err, ConnectionError::Refused { .. }));
        assert!(connector.connect(&endpoint("memory://up")).await.is_ok());
    }

    #[tokio::test]
    async fn credentials_are_checked() {
        let connector = InMemoryConnector::builder().credentials("app", "s3cret").build();

        assert!(connector.connect(&endpoint("memory://app:s3cret@db")).await.is_ok());

        for raw in ["memory://db", "memory://app:wrong@db", "memory://other:s3cret@db"] {
            let err = connector.connect(&endpoint(raw)).await.unwrap_err();
            assert!(matches!(err, ConnectionError::AuthFailed { .. }), "{raw}");
            assert!(!err.to_string().contains("s3cret"));
            assert!(!err.to_string().contains("wrong"));
        }
    }

    #[test]
    fn accepts_only_memory_scheme() {
        let connector = InMemoryConnector::new();

        assert!(connector.supports(&endpoint("memory://x")));
        assert!(!connector.supports(&endpoint("mongodb://x")));
    }
}
