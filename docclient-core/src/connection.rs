//! Connection lifecycle.
//!
//! A [`ConnectionManager`] owns a registry of connections keyed by endpoint.
//! Every successful [`connect`](ConnectionManager::connect) hands out a
//! [`ClientHandle`], a lease on the shared connection for that endpoint. The
//! connection is torn down when its last lease goes away.
//!
//! Concurrent connects to the same endpoint share a single initialization: the
//! first caller runs the connector while the others wait on the same slot and
//! receive the same connection. A failed initialization leaves the slot empty,
//! so a later connect tries again.

use parking_lot::Mutex;
use std::{collections::HashMap, fmt, sync::Arc};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    collection::{CollectionHandle, DatabaseHandle},
    config::ClientConfig,
    dispatcher::OperationDispatcher,
    driver::{DriverClient, DriverConnector},
    endpoint::Endpoint,
    error::{ConnectionError, ValidationError},
};

struct Slot<D> {
    id: Uuid,
    connection: OnceCell<Arc<D>>,
}

struct Entry<D> {
    slot: Arc<Slot<D>>,
    leases: usize,
}

type Registry<D> = Arc<Mutex<HashMap<Endpoint, Entry<D>>>>;

/// Bookkeeping for one outstanding handle. Releasing happens at most once,
/// either explicitly or on drop.
struct Lease<D> {
    registry: Registry<D>,
    endpoint: Endpoint,
    slot: Arc<Slot<D>>,
    released: bool,
}

impl<D> Lease<D> {
    fn acquire(registry: &Registry<D>, endpoint: &Endpoint) -> Self {
        let slot = {
            let mut entries = registry.lock();
            let entry = entries.entry(endpoint.clone()).or_insert_with(|| Entry {
                slot: Arc::new(Slot {
                    id: Uuid::new_v4(),
                    connection: OnceCell::new(),
                }),
                leases: 0,
            });
            entry.leases += 1;
            entry.slot.clone()
        };

        Self {
            registry: registry.clone(),
            endpoint: endpoint.clone(),
            slot,
            released: false,
        }
    }

    /// Gives the lease back. Returns `true` if it was the last one on its connection.
    fn detach(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;

        let mut entries = self.registry.lock();
        let Some(entry) = entries.get_mut(&self.endpoint) else {
            return false;
        };
        if !Arc::ptr_eq(&entry.slot, &self.slot) {
            return false;
        }

        entry.leases -= 1;
        if entry.leases == 0 {
            entries.remove(&self.endpoint);
            return true;
        }

        false
    }
}

impl<D> Drop for Lease<D> {
    fn drop(&mut self) {
        if self.detach() {
            debug!(endpoint = %self.endpoint, "last handle dropped, connection closed");
        }
    }
}

/// A lease on an established connection.
///
/// Handles are cheap to hold and safe to share between tasks by reference.
/// Database and collection handles borrow a client handle, so it cannot be
/// released while any of them is alive.
pub struct ClientHandle<D: DriverClient> {
    lease: Lease<D>,
    client: Arc<D>,
}

impl<D: DriverClient> ClientHandle<D> {
    /// The endpoint this handle is connected to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.lease.endpoint
    }

    /// Identifier of the underlying connection. Handles sharing a connection
    /// report the same id; a connection re-established after teardown gets a
    /// new one.
    pub fn connection_id(&self) -> Uuid {
        self.lease.slot.id
    }

    /// Whether both handles lease the same underlying connection.
    pub fn shares_connection_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.client, &other.client)
    }

    /// Derives a database handle.
    pub fn database(&self, name: impl Into<String>) -> Result<DatabaseHandle<'_, D>, ValidationError> {
        DatabaseHandle::of(self, name)
    }

    /// Derives a collection handle.
    pub fn collection(
        &self,
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Result<CollectionHandle<'_, D>, ValidationError> {
        CollectionHandle::of(self, database, collection)
    }

    /// Releases the lease, shutting the driver down if it was the last one.
    ///
    /// Dropping a handle releases it too, but without waiting for the driver to
    /// close its resources.
    pub async fn release(self) {
        let Self { mut lease, client } = self;
        let endpoint = lease.endpoint.clone();

        if !lease.detach() {
            debug!(%endpoint, "handle released");
            return;
        }
        drop(lease);

        match Arc::try_unwrap(client) {
            Ok(client) => match client.shutdown().await {
                Ok(()) => info!(%endpoint, "connection closed"),
                Err(err) => warn!(%endpoint, error = %err, "driver shutdown failed"),
            },
            Err(_) => warn!(%endpoint, "connection still referenced, skipping driver shutdown"),
        }
    }

    pub(crate) fn driver(&self) -> &D {
        &self.client
    }
}

impl<D: DriverClient> fmt::Debug for ClientHandle<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("endpoint", &self.lease.endpoint)
            .field("connection", &self.lease.slot.id)
            .finish()
    }
}

/// Creates and tracks connections for one connector.
///
/// # Example
///
/// ```ignore
/// let config = ClientConfig::resolve(None)?;
/// let manager = ConnectionManager::new(InMemoryConnector::new(), config);
///
/// let client = manager.connect_default().await?;
/// let customers = client.collection("shop", "customers")?;
/// manager.dispatcher().insert_one(&customers, doc! { "name": "Ann" }).await?;
/// manager.release(client).await;
/// ```
pub struct ConnectionManager<C: DriverConnector> {
    connector: C,
    config: ClientConfig,
    registry: Registry<C::Client>,
}

impl<C: DriverConnector> ConnectionManager<C> {
    pub fn new(connector: C, config: ClientConfig) -> Self {
        Self {
            connector,
            config,
            registry: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Connects to `endpoint`, reusing the live connection if there is one.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::InvalidEndpoint`] if the string is malformed or its
    ///   scheme is not handled by the connector; no connection is attempted
    /// - [`ConnectionError::Refused`], [`ConnectionError::AuthFailed`] or
    ///   [`ConnectionError::Timeout`] as reported by the connector
    pub async fn connect(&self, endpoint: &str) -> Result<ClientHandle<C::Client>, ConnectionError> {
        let endpoint = Endpoint::parse(endpoint)?;
        self.connect_endpoint(&endpoint).await
    }

    /// Connects to the endpoint resolved into the configuration.
    pub async fn connect_default(&self) -> Result<ClientHandle<C::Client>, ConnectionError> {
        let endpoint = self.config.endpoint.clone();
        self.connect_endpoint(&endpoint).await
    }

    /// Connects to an already parsed endpoint.
    pub async fn connect_endpoint(
        &self,
        endpoint: &Endpoint,
    ) -> Result<ClientHandle<C::Client>, ConnectionError> {
        if !self.connector.supports(endpoint) {
            return Err(ConnectionError::InvalidEndpoint {
                endpoint: endpoint.redacted(),
                reason: format!(
                    "unsupported scheme '{}', expected one of: {}",
                    endpoint.scheme(),
                    self.connector.schemes().join(", ")
                ),
            });
        }

        let lease = Lease::acquire(&self.registry, endpoint);
        let after = self.config.connect_timeout;

        // On error the lease is dropped here and the slot stays uninitialized.
        let client = lease
            .slot
            .connection
            .get_or_try_init(|| async {
                info!(%endpoint, "establishing connection");
                match tokio::time::timeout(after, self.connector.connect(endpoint)).await {
                    Ok(Ok(client)) => Ok(Arc::new(client)),
                    Ok(Err(err)) => {
                        warn!(%endpoint, error = %err, "connection failed");
                        Err(err)
                    }
                    Err(_) => {
                        warn!(%endpoint, ?after, "connection timed out");
                        Err(ConnectionError::Timeout {
                            endpoint: endpoint.redacted(),
                            after,
                        })
                    }
                }
            })
            .await?
            .clone();

        debug!(%endpoint, connection = %lease.slot.id, "handle acquired");
        Ok(ClientHandle { lease, client })
    }

    /// Releases a handle. Equivalent to [`ClientHandle::release`].
    pub async fn release(&self, handle: ClientHandle<C::Client>) {
        handle.release().await;
    }

    /// Number of established connections with at least one outstanding handle.
    pub fn live_connections(&self) -> usize {
        self.registry
            .lock()
            .values()
            .filter(|entry| entry.slot.connection.initialized())
            .count()
    }

    /// A dispatcher using the configured operation timeout.
    pub fn dispatcher(&self) -> OperationDispatcher {
        match self.config.operation_timeout {
            Some(timeout) => OperationDispatcher::new().with_timeout(timeout),
            None => OperationDispatcher::new(),
        }
    }
}

impl<C: DriverConnector> fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connector", &self.connector)
            .field("config", &self.config)
            .field("live_connections", &self.live_connections())
            .finish()
    }
}
