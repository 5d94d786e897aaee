//! Driver abstraction consumed by the client layer.
//!
//! This module defines the capability set a document-store driver must provide.
//! The client layer never speaks a wire protocol itself; it validates input,
//! hands it to a [`DriverClient`], and classifies the outcome.
//!
//! # Traits
//!
//! - [`DriverConnector`]: turns an [`Endpoint`] into a connected client
//! - [`DriverClient`]: the operations a connected client supports
//!
//! Any backend that can express databases, named collections of schemaless
//! records, filters and updates satisfies the contract, whether it stores
//! documents or wide rows.
//!
//! # Example
//!
//! ```ignore
//! use docclient::driver::{DriverClient, DriverConnector};
//! use docclient::memory::InMemoryConnector;
//! use bson::doc;
//!
//! let connector = InMemoryConnector::new();
//! let client = connector.connect(&"memory://local".parse()?).await?;
//! let namespace = Namespace::new("shop", "customers")?;
//! client.insert_one(&namespace, doc! { "name": "Alice" }).await?;
//! ```

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::{TryStreamExt, stream::BoxStream};
use std::fmt::Debug;

use crate::{
    collection::Namespace,
    endpoint::Endpoint,
    error::{ConnectionError, DriverError},
    query::FindOptions,
    results::{DeleteResult, UpdateResult},
};

/// A specialized `Result` type for driver calls.
pub type DriverResult<T> = Result<T, DriverError>;

/// A lazy, single-pass stream of documents produced by [`DriverClient::find`].
pub type DocumentStream = BoxStream<'static, DriverResult<Document>>;

/// Operations a connected driver client supports.
///
/// # Thread Safety
///
/// Implementations must be thread-safe. The client layer shares one instance
/// between every caller connected to the same endpoint and may issue operations
/// on it concurrently.
///
/// # Cancellation
///
/// Callers may drop any returned future before it completes (for example when a
/// timeout elapses). Implementations must leave their shared state consistent
/// when that happens.
///
/// # Error Handling
///
/// Every method reports failures as a [`DriverError`]; the dispatcher attaches
/// the operation name and namespace. Zero matches is never an error.
#[async_trait]
pub trait DriverClient: Send + Sync + Debug + 'static {
    /// Lists the names of all databases.
    async fn list_databases(&self) -> DriverResult<Vec<String>>;

    /// Drops a database and everything in it. Dropping a missing database succeeds.
    async fn drop_database(&self, database: &str) -> DriverResult<()>;

    /// Lists the names of the collections in a database.
    async fn list_collections(&self, database: &str) -> DriverResult<Vec<String>>;

    /// Creates an empty collection. Fails if it already exists.
    async fn create_collection(&self, namespace: &Namespace) -> DriverResult<()>;

    /// Drops a collection. Dropping a missing collection succeeds.
    async fn drop_collection(&self, namespace: &Namespace) -> DriverResult<()>;

    /// Inserts a document, generating an `_id` if it has none.
    ///
    /// # Returns
    ///
    /// The document's `_id`.
    async fn insert_one(&self, namespace: &Namespace, document: Document) -> DriverResult<Bson>;

    /// Inserts documents in order, generating `_id`s where missing.
    ///
    /// # Returns
    ///
    /// The `_id` of each document, in input order.
    async fn insert_many(
        &self,
        namespace: &Namespace,
        documents: Vec<Document>,
    ) -> DriverResult<Vec<Bson>>;

    /// Opens a cursor over the documents matching `filter`.
    ///
    /// An empty filter matches every document.
    async fn find(
        &self,
        namespace: &Namespace,
        filter: Document,
        options: FindOptions,
    ) -> DriverResult<DocumentStream>;

    /// Returns the first document matching `filter`, if any.
    ///
    /// The default implementation opens a cursor limited to one document.
    async fn find_one(&self, namespace: &Namespace, filter: Document) -> DriverResult<Option<Document>> {
        self.find(namespace, filter, FindOptions::builder().limit(1).build())
            .await?
            .try_next()
            .await
    }

    /// Applies `update` to the first document matching `filter`.
    async fn update_one(
        &self,
        namespace: &Namespace,
        filter: Document,
        update: Document,
    ) -> DriverResult<UpdateResult>;

    /// Applies `update` to every document matching `filter`.
    async fn update_many(
        &self,
        namespace: &Namespace,
        filter: Document,
        update: Document,
    ) -> DriverResult<UpdateResult>;

    /// Deletes the first document matching `filter`.
    async fn delete_one(&self, namespace: &Namespace, filter: Document) -> DriverResult<DeleteResult>;

    /// Deletes every document matching `filter`.
    async fn delete_many(&self, namespace: &Namespace, filter: Document) -> DriverResult<DeleteResult>;

    /// Round-trips to the server without touching data.
    async fn ping(&self) -> DriverResult<()>;

    /// Cleanly shuts down the client, releasing all resources.
    ///
    /// Called when the last lease on a connection is released. The default
    /// implementation is a no-op; clients with external connections should
    /// override it.
    async fn shutdown(self) -> DriverResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// Establishes driver clients for endpoints.
///
/// A connector never retries on its own; retry policy belongs to the caller.
#[async_trait]
pub trait DriverConnector: Send + Sync + Debug + 'static {
    type Client: DriverClient;

    /// Endpoint schemes this connector accepts, lowercased.
    fn schemes(&self) -> &[&'static str];

    /// Whether the endpoint's scheme is one of [`schemes`](Self::schemes).
    fn supports(&self, endpoint: &Endpoint) -> bool {
        self.schemes().iter().any(|scheme| *scheme == endpoint.scheme())
    }

    /// Connects to `endpoint`.
    ///
    /// # Errors
    ///
    /// Implementations must keep the [`ConnectionError`] kinds apart:
    /// `Refused` for unreachable servers, `AuthFailed` for rejected
    /// credentials, `Timeout` when the driver gave up waiting, and
    /// `InvalidEndpoint` for options the driver cannot accept.
    async fn connect(&self, endpoint: &Endpoint) -> Result<Self::Client, ConnectionError>;
}
