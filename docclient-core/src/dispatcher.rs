//! The operation dispatcher.
//!
//! [`OperationDispatcher`] is the single entry point for data and schema
//! operations. Every method follows the same contract:
//!
//! 1. validate the input; nothing reaches the driver if this fails
//! 2. delegate to the driver behind the handle
//! 3. classify the outcome into [`ClientError`]
//!
//! Driver failures become [`OperationError::DriverFailure`] carrying the
//! operation name and target; an elapsed timeout becomes
//! [`OperationError::Timeout`]. Zero matches is a normal outcome for batch
//! operations; only [`find_one`](OperationDispatcher::find_one) reports
//! [`NotFoundError`].

use bson::Document;
use futures::{Stream, StreamExt, TryStreamExt};
use serde::{Serialize, de::DeserializeOwned};
use std::{
    future::Future,
    marker::PhantomData,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tracing::{debug, warn};

use crate::{
    collection::{CollectionHandle, DatabaseHandle},
    connection::ClientHandle,
    document::{IntoDocument, from_document, to_document},
    driver::{DocumentStream, DriverClient, DriverResult},
    error::{
        ArgumentRole, ClientResult, NotFoundError, Operation, OperationError, ValidationError,
    },
    query::FindOptions,
    results::{DeleteResult, InsertManyResult, InsertResult, UpdateResult},
};

/// Runs operations against collection, database and client handles.
///
/// The dispatcher holds no connection state; it is `Copy` and can be created
/// freely. By default operations wait as long as the driver does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationDispatcher {
    timeout: Option<Duration>,
}

impl OperationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a dispatcher that bounds every operation by `timeout`.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout: Some(timeout) }
    }

    /// Returns a dispatcher without an operation timeout.
    pub fn without_timeout(self) -> Self {
        Self { timeout: None }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn run<T, F>(&self, operation: Operation, target: &str, call: F) -> Result<T, OperationError>
    where
        F: Future<Output = DriverResult<T>>,
    {
        debug!(%operation, resource = target, "dispatching operation");

        let outcome = match self.timeout {
            Some(after) => match tokio::time::timeout(after, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(%operation, resource = target, ?after, "operation timed out");
                    return Err(OperationError::Timeout {
                        operation,
                        target: target.to_string(),
                        after,
                    });
                }
            },
            None => call.await,
        };

        outcome.map_err(|source| {
            debug!(%operation, resource = target, error = %source, "driver reported failure");
            OperationError::DriverFailure {
                operation,
                target: target.to_string(),
                source,
            }
        })
    }

    /// Inserts a document and returns its `_id`.
    ///
    /// An empty mapping is valid input; whether it is accepted is up to the driver.
    ///
    /// # Errors
    ///
    /// [`ValidationError::NullDocument`] or [`ValidationError::NotAMapping`] before
    /// any I/O; [`OperationError`] if the driver fails.
    pub async fn insert_one<D: DriverClient>(
        &self,
        handle: &CollectionHandle<'_, D>,
        document: impl IntoDocument,
    ) -> ClientResult<InsertResult> {
        let document = document.into_document(ArgumentRole::Document)?;
        self.insert_validated(handle, document).await
    }

    /// Serializes `value` and inserts it.
    pub async fn insert_one_as<D: DriverClient, T: Serialize + ?Sized>(
        &self,
        handle: &CollectionHandle<'_, D>,
        value: &T,
    ) -> ClientResult<InsertResult> {
        let document = to_document(value)?;
        self.insert_validated(handle, document).await
    }

    async fn insert_validated<D: DriverClient>(
        &self,
        handle: &CollectionHandle<'_, D>,
        document: Document,
    ) -> ClientResult<InsertResult> {
        let target = handle.namespace().to_string();
        let inserted_id = self
            .run(
                Operation::InsertOne,
                &target,
                handle.driver().insert_one(handle.namespace(), document),
            )
            .await?;

        Ok(InsertResult { inserted_id })
    }

    /// Inserts documents in order and returns their `_id`s in the same order.
    ///
    /// # Errors
    ///
    /// [`ValidationError::EmptyBatch`] for an empty batch. Every document is
    /// validated before any of them is sent.
    pub async fn insert_many<D, I>(
        &self,
        handle: &CollectionHandle<'_, D>,
        documents: I,
    ) -> ClientResult<InsertManyResult>
    where
        D: DriverClient,
        I: IntoIterator,
        I::Item: IntoDocument,
    {
        let documents = documents
            .into_iter()
            .map(|document| document.into_document(ArgumentRole::Document))
            .collect::<Result<Vec<_>, _>>()?;

        if documents.is_empty() {
            return Err(ValidationError::EmptyBatch.into());
        }

        let target = handle.namespace().to_string();
        let inserted_ids = self
            .run(
                Operation::InsertMany,
                &target,
                handle.driver().insert_many(handle.namespace(), documents),
            )
            .await?;

        Ok(InsertManyResult { inserted_ids })
    }

    /// Returns the first document matching `filter`. An empty filter matches any document.
    ///
    /// # Errors
    ///
    /// [`NotFoundError`] if nothing matches.
    pub async fn find_one<D: DriverClient>(
        &self,
        handle: &CollectionHandle<'_, D>,
        filter: impl IntoDocument,
    ) -> ClientResult<Document> {
        let filter = filter.into_document(ArgumentRole::Filter)?;
        let target = handle.namespace().to_string();

        let found = self
            .run(
                Operation::FindOne,
                &target,
                handle.driver().find_one(handle.namespace(), filter.clone()),
            )
            .await?;

        found.ok_or_else(|| {
            NotFoundError {
                namespace: target,
                filter,
            }
            .into()
        })
    }

    /// Like [`find_one`](Self::find_one), decoding the document into `T`.
    ///
    /// A document that does not decode is reported as a serialization failure
    /// of the operation.
    pub async fn find_one_as<D: DriverClient, T: DeserializeOwned>(
        &self,
        handle: &CollectionHandle<'_, D>,
        filter: impl IntoDocument,
    ) -> ClientResult<T> {
        let document = self.find_one(handle, filter).await?;

        from_document(document).map_err(|source| {
            OperationError::DriverFailure {
                operation: Operation::FindOne,
                target: handle.namespace().to_string(),
                source,
            }
            .into()
        })
    }

    /// Opens a cursor over the documents matching `filter`.
    pub async fn find_many<'c, D: DriverClient>(
        &self,
        handle: &CollectionHandle<'c, D>,
        filter: impl IntoDocument,
    ) -> ClientResult<FindCursor<'c>> {
        self.find_many_with(handle, filter, FindOptions::default()).await
    }

    /// Opens a cursor with sort, skip and limit applied.
    ///
    /// The timeout, if any, bounds opening the cursor, not consuming it.
    pub async fn find_many_with<'c, D: DriverClient>(
        &self,
        handle: &CollectionHandle<'c, D>,
        filter: impl IntoDocument,
        options: FindOptions,
    ) -> ClientResult<FindCursor<'c>> {
        let filter = filter.into_document(ArgumentRole::Filter)?;
        let target = handle.namespace().to_string();

        let stream = self
            .run(
                Operation::FindMany,
                &target,
                handle.driver().find(handle.namespace(), filter, options),
            )
            .await?;

        Ok(FindCursor {
            stream,
            target,
            _client: PhantomData,
        })
    }

    /// Applies `update` to the first matching document.
    pub async fn update_one<D: DriverClient>(
        &self,
        handle: &CollectionHandle<'_, D>,
        filter: impl IntoDocument,
        update: impl IntoDocument,
    ) -> ClientResult<UpdateResult> {
        let filter = filter.into_document(ArgumentRole::Filter)?;
        let update = update.into_document(ArgumentRole::Update)?;
        let target = handle.namespace().to_string();

        Ok(self
            .run(
                Operation::UpdateOne,
                &target,
                handle.driver().update_one(handle.namespace(), filter, update),
            )
            .await?)
    }

    /// Applies `update` to every matching document.
    pub async fn update_many<D: DriverClient>(
        &self,
        handle: &CollectionHandle<'_, D>,
        filter: impl IntoDocument,
        update: impl IntoDocument,
    ) -> ClientResult<UpdateResult> {
        let filter = filter.into_document(ArgumentRole::Filter)?;
        let update = update.into_document(ArgumentRole::Update)?;
        let target = handle.namespace().to_string();

        Ok(self
            .run(
                Operation::UpdateMany,
                &target,
                handle.driver().update_many(handle.namespace(), filter, update),
            )
            .await?)
    }

    pub async fn delete_one<D: DriverClient>(
        &self,
        handle: &CollectionHandle<'_, D>,
        filter: impl IntoDocument,
    ) -> ClientResult<DeleteResult> {
        let filter = filter.into_document(ArgumentRole::Filter)?;
        let target = handle.namespace().to_string();

        Ok(self
            .run(
                Operation::DeleteOne,
                &target,
                handle.driver().delete_one(handle.namespace(), filter),
            )
            .await?)
    }

    pub async fn delete_many<D: DriverClient>(
        &self,
        handle: &CollectionHandle<'_, D>,
        filter: impl IntoDocument,
    ) -> ClientResult<DeleteResult> {
        let filter = filter.into_document(ArgumentRole::Filter)?;
        let target = handle.namespace().to_string();

        Ok(self
            .run(
                Operation::DeleteMany,
                &target,
                handle.driver().delete_many(handle.namespace(), filter),
            )
            .await?)
    }

    /// Lists database names, sorted as the driver reports them.
    pub async fn list_databases<D: DriverClient>(&self, client: &ClientHandle<D>) -> ClientResult<Vec<String>> {
        let target = client.endpoint().redacted();

        Ok(self
            .run(Operation::ListDatabases, &target, client.driver().list_databases())
            .await?)
    }

    pub async fn drop_database<D: DriverClient>(&self, database: &DatabaseHandle<'_, D>) -> ClientResult<()> {
        Ok(self
            .run(
                Operation::DropDatabase,
                database.name(),
                database.driver().drop_database(database.name()),
            )
            .await?)
    }

    pub async fn list_collections<D: DriverClient>(
        &self,
        database: &DatabaseHandle<'_, D>,
    ) -> ClientResult<Vec<String>> {
        Ok(self
            .run(
                Operation::ListCollections,
                database.name(),
                database.driver().list_collections(database.name()),
            )
            .await?)
    }

    pub async fn create_collection<D: DriverClient>(&self, handle: &CollectionHandle<'_, D>) -> ClientResult<()> {
        let target = handle.namespace().to_string();

        Ok(self
            .run(
                Operation::CreateCollection,
                &target,
                handle.driver().create_collection(handle.namespace()),
            )
            .await?)
    }

    pub async fn drop_collection<D: DriverClient>(&self, handle: &CollectionHandle<'_, D>) -> ClientResult<()> {
        let target = handle.namespace().to_string();

        Ok(self
            .run(
                Operation::DropCollection,
                &target,
                handle.driver().drop_collection(handle.namespace()),
            )
            .await?)
    }

    /// Checks that the server answers.
    pub async fn ping<D: DriverClient>(&self, client: &ClientHandle<D>) -> ClientResult<()> {
        let target = client.endpoint().redacted();

        Ok(self.run(Operation::Ping, &target, client.driver().ping()).await?)
    }
}

/// A lazy, single-pass cursor over the results of `find_many`.
///
/// The cursor cannot outlive the client handle it was opened through and
/// cannot be restarted; consuming it moves it.
pub struct FindCursor<'c> {
    stream: DocumentStream,
    target: String,
    _client: PhantomData<&'c ()>,
}

impl FindCursor<'_> {
    /// Drains the cursor into a vector, stopping at the first error.
    pub async fn collect_all(self) -> ClientResult<Vec<Document>> {
        self.try_collect().await
    }
}

impl Stream for FindCursor<'_> {
    type Item = ClientResult<Document>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.stream.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(document))) => Poll::Ready(Some(Ok(document))),
            Poll::Ready(Some(Err(source))) => Poll::Ready(Some(Err(OperationError::DriverFailure {
                operation: Operation::FindMany,
                target: self.target.clone(),
                source,
            }
            .into()))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl std::fmt::Debug for FindCursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FindCursor").field("target", &self.target).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ClientConfig,
        connection::ConnectionManager,
        error::{ClientError, DriverError},
        testing::{StubConnector, StubResponse},
    };
    use bson::{Bson, doc};
    use serde_json::{Value, json};

    fn manager(connector: StubConnector) -> ConnectionManager<StubConnector> {
        ConnectionManager::new(connector, ClientConfig::new("stub://local").unwrap())
    }

    #[tokio::test]
    async fn validation_failures_never_reach_the_driver() {
        let connector = StubConnector::new();
        let manager = manager(connector.clone());
        let client = manager.connect_default().await.unwrap();
        let coll = client.collection("db", "c").unwrap();
        let dispatcher = manager.dispatcher();

        let err = dispatcher.insert_one(&coll, Value::Null).await.unwrap_err();
        assert_eq!(err, ClientError::Validation(ValidationError::NullDocument));

        let err = dispatcher.update_many(&coll, doc! {}, Bson::Null).await.unwrap_err();
        assert_eq!(err, ClientError::Validation(ValidationError::NullUpdate));

        let err = dispatcher.delete_one(&coll, json!(5)).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Validation(ValidationError::NotAMapping { role: ArgumentRole::Filter, .. })
        ));

        let err = dispatcher.insert_many(&coll, Vec::<Document>::new()).await.unwrap_err();
        assert_eq!(err, ClientError::Validation(ValidationError::EmptyBatch));

        let err = dispatcher
            .insert_many(&coll, vec![Some(doc! { "a": 1 }), None])
            .await
            .unwrap_err();
        assert_eq!(err, ClientError::Validation(ValidationError::NullDocument));

        assert_eq!(connector.operation_calls(), 0);
    }

    #[tokio::test]
    async fn update_validates_filter_before_update() {
        let manager = manager(StubConnector::new());
        let client = manager.connect_default().await.unwrap();
        let coll = client.collection("db", "c").unwrap();

        let err = manager
            .dispatcher()
            .update_one(&coll, Value::Null, Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err, ClientError::Validation(ValidationError::NullFilter));
    }

    #[tokio::test]
    async fn driver_failures_carry_operation_and_target() {
        let connector = StubConnector::new().respond(StubResponse::Fail(DriverError::Network("reset".into())));
        let manager = manager(connector);
        let client = manager.connect_default().await.unwrap();
        let coll = client.collection("shop", "orders").unwrap();

        let err = manager.dispatcher().delete_many(&coll, doc! {}).await.unwrap_err();

        match err {
            ClientError::Operation(OperationError::DriverFailure { operation, target, source }) => {
                assert_eq!(operation, Operation::DeleteMany);
                assert_eq!(target, "shop.orders");
                assert_eq!(source, DriverError::Network("reset".into()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn find_one_without_match_is_not_found() {
        let manager = manager(StubConnector::new());
        let client = manager.connect_default().await.unwrap();
        let coll = client.collection("shop", "orders").unwrap();

        let err = manager.dispatcher().find_one(&coll, doc! { "n": 1 }).await.unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(
            err,
            ClientError::NotFound(NotFoundError {
                namespace: "shop.orders".to_string(),
                filter: doc! { "n": 1 },
            })
        );
    }

    #[tokio::test]
    async fn slow_operations_time_out() {
        let connector = StubConnector::new().respond(StubResponse::Delay(Duration::from_millis(200)));
        let manager = manager(connector);
        let client = manager.connect_default().await.unwrap();
        let coll = client.collection("db", "c").unwrap();

        let err = manager
            .dispatcher()
            .with_timeout(Duration::from_millis(20))
            .insert_one(&coll, doc! { "a": 1 })
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert!(matches!(
            err,
            ClientError::Operation(OperationError::Timeout { operation: Operation::InsertOne, .. })
        ));
    }

    #[tokio::test]
    async fn dispatcher_inherits_configured_timeout() {
        let config = ClientConfig::new("stub://local")
            .unwrap()
            .with_operation_timeout(Duration::from_secs(3));
        let manager = ConnectionManager::new(StubConnector::new(), config);

        assert_eq!(manager.dispatcher().timeout(), Some(Duration::from_secs(3)));
        assert_eq!(manager.dispatcher().without_timeout().timeout(), None);
    }
}
