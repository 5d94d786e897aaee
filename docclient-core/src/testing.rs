//! A scripted driver for unit tests.

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use futures::stream;
use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use crate::{
    collection::Namespace,
    driver::{DocumentStream, DriverClient, DriverConnector, DriverResult},
    endpoint::Endpoint,
    error::{ConnectionError, DriverError},
    query::FindOptions,
    results::{DeleteResult, UpdateResult},
};

#[derive(Debug, Clone)]
pub(crate) enum StubResponse {
    /// Succeed with empty results.
    Empty,
    Fail(DriverError),
    Delay(Duration),
}

#[derive(Debug, Default)]
struct Counters {
    connects: AtomicUsize,
    operations: AtomicUsize,
}

#[derive(Debug, Clone)]
pub(crate) struct StubConnector {
    counters: Arc<Counters>,
    response: StubResponse,
    connect_delay: Duration,
    refuse: bool,
}

impl StubConnector {
    pub(crate) fn new() -> Self {
        Self {
            counters: Arc::default(),
            response: StubResponse::Empty,
            connect_delay: Duration::ZERO,
            refuse: false,
        }
    }

    pub(crate) fn respond(mut self, response: StubResponse) -> Self {
        self.response = response;
        self
    }

    pub(crate) fn connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    pub(crate) fn refusing(mut self) -> Self {
        self.refuse = true;
        self
    }

    pub(crate) fn connect_calls(&self) -> usize {
        self.counters.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn operation_calls(&self) -> usize {
        self.counters.operations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DriverConnector for StubConnector {
    type Client = StubClient;

    fn schemes(&self) -> &[&'static str] {
        &["stub"]
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<StubClient, ConnectionError> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        if self.refuse {
            return Err(ConnectionError::Refused {
                endpoint: endpoint.redacted(),
                message: "stub refuses".to_string(),
            });
        }

        Ok(StubClient {
            counters: self.counters.clone(),
            response: self.response.clone(),
        })
    }
}

#[derive(Debug)]
pub(crate) struct StubClient {
    counters: Arc<Counters>,
    response: StubResponse,
}

impl StubClient {
    async fn answer<T>(&self, value: T) -> DriverResult<T> {
        self.counters.operations.fetch_add(1, Ordering::SeqCst);
        match &self.response {
            StubResponse::Empty => Ok(value),
            StubResponse::Fail(err) => Err(err.clone()),
            StubResponse::Delay(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(value)
            }
        }
    }
}

#[async_trait]
impl DriverClient for StubClient {
    async fn list_databases(&self) -> DriverResult<Vec<String>> {
        self.answer(Vec::new()).await
    }

    async fn drop_database(&self, _database: &str) -> DriverResult<()> {
        self.answer(()).await
    }

    async fn list_collections(&self, _database: &str) -> DriverResult<Vec<String>> {
        self.answer(Vec::new()).await
    }

    async fn create_collection(&self, _namespace: &Namespace) -> DriverResult<()> {
        self.answer(()).await
    }

    async fn drop_collection(&self, _namespace: &Namespace) -> DriverResult<()> {
        self.answer(()).await
    }

    async fn insert_one(&self, _namespace: &Namespace, _document: Document) -> DriverResult<Bson> {
        self.answer(Bson::ObjectId(ObjectId::new())).await
    }

    async fn insert_many(&self, _namespace: &Namespace, documents: Vec<Document>) -> DriverResult<Vec<Bson>> {
        self.answer(documents.iter().map(|_| Bson::ObjectId(ObjectId::new())).collect())
            .await
    }

    async fn find(
        &self,
        _namespace: &Namespace,
        _filter: Document,
        _options: FindOptions,
    ) -> DriverResult<DocumentStream> {
        let empty: DocumentStream = Box::pin(stream::empty());
        self.answer(empty).await
    }

    async fn update_one(&self, _namespace: &Namespace, _filter: Document, _update: Document) -> DriverResult<UpdateResult> {
        self.answer(UpdateResult::default()).await
    }

    async fn update_many(&self, _namespace: &Namespace, _filter: Document, _update: Document) -> DriverResult<UpdateResult> {
        self.answer(UpdateResult::default()).await
    }

    async fn delete_one(&self, _namespace: &Namespace, _filter: Document) -> DriverResult<DeleteResult> {
        self.answer(DeleteResult::default()).await
    }

    async fn delete_many(&self, _namespace: &Namespace, _filter: Document) -> DriverResult<DeleteResult> {
        self.answer(DeleteResult::default()).await
    }

    async fn ping(&self) -> DriverResult<()> {
        self.answer(()).await
    }
}
