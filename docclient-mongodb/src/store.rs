use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::TryStreamExt;
use mongodb::{Client, Collection as MongoCollection, options::FindOptions as MongoFindOptions};
use tracing::debug;

use docclient_core::{
    collection::Namespace,
    driver::{DocumentStream, DriverClient, DriverResult},
    query::FindOptions,
    results::{DeleteResult, UpdateResult},
};

use crate::error::driver_error;

/// A connected MongoDB client.
///
/// Wraps the official driver's [`Client`], which keeps its own connection pool;
/// one instance serves every handle leased for an endpoint.
#[derive(Debug)]
pub struct MongoDbClient {
    client: Client,
}

impl MongoDbClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// The underlying driver client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    fn get_collection(&self, namespace: &Namespace) -> MongoCollection<Document> {
        self.client
            .database(namespace.database())
            .collection(namespace.collection())
    }
}

fn find_options(options: FindOptions) -> MongoFindOptions {
    let mut mongo_options = MongoFindOptions::default();

    mongo_options.sort = options.sort_document();
    mongo_options.limit = options.limit.map(|limit| limit as i64);
    mongo_options.skip = options.skip.map(|skip| skip as u64);

    mongo_options
}

#[async_trait]
impl DriverClient for MongoDbClient {
    async fn list_databases(&self) -> DriverResult<Vec<String>> {
        self.client.list_database_names().await.map_err(driver_error)
    }

    async fn drop_database(&self, database: &str) -> DriverResult<()> {
        self.client.database(database).drop().await.map_err(driver_error)
    }

    async fn list_collections(&self, database: &str) -> DriverResult<Vec<String>> {
        self.client
            .database(database)
            .list_collection_names()
            .await
            .map_err(driver_error)
    }

    async fn create_collection(&self, namespace: &Namespace) -> DriverResult<()> {
        self.client
            .database(namespace.database())
            .create_collection(namespace.collection())
            .await
            .map_err(driver_error)
    }

    async fn drop_collection(&self, namespace: &Namespace) -> DriverResult<()> {
        self.get_collection(namespace).drop().await.map_err(driver_error)
    }

    async fn insert_one(&self, namespace: &Namespace, document: Document) -> DriverResult<Bson> {
        Ok(self
            .get_collection(namespace)
            .insert_one(document)
            .await
            .map_err(driver_error)?
            .inserted_id)
    }

    async fn insert_many(&self, namespace: &Namespace, documents: Vec<Document>) -> DriverResult<Vec<Bson>> {
        let mut inserted = self
            .get_collection(namespace)
            .insert_many(documents)
            .await
            .map_err(driver_error)?
            .inserted_ids
            .into_iter()
            .collect::<Vec<_>>();

        inserted.sort_by_key(|(index, _)| *index);
        Ok(inserted.into_iter().map(|(_, id)| id).collect())
    }

    async fn find(
        &self,
        namespace: &Namespace,
        filter: Document,
        options: FindOptions,
    ) -> DriverResult<DocumentStream> {
        let cursor = self
            .get_collection(namespace)
            .find(filter)
            .with_options(find_options(options))
            .await
            .map_err(driver_error)?;

        Ok(Box::pin(cursor.map_err(driver_error)))
    }

    async fn find_one(&self, namespace: &Namespace, filter: Document) -> DriverResult<Option<Document>> {
        self.get_collection(namespace)
            .find_one(filter)
            .await
            .map_err(driver_error)
    }

    async fn update_one(&self, namespace: &Namespace, filter: Document, update: Document) -> DriverResult<UpdateResult> {
        let result = self
            .get_collection(namespace)
            .update_one(filter, update)
            .await
            .map_err(driver_error)?;

        Ok(UpdateResult {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    async fn update_many(&self, namespace: &Namespace, filter: Document, update: Document) -> DriverResult<UpdateResult> {
        let result = self
            .get_collection(namespace)
            .update_many(filter, update)
            .await
            .map_err(driver_error)?;

        Ok(UpdateResult {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    async fn delete_one(&self, namespace: &Namespace, filter: Document) -> DriverResult<DeleteResult> {
        let result = self
            .get_collection(namespace)
            .delete_one(filter)
            .await
            .map_err(driver_error)?;

        Ok(DeleteResult { deleted: result.deleted_count })
    }

    async fn delete_many(&self, namespace: &Namespace, filter: Document) -> DriverResult<DeleteResult> {
        let result = self
            .get_collection(namespace)
            .delete_many(filter)
            .await
            .map_err(driver_error)?;

        Ok(DeleteResult { deleted: result.deleted_count })
    }

    async fn ping(&self) -> DriverResult<()> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(driver_error)?;

        Ok(())
    }

    async fn shutdown(self) -> DriverResult<()> {
        debug!("shutting down MongoDB client");
        self.client.shutdown().await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docclient_core::query::SortDirection;

    #[test]
    fn find_options_carry_over() {
        let options = find_options(
            FindOptions::builder()
                .sort("age", SortDirection::Desc)
                .sort("name", SortDirection::Asc)
                .skip(5)
                .limit(10)
                .build(),
        );

        assert_eq!(options.sort, Some(doc! { "age": -1, "name": 1 }));
        assert_eq!(options.limit, Some(10));
        assert_eq!(options.skip, Some(5));
    }

    #[test]
    fn default_find_options_are_empty() {
        let options = find_options(FindOptions::default());

        assert_eq!(options.sort, None);
        assert_eq!(options.limit, None);
        assert_eq!(options.skip, None);
    }
}
