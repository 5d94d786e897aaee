//! In-memory driver client.
//!
//! Documents are kept per database and collection in insertion order, behind an
//! async-aware read-write lock. Every mutation completes while the write lock is
//! held and without suspending, so dropping an operation future part way never
//! leaves a collection half-updated.

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use futures::stream;
use mea::rwlock::RwLock;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tracing::debug;

use docclient_core::{
    collection::Namespace,
    document::ID_FIELD,
    driver::{DocumentStream, DriverClient, DriverResult},
    error::DriverError,
    query::{Expr, FindOptions, SortDirection},
    results::{DeleteResult, UpdateResult},
};

use crate::{
    evaluator::{Comparable, DocumentEvaluator, lookup},
    update::UpdatePlan,
};

type CollectionMap = HashMap<String, Vec<Document>>;
type DatabaseMap = HashMap<String, CollectionMap>;

/// The data held by one named in-memory server.
pub(crate) type ServerState = Arc<RwLock<DatabaseMap>>;

/// A connected in-memory client.
///
/// Clients connected to the same server name share its data.
///
/// # Example
///
/// ```ignore
/// use docclient::memory::InMemoryConnector;
/// use docclient::driver::{DriverClient, DriverConnector};
///
/// let connector = InMemoryConnector::new();
/// let client = connector.connect(&"memory://local".parse()?).await?;
/// let namespace = Namespace::new("shop", "customers")?;
///
/// let id = client.insert_one(&namespace, doc! { "name": "Alice" }).await?;
/// let found = client.find_one(&namespace, doc! { "_id": id }).await?;
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryClient {
    server: String,
    data: ServerState,
    latency: Duration,
}

impl InMemoryClient {
    pub(crate) fn new(server: String, data: ServerState, latency: Duration) -> Self {
        Self { server, data, latency }
    }

    /// Name of the server this client is connected to.
    pub fn server(&self) -> &str {
        &self.server
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

fn parse_filter(filter: &Document) -> DriverResult<Expr> {
    Expr::from_document(filter).map_err(|err| DriverError::Rejected(err.to_string()))
}

fn matches(document: &Document, expr: &Expr) -> bool {
    DocumentEvaluator::new(document).evaluate(expr)
}

/// Returns `document` with an `_id`, generating one as its first field if missing.
fn with_id(document: Document) -> Document {
    if document.contains_key(ID_FIELD) {
        return document;
    }

    let mut identified = Document::new();
    identified.insert(ID_FIELD, ObjectId::new());
    identified.extend(document);
    identified
}

fn id_of(document: &Document) -> Bson {
    document.get(ID_FIELD).cloned().unwrap_or(Bson::Null)
}

fn contains_id(documents: &[Document], id: &Bson) -> bool {
    let id = Comparable::from(id);
    documents
        .iter()
        .any(|document| document.get(ID_FIELD).map(Comparable::from).as_ref() == Some(&id))
}

fn duplicate_key(namespace: &Namespace, id: &Bson) -> DriverError {
    DriverError::Rejected(format!("duplicate key in {namespace}: {ID_FIELD} {id}"))
}

fn sort_documents(documents: &mut [Document], options: &FindOptions) {
    if options.sort.is_empty() {
        return;
    }

    documents.sort_by(|a, b| {
        options
            .sort
            .iter()
            .map(|sort| {
                let null = Bson::Null;
                let left = Comparable::from(lookup(a, &sort.field).unwrap_or(&null));
                let right = Comparable::from(lookup(b, &sort.field).unwrap_or(&null));

                match sort.direction {
                    SortDirection::Asc => left.sort_cmp(&right),
                    SortDirection::Desc => right.sort_cmp(&left),
                }
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

impl InMemoryClient {
    async fn update(
        &self,
        namespace: &Namespace,
        filter: Document,
        update: Document,
        multi: bool,
    ) -> DriverResult<UpdateResult> {
        self.simulate_latency().await;

        let expr = parse_filter(&filter)?;
        let plan = UpdatePlan::parse(&update)?;

        let mut data = self.data.write().await;
        let Some(documents) = data
            .get_mut(namespace.database())
            .and_then(|collections| collections.get_mut(namespace.collection()))
        else {
            return Ok(UpdateResult::default());
        };

        // Stage every change first so a failing document leaves the collection untouched.
        let mut staged = Vec::new();
        for (index, document) in documents.iter().enumerate() {
            if !matches(document, &expr) {
                continue;
            }

            let mut updated = document.clone();
            plan.apply(&mut updated)?;
            staged.push((index, updated));

            if !multi {
                break;
            }
        }

        let mut result = UpdateResult {
            matched: staged.len() as u64,
            modified: 0,
        };
        for (index, updated) in staged {
            if documents[index] != updated {
                documents[index] = updated;
                result.modified += 1;
            }
        }

        debug!(%namespace, matched = result.matched, modified = result.modified, "updated documents");
        Ok(result)
    }

    async fn delete(&self, namespace: &Namespace, filter: Document, multi: bool) -> DriverResult<DeleteResult> {
        self.simulate_latency().await;

        let expr = parse_filter(&filter)?;

        let mut data = self.data.write().await;
        let Some(documents) = data
            .get_mut(namespace.database())
            .and_then(|collections| collections.get_mut(namespace.collection()))
        else {
            return Ok(DeleteResult::default());
        };

        let deleted = if multi {
            let before = documents.len();
            documents.retain(|document| !matches(document, &expr));
            before - documents.len()
        } else {
            match documents.iter().position(|document| matches(document, &expr)) {
                Some(index) => {
                    documents.remove(index);
                    1
                }
                None => 0,
            }
        };

        Ok(DeleteResult { deleted: deleted as u64 })
    }
}

#[async_trait]
impl DriverClient for InMemoryClient {
    async fn list_databases(&self) -> DriverResult<Vec<String>> {
        self.simulate_latency().await;

        let mut names = self.data.read().await.keys().cloned().collect::<Vec<_>>();
        names.sort();
        Ok(names)
    }

    async fn drop_database(&self, database: &str) -> DriverResult<()> {
        self.simulate_latency().await;

        self.data.write().await.remove(database);
        Ok(())
    }

    async fn list_collections(&self, database: &str) -> DriverResult<Vec<String>> {
        self.simulate_latency().await;

        let mut names = self
            .data
            .read()
            .await
            .get(database)
            .map(|collections| collections.keys().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        names.sort();
        Ok(names)
    }

    async fn create_collection(&self, namespace: &Namespace) -> DriverResult<()> {
        self.simulate_latency().await;

        let mut data = self.data.write().await;
        let collections = data.entry(namespace.database().to_string()).or_default();

        if collections.contains_key(namespace.collection()) {
            return Err(DriverError::Rejected(format!("collection {namespace} already exists")));
        }

        collections.insert(namespace.collection().to_string(), Vec::new());
        Ok(())
    }

    async fn drop_collection(&self, namespace: &Namespace) -> DriverResult<()> {
        self.simulate_latency().await;

        let mut data = self.data.write().await;
        if let Some(collections) = data.get_mut(namespace.database()) {
            collections.remove(namespace.collection());
            if collections.is_empty() {
                data.remove(namespace.database());
            }
        }

        Ok(())
    }

    async fn insert_one(&self, namespace: &Namespace, document: Document) -> DriverResult<Bson> {
        self.simulate_latency().await;

        let document = with_id(document);
        let id = id_of(&document);

        let mut data = self.data.write().await;
        let documents = data
            .entry(namespace.database().to_string())
            .or_default()
            .entry(namespace.collection().to_string())
            .or_default();

        if contains_id(documents, &id) {
            return Err(duplicate_key(namespace, &id));
        }

        documents.push(document);
        Ok(id)
    }

    async fn insert_many(&self, namespace: &Namespace, documents: Vec<Document>) -> DriverResult<Vec<Bson>> {
        self.simulate_latency().await;

        let documents = documents.into_iter().map(with_id).collect::<Vec<_>>();
        let ids = documents.iter().map(id_of).collect::<Vec<_>>();

        let mut data = self.data.write().await;
        let stored = data
            .entry(namespace.database().to_string())
            .or_default()
            .entry(namespace.collection().to_string())
            .or_default();

        // The batch is checked as a whole, against the collection and itself.
        for (index, id) in ids.iter().enumerate() {
            if contains_id(stored, id) || contains_id(&documents[..index], id) {
                return Err(duplicate_key(namespace, id));
            }
        }

        stored.extend(documents);
        Ok(ids)
    }

    async fn find(
        &self,
        namespace: &Namespace,
        filter: Document,
        options: FindOptions,
    ) -> DriverResult<DocumentStream> {
        self.simulate_latency().await;

        let expr = parse_filter(&filter)?;

        let mut found = self
            .data
            .read()
            .await
            .get(namespace.database())
            .and_then(|collections| collections.get(namespace.collection()))
            .map(|documents| {
                documents
                    .iter()
                    .filter(|document| matches(document, &expr))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        sort_documents(&mut found, &options);

        let found = found
            .into_iter()
            .skip(options.skip.unwrap_or(0))
            .take(options.limit.unwrap_or(usize::MAX))
            .map(Ok)
            .collect::<Vec<_>>();

        Ok(Box::pin(stream::iter(found)))
    }

    async fn update_one(&self, namespace: &Namespace, filter: Document, update: Document) -> DriverResult<UpdateResult> {
        self.update(namespace, filter, update, false).await
    }

    async fn update_many(&self, namespace: &Namespace, filter: Document, update: Document) -> DriverResult<UpdateResult> {
        self.update(namespace, filter, update, true).await
    }

    async fn delete_one(&self, namespace: &Namespace, filter: Document) -> DriverResult<DeleteResult> {
        self.delete(namespace, filter, false).await
    }

    async fn delete_many(&self, namespace: &Namespace, filter: Document) -> DriverResult<DeleteResult> {
        self.delete(namespace, filter, true).await
    }

    async fn ping(&self) -> DriverResult<()> {
        self.simulate_latency().await;
        Ok(())
    }

    async fn shutdown(self) -> DriverResult<()> {
        debug!(server = %self.server, "in-memory client closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use futures::TryStreamExt;

    fn client() -> InMemoryClient {
        InMemoryClient::new("test".into(), ServerState::default(), Duration::ZERO)
    }

    fn ns() -> Namespace {
        Namespace::new("shop", "customers").unwrap()
    }

    async fn all(client: &InMemoryClient, filter: Document, options: FindOptions) -> Vec<Document> {
        client.find(&ns(), filter, options).await.unwrap().try_collect().await.unwrap()
    }

    #[tokio::test]
    async fn insert_generates_ids_and_keeps_given_ones() {
        let client = client();

        let generated = client.insert_one(&ns(), doc! { "name": "Ann" }).await.unwrap();
        let given = client.insert_one(&ns(), doc! { "_id": 7, "name": "Bob" }).await.unwrap();

        assert!(matches!(generated, Bson::ObjectId(_)));
        assert_eq!(given, Bson::Int32(7));

        let stored = client.find_one(&ns(), doc! { "_id": generated.clone() }).await.unwrap().unwrap();
        assert_eq!(stored, doc! { "_id": generated, "name": "Ann" });
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let client = client();
        client.insert_one(&ns(), doc! { "_id": 1 }).await.unwrap();

        let err = client.insert_one(&ns(), doc! { "_id": 1_i64 }).await.unwrap_err();
        assert!(matches!(err, DriverError::Rejected(_)));

        let err = client
            .insert_many(&ns(), vec![doc! { "_id": 2 }, doc! { "_id": 2 }])
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Rejected(_)));
        assert_eq!(all(&client, doc! {}, FindOptions::default()).await.len(), 1);
    }

    #[tokio::test]
    async fn adjacent_large_integer_ids_stay_distinct() {
        let client = client();
        let low = 9_007_199_254_740_992_i64;
        let high = low + 1;

        client.insert_one(&ns(), doc! { "_id": low }).await.unwrap();
        client.insert_one(&ns(), doc! { "_id": high }).await.unwrap();

        let found = all(&client, doc! { "_id": high }, FindOptions::default()).await;
        assert_eq!(found, vec![doc! { "_id": high }]);
    }

    #[tokio::test]
    async fn sort_places_nan_first_and_orders_the_rest() {
        let client = client();
        let documents = (0..200)
            .map(|i| {
                let v = if i % 3 == 0 { f64::NAN } else { f64::from((i * 37) % 101) };
                doc! { "i": i, "v": v }
            })
            .collect();
        client.insert_many(&ns(), documents).await.unwrap();

        let sorted = all(
            &client,
            doc! {},
            FindOptions::builder().sort("v", SortDirection::Asc).build(),
        )
        .await;
        let values = sorted.iter().map(|doc| doc.get_f64("v").unwrap()).collect::<Vec<_>>();

        let nan_count = values.iter().take_while(|v| v.is_nan()).count();
        assert_eq!(nan_count, 67);
        let rest = &values[nan_count..];
        assert!(rest.iter().all(|v| !v.is_nan()));
        assert!(rest.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[tokio::test]
    async fn insert_many_returns_ids_in_order() {
        let client = client();

        let ids = client
            .insert_many(&ns(), vec![doc! { "_id": "a" }, doc! { "n": 1 }, doc! { "_id": "c" }])
            .await
            .unwrap();

        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0], Bson::String("a".into()));
        assert!(matches!(ids[1], Bson::ObjectId(_)));
        assert_eq!(ids[2], Bson::String("c".into()));
    }

    #[tokio::test]
    async fn find_sorts_skips_and_limits() {
        let client = client();
        client
            .insert_many(
                &ns(),
                vec![
                    doc! { "name": "c", "age": 30 },
                    doc! { "name": "a", "age": 20 },
                    doc! { "name": "b", "age": 30 },
                    doc! { "name": "d" },
                ],
            )
            .await
            .unwrap();

        let options = FindOptions::builder()
            .sort("age", SortDirection::Desc)
            .sort("name", SortDirection::Asc)
            .skip(1)
            .limit(2)
            .build();
        let names = all(&client, doc! {}, options)
            .await
            .iter()
            .map(|doc| doc.get_str("name").unwrap().to_string())
            .collect::<Vec<_>>();

        assert_eq!(names, ["c", "a"]);
    }

    #[tokio::test]
    async fn unsupported_filter_is_rejected() {
        let client = client();

        let err = client.find(&ns(), doc! { "$where": "1" }, FindOptions::default()).await.err();
        assert!(matches!(err, Some(DriverError::Rejected(_))));
    }

    #[tokio::test]
    async fn update_counts_matched_and_modified() {
        let client = client();
        client
            .insert_many(&ns(), vec![doc! { "tier": "gold", "n": 1 }, doc! { "tier": "gold", "n": 2 }])
            .await
            .unwrap();

        let result = client
            .update_many(&ns(), doc! { "tier": "gold" }, doc! { "$set": { "n": 2 } })
            .await
            .unwrap();
        assert_eq!(result, UpdateResult { matched: 2, modified: 1 });

        let result = client
            .update_one(&ns(), doc! { "tier": "silver" }, doc! { "$set": { "n": 3 } })
            .await
            .unwrap();
        assert_eq!(result, UpdateResult::default());
    }

    #[tokio::test]
    async fn failed_update_leaves_collection_untouched() {
        let client = client();
        client
            .insert_many(&ns(), vec![doc! { "_id": 1, "n": 1 }, doc! { "_id": 2, "n": "two" }])
            .await
            .unwrap();

        let err = client
            .update_many(&ns(), doc! {}, doc! { "$inc": { "n": 1 } })
            .await
            .unwrap_err();

        assert!(matches!(err, DriverError::Rejected(_)));
        let first = client.find_one(&ns(), doc! { "_id": 1 }).await.unwrap().unwrap();
        assert_eq!(first.get_i32("n").unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_one_and_many() {
        let client = client();
        client
            .insert_many(&ns(), vec![doc! { "k": 1 }, doc! { "k": 1 }, doc! { "k": 2 }])
            .await
            .unwrap();

        assert_eq!(client.delete_one(&ns(), doc! { "k": 1 }).await.unwrap().deleted, 1);
        assert_eq!(client.delete_many(&ns(), doc! { "k": { "$gte": 1 } }).await.unwrap().deleted, 2);
        assert_eq!(client.delete_many(&ns(), doc! {}).await.unwrap().deleted, 0);
    }

    #[tokio::test]
    async fn collection_lifecycle() {
        let client = client();
        let orders = Namespace::new("shop", "orders").unwrap();

        client.create_collection(&orders).await.unwrap();
        client.insert_one(&ns(), doc! {}).await.unwrap();

        assert!(matches!(client.create_collection(&orders).await, Err(DriverError::Rejected(_))));
        assert_eq!(client.list_databases().await.unwrap(), ["shop"]);
        assert_eq!(client.list_collections("shop").await.unwrap(), ["customers", "orders"]);

        client.drop_collection(&orders).await.unwrap();
        client.drop_collection(&orders).await.unwrap();
        assert_eq!(client.list_collections("shop").await.unwrap(), ["customers"]);

        client.drop_database("shop").await.unwrap();
        assert!(client.list_databases().await.unwrap().is_empty());
        assert!(client.list_collections("shop").await.unwrap().is_empty());
    }
}
