//! A minimal document-store client layer.
//!
//! This crate is the entry point of the docclient project. It re-exports the
//! core client layer and gives access to the available drivers.
//!
//! # Features
//!
//! - **Scoped connections** - one shared connection per endpoint, leased to callers and torn down with the last lease
//! - **Typed errors** - validation, connection, operation and not-found failures kept apart
//! - **Uniform operations** - CRUD and schema operations with input validation and optional timeouts
//! - **Pluggable drivers** - any backend implementing the driver contract
//!
//! # Quick Start
//!
//! ```ignore
//! use docclient::{prelude::*, memory::InMemoryConnector};
//! use bson::doc;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Customer {
//!     name: String,
//!     address: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ClientError> {
//!     // Explicit endpoint, falling back to CONNECTION_URL.
//!     let config = ClientConfig::resolve(Some("memory://local"))?;
//!     let manager = ConnectionManager::new(InMemoryConnector::new(), config);
//!     let dispatcher = manager.dispatcher();
//!
//!     let client = manager.connect_default().await?;
//!     let customers = CollectionHandle::of(&client, "shop", "customers")?;
//!
//!     let inserted = dispatcher
//!         .insert_one_as(&customers, &Customer { name: "John".into(), address: "Highway 37".into() })
//!         .await?;
//!
//!     let john: Customer = dispatcher
//!         .find_one_as(&customers, doc! { "_id": inserted.inserted_id })
//!         .await?;
//!
//!     dispatcher
//!         .update_many(&customers, Filter::eq("address", "Highway 37"), doc! { "$set": { "address": "Canyon 123" } })
//!         .await?;
//!
//!     manager.release(client).await;
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - in-process driver for development and testing
//! - [`mongodb`] - MongoDB driver (requires the `mongodb` feature)

pub mod prelude;

pub use docclient_core::{
    collection, config, connection, dispatcher, document, driver, endpoint, error, query, results,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory driver.
pub mod memory {
    pub use docclient_memory::{InMemoryClient, InMemoryConnector, InMemoryConnectorBuilder, MEMORY_SCHEME};
}

/// MongoDB driver.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docclient_mongodb::{MongoDbClient, MongoDbConnector, MongoDbConnectorBuilder};
}
