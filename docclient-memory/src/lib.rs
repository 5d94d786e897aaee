//! In-memory driver for docclient.
//!
//! This crate implements the driver contract entirely in process. It is the
//! reference backend: every operation of the contract is supported, and the
//! connector can simulate unreachable servers, rejected credentials and slow
//! responses so each failure path of the client layer can be exercised
//! without a database server.
//!
//! # Features
//!
//! - **Named servers** - `memory://<name>` endpoints; clients of one name share data
//! - **Filters** - implicit equality, dotted paths, `$eq $ne $gt $gte $lt $lte $in $nin $exists $not $and $or $nor`
//! - **Updates** - `$set $unset $inc $rename $push`
//! - **Find options** - multi-key sort, skip and limit
//!
//! # Quick Start
//!
//! ```ignore
//! use docclient::prelude::*;
//! use docclient::memory::InMemoryConnector;
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = ConnectionManager::new(
//!         InMemoryConnector::new(),
//!         ClientConfig::new("memory://local")?,
//!     );
//!     let client = manager.connect_default().await?;
//!     let users = client.collection("app", "users")?;
//!
//!     manager.dispatcher().insert_one(&users, doc! { "name": "Alice" }).await?;
//!     manager.release(client).await;
//!
//!     Ok(())
//! }
//! ```

pub mod connector;
mod evaluator;
pub mod store;
mod update;

pub use connector::{InMemoryConnector, InMemoryConnectorBuilder, MEMORY_SCHEME};
pub use store::InMemoryClient;
