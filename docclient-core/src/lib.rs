//! Core of the docclient project: a minimal client layer over document stores.
//!
//! This crate provides:
//!
//! - **Endpoints and configuration** ([`endpoint`], [`config`]) - parsing connection strings and resolving them at startup
//! - **Driver contract** ([`driver`]) - the capability set a storage backend must implement
//! - **Connection lifecycle** ([`connection`]) - shared, leased connections per endpoint
//! - **Handles** ([`collection`]) - validated database and collection names scoped to a connection
//! - **Dispatching** ([`dispatcher`]) - validated, classified operations with optional timeouts
//! - **Filters** ([`query`]) - a filter AST, builder and find options
//! - **Documents** ([`document`]) - conversions from typed, JSON and BSON values
//! - **Error handling** ([`error`]) - the error taxonomy and result types
//!
//! # Example
//!
//! ```ignore
//! use docclient::prelude::*;
//! use docclient::memory::InMemoryConnector;
//! use bson::doc;
//!
//! let config = ClientConfig::resolve(Some("memory://local"))?;
//! let manager = ConnectionManager::new(InMemoryConnector::new(), config);
//! let client = manager.connect_default().await?;
//!
//! let customers = CollectionHandle::of(&client, "shop", "customers")?;
//! let dispatcher = manager.dispatcher();
//! let inserted = dispatcher.insert_one(&customers, doc! { "name": "John" }).await?;
//! let found = dispatcher.find_one(&customers, doc! { "_id": inserted.inserted_id }).await?;
//! ```

pub mod collection;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod document;
pub mod driver;
pub mod endpoint;
pub mod error;
pub mod query;
pub mod results;

#[cfg(test)]
mod testing;
