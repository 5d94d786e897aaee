//! MongoDB driver for docclient.
//!
//! This crate implements the driver contract on top of the official `mongodb`
//! crate. Filters, updates and find options are passed through unchanged, so
//! the full MongoDB query language is available.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docclient = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Connection failures
//!
//! Connecting pings the deployment. Failures are classified as:
//!
//! - invalid connection string options: `InvalidEndpoint`
//! - rejected credentials: `AuthFailed`
//! - refused connections, DNS failures: `Refused`
//! - no server selectable in time: `Timeout`
//!
//! # Example
//!
//! ```ignore
//! use docclient::prelude::*;
//! use docclient::mongodb::MongoDbConnector;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = ConnectionManager::new(MongoDbConnector::new(), ClientConfig::from_env()?);
//!     let client = manager.connect_default().await?;
//!     manager.dispatcher().ping(&client).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod connector;
mod error;
pub mod store;

pub use connector::{MongoDbConnector, MongoDbConnectorBuilder};
pub use store::MongoDbClient;
