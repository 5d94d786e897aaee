//! Convenient re-exports of commonly used types from docclient.
//!
//! ```ignore
//! use docclient::prelude::*;
//! ```

pub use docclient_core::{
    collection::{CollectionHandle, DatabaseHandle, Namespace},
    config::ClientConfig,
    connection::{ClientHandle, ConnectionManager},
    dispatcher::{FindCursor, OperationDispatcher},
    document::{IntoDocument, from_document, to_document},
    driver::{DriverClient, DriverConnector},
    endpoint::Endpoint,
    error::{
        ClientError, ClientResult, ConfigError, ConnectionError, DriverError, NotFoundError, OperationError,
        ValidationError,
    },
    query::{Expr, Filter, FindOptions, SortDirection},
    results::{DeleteResult, InsertManyResult, InsertResult, UpdateResult},
};
