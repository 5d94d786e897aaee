//! Error types and result types for client operations.
//!
//! Failures are split by where they originate so callers can branch on them:
//!
//! - [`ValidationError`] - rejected before any I/O; deterministic for a given input
//! - [`ConnectionError`] - the endpoint could not be reached or authenticated against
//! - [`OperationError`] - the driver failed or the operation exceeded its timeout
//! - [`NotFoundError`] - a single-document lookup matched nothing
//! - [`ConfigError`] - startup configuration could not be resolved
//!
//! [`ClientError`] wraps all of them. Use [`ClientResult<T>`] as the return type
//! for operations that can fail in more than one of these ways.

use bson::{Document, error::Error as BsonError};
use std::{fmt, time::Duration};
use thiserror::Error;

/// Which kind of name failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameKind {
    Database,
    Collection,
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameKind::Database => f.write_str("database"),
            NameKind::Collection => f.write_str("collection"),
        }
    }
}

/// The role an argument plays in an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgumentRole {
    Document,
    Filter,
    Update,
}

impl fmt::Display for ArgumentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgumentRole::Document => f.write_str("document"),
            ArgumentRole::Filter => f.write_str("filter"),
            ArgumentRole::Update => f.write_str("update"),
        }
    }
}

/// Input rejected before any I/O took place.
///
/// Validation errors are deterministic: the same input always produces the same
/// error, so retrying them is pointless.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A database or collection name was empty.
    #[error("{0} name must not be empty")]
    EmptyName(NameKind),
    /// A batch operation received no documents.
    #[error("batch must contain at least one document")]
    EmptyBatch,
    /// A filter was null.
    #[error("filter must not be null")]
    NullFilter,
    /// An update specification was null.
    #[error("update must not be null")]
    NullUpdate,
    /// A document to insert was null.
    #[error("document must not be null")]
    NullDocument,
    /// An argument was a value other than a mapping.
    #[error("{role} must be a mapping, found {found}")]
    NotAMapping { role: ArgumentRole, found: String },
    /// A typed value could not be converted into a document.
    #[error("invalid document: {0}")]
    InvalidDocument(String),
}

impl ValidationError {
    /// The error reported for a null argument in the given role.
    pub fn null(role: ArgumentRole) -> Self {
        match role {
            ArgumentRole::Document => ValidationError::NullDocument,
            ArgumentRole::Filter => ValidationError::NullFilter,
            ArgumentRole::Update => ValidationError::NullUpdate,
        }
    }
}

/// Failure to establish a connection to an endpoint.
///
/// Endpoints carried by these variants are redacted; credentials never appear
/// in error messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// The endpoint string is malformed or names an unsupported scheme.
    /// Raised before any network attempt.
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    /// The server could not be reached or refused the connection.
    #[error("connection to {endpoint} refused: {message}")]
    Refused { endpoint: String, message: String },
    /// The server rejected the supplied credentials.
    #[error("authentication against {endpoint} failed: {message}")]
    AuthFailed { endpoint: String, message: String },
    /// The connection attempt did not complete in time.
    #[error("connection to {endpoint} timed out after {after:?}")]
    Timeout { endpoint: String, after: Duration },
}

impl ConnectionError {
    /// Whether a later attempt could succeed without changing the input.
    pub fn is_transient(&self) -> bool {
        matches!(self, ConnectionError::Refused { .. } | ConnectionError::Timeout { .. })
    }
}

/// Failure reported by a driver while executing an operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// The transport failed (connection reset, server unreachable, pool cleared).
    #[error("network error: {0}")]
    Network(String),
    /// The driver gave up waiting for the server.
    #[error("driver timeout: {0}")]
    Timeout(String),
    /// The server (or the driver on its behalf) refused the request.
    #[error("rejected: {0}")]
    Rejected(String),
    /// A document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Anything the driver could not classify.
    #[error("{0}")]
    Other(String),
}

impl DriverError {
    /// Whether the failure may go away on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, DriverError::Network(_) | DriverError::Timeout(_))
    }
}

impl From<BsonError> for DriverError {
    fn from(err: BsonError) -> Self {
        DriverError::Serialization(err.to_string())
    }
}

/// The operation a dispatcher was running when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    InsertOne,
    InsertMany,
    FindOne,
    FindMany,
    UpdateOne,
    UpdateMany,
    DeleteOne,
    DeleteMany,
    ListDatabases,
    DropDatabase,
    ListCollections,
    CreateCollection,
    DropCollection,
    Ping,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::InsertOne => "insert_one",
            Operation::InsertMany => "insert_many",
            Operation::FindOne => "find_one",
            Operation::FindMany => "find_many",
            Operation::UpdateOne => "update_one",
            Operation::UpdateMany => "update_many",
            Operation::DeleteOne => "delete_one",
            Operation::DeleteMany => "delete_many",
            Operation::ListDatabases => "list_databases",
            Operation::DropDatabase => "drop_database",
            Operation::ListCollections => "list_collections",
            Operation::CreateCollection => "create_collection",
            Operation::DropCollection => "drop_collection",
            Operation::Ping => "ping",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Failure of an operation after validation passed.
///
/// `target` is `database.collection` for collection operations, the database
/// name for database operations, and the redacted endpoint for client-wide ones.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    /// The driver reported an error.
    #[error("{operation} on {target} failed: {source}")]
    DriverFailure {
        operation: Operation,
        target: String,
        source: DriverError,
    },
    /// The operation did not finish within the dispatcher's timeout.
    #[error("{operation} on {target} timed out after {after:?}")]
    Timeout {
        operation: Operation,
        target: String,
        after: Duration,
    },
}

impl OperationError {
    pub fn operation(&self) -> Operation {
        match self {
            OperationError::DriverFailure { operation, .. } => *operation,
            OperationError::Timeout { operation, .. } => *operation,
        }
    }

    pub fn target(&self) -> &str {
        match self {
            OperationError::DriverFailure { target, .. } => target,
            OperationError::Timeout { target, .. } => target,
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            OperationError::DriverFailure { source, .. } => source.is_transient(),
            OperationError::Timeout { .. } => true,
        }
    }
}

/// A single-document lookup found no match.
///
/// Batch operations never raise this; a zero count is a normal outcome for them.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("no document in {namespace} matched {filter}")]
pub struct NotFoundError {
    pub namespace: String,
    pub filter: Document,
}

/// Startup configuration could not be resolved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No endpoint was passed and the environment variable is unset.
    #[error("no endpoint supplied and environment variable '{0}' is not set")]
    MissingEndpoint(String),
    /// An endpoint was supplied but is malformed.
    #[error("configured endpoint is invalid: {0}")]
    InvalidEndpoint(#[source] ConnectionError),
}

/// Any error the client layer can report.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Operation(#[from] OperationError),
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ClientError {
    pub fn is_validation(&self) -> bool {
        matches!(self, ClientError::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }

    /// Whether retrying the same call could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Connection(err) => err.is_transient(),
            ClientError::Operation(err) => err.is_transient(),
            _ => false,
        }
    }
}

/// A specialized `Result` type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_maps_to_role_specific_variant() {
        assert_eq!(ValidationError::null(ArgumentRole::Filter), ValidationError::NullFilter);
        assert_eq!(ValidationError::null(ArgumentRole::Update), ValidationError::NullUpdate);
        assert_eq!(ValidationError::null(ArgumentRole::Document), ValidationError::NullDocument);
    }

    #[test]
    fn operation_error_carries_context() {
        let err = OperationError::DriverFailure {
            operation: Operation::UpdateMany,
            target: "shop.customers".to_string(),
            source: DriverError::Network("connection reset".to_string()),
        };

        let message = err.to_string();
        assert!(message.contains("update_many"));
        assert!(message.contains("shop.customers"));
        assert!(message.contains("connection reset"));
        assert!(err.is_transient());
    }

    #[test]
    fn validation_is_never_transient() {
        let err = ClientError::from(ValidationError::EmptyBatch);
        assert!(err.is_validation());
        assert!(!err.is_transient());
    }

    #[test]
    fn connection_kinds_are_distinguishable() {
        let refused = ConnectionError::Refused {
            endpoint: "memory://a".to_string(),
            message: "offline".to_string(),
        };
        let auth = ConnectionError::AuthFailed {
            endpoint: "memory://a".to_string(),
            message: "bad password".to_string(),
        };

        assert_ne!(refused, auth);
        assert!(refused.is_transient());
        assert!(!auth.is_transient());
    }

    #[test]
    fn rejected_driver_error_is_not_transient() {
        let err = ClientError::from(OperationError::DriverFailure {
            operation: Operation::InsertOne,
            target: "db.c".to_string(),
            source: DriverError::Rejected("duplicate key".to_string()),
        });
        assert!(!err.is_transient());
    }
}
