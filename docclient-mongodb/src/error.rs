//! Classification of MongoDB driver errors.

use mongodb::error::{Error as MongoError, ErrorKind};
use std::{io, time::Duration};

use docclient_core::{endpoint::Endpoint, error::{ConnectionError, DriverError}};

/// Server error codes meaning the credentials were not accepted.
const AUTH_ERROR_CODES: [i32; 2] = [13, 18];

/// Maps an error raised while executing an operation.
pub(crate) fn driver_error(err: MongoError) -> DriverError {
    let message = err.to_string();

    match err.kind.as_ref() {
        ErrorKind::Io(io_err) if io_err.kind() == io::ErrorKind::TimedOut => DriverError::Timeout(message),
        ErrorKind::Io(_) | ErrorKind::ConnectionPoolCleared { .. } | ErrorKind::DnsResolve { .. } => {
            DriverError::Network(message)
        }
        ErrorKind::ServerSelection { .. } => DriverError::Timeout(message),
        ErrorKind::BsonSerialization(_) | ErrorKind::BsonDeserialization(_) => DriverError::Serialization(message),
        ErrorKind::Write(_)
        | ErrorKind::InsertMany(_)
        | ErrorKind::Command(_)
        | ErrorKind::InvalidArgument { .. }
        | ErrorKind::Authentication { .. } => DriverError::Rejected(message),
        _ => DriverError::Other(message),
    }
}

/// Maps an error raised while establishing a connection.
///
/// Server selection failures do not say why no server was selectable; they are
/// reported as refused when the underlying cause was a refused connection and
/// as timeouts otherwise. `waited` is the server selection timeout in effect.
pub(crate) fn connection_error(endpoint: &Endpoint, err: MongoError, waited: Duration) -> ConnectionError {
    let redacted = endpoint.redacted();
    let message = err.to_string();

    match err.kind.as_ref() {
        ErrorKind::InvalidArgument { .. } | ErrorKind::InvalidTlsConfig { .. } => ConnectionError::InvalidEndpoint {
            endpoint: redacted,
            reason: message,
        },
        ErrorKind::Authentication { .. } => ConnectionError::AuthFailed {
            endpoint: redacted,
            message,
        },
        ErrorKind::Command(command) if AUTH_ERROR_CODES.contains(&command.code) => ConnectionError::AuthFailed {
            endpoint: redacted,
            message,
        },
        ErrorKind::Io(io_err) if io_err.kind() == io::ErrorKind::TimedOut => ConnectionError::Timeout {
            endpoint: redacted,
            after: waited,
        },
        ErrorKind::ServerSelection { .. } if !message.to_ascii_lowercase().contains("refused") => {
            ConnectionError::Timeout {
                endpoint: redacted,
                after: waited,
            }
        }
        _ => ConnectionError::Refused {
            endpoint: redacted,
            message,
        },
    }
}
