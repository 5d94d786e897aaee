//! Database and collection handles.
//!
//! Handles are lightweight, validated names scoped to a [`ClientHandle`]. They
//! borrow the client handle rather than owning it, so a client cannot be
//! released while a handle derived from it is still alive.
//!
//! - [`Namespace`] - an owned `(database, collection)` pair, as passed to drivers
//! - [`DatabaseHandle`] - a database on a connected client
//! - [`CollectionHandle`] - a collection on a connected client; the unit operations run against
//!
//! # Example
//!
//! ```ignore
//! let client = manager.connect("memory://local").await?;
//! let customers = CollectionHandle::of(&client, "shop", "customers")?;
//! // or, step by step
//! let customers = client.database("shop")?.collection("customers")?;
//! ```

use std::fmt;

use crate::{
    connection::ClientHandle,
    driver::DriverClient,
    error::{NameKind, ValidationError},
};

fn validate_name(name: &str, kind: NameKind) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyName(kind));
    }

    Ok(())
}

/// A `(database, collection)` pair with non-empty names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    database: String,
    collection: String,
}

impl Namespace {
    /// Creates a namespace.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyName`] if either name is empty. The
    /// database name is checked first.
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Result<Self, ValidationError> {
        let database = database.into();
        let collection = collection.into();

        validate_name(&database, NameKind::Database)?;
        validate_name(&collection, NameKind::Collection)?;

        Ok(Self { database, collection })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// A database on a connected client.
pub struct DatabaseHandle<'c, D: DriverClient> {
    client: &'c ClientHandle<D>,
    name: String,
}

impl<'c, D: DriverClient> DatabaseHandle<'c, D> {
    /// Creates a database handle. No I/O is performed.
    pub fn of(client: &'c ClientHandle<D>, name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        validate_name(&name, NameKind::Database)?;

        Ok(Self { client, name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client(&self) -> &'c ClientHandle<D> {
        self.client
    }

    /// Derives a handle for a collection in this database.
    pub fn collection(&self, name: impl Into<String>) -> Result<CollectionHandle<'c, D>, ValidationError> {
        CollectionHandle::of(self.client, self.name.clone(), name)
    }

    pub(crate) fn driver(&self) -> &'c D {
        self.client.driver()
    }
}

impl<D: DriverClient> Clone for DatabaseHandle<'_, D> {
    fn clone(&self) -> Self {
        Self {
            client: self.client,
            name: self.name.clone(),
        }
    }
}

impl<D: DriverClient> PartialEq for DatabaseHandle<'_, D> {
    fn eq(&self, other: &Self) -> bool {
        self.client.shares_connection_with(other.client) && self.name == other.name
    }
}

impl<D: DriverClient> Eq for DatabaseHandle<'_, D> {}

impl<D: DriverClient> fmt::Debug for DatabaseHandle<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseHandle")
            .field("connection", &self.client.connection_id())
            .field("name", &self.name)
            .finish()
    }
}

/// A collection on a connected client.
///
/// Immutable once constructed. Two handles are equal when they refer to the same
/// underlying connection and the same names.
pub struct CollectionHandle<'c, D: DriverClient> {
    client: &'c ClientHandle<D>,
    namespace: Namespace,
}

impl<'c, D: DriverClient> CollectionHandle<'c, D> {
    /// Creates a collection handle. Pure: no I/O is performed.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyName`] if either name is empty.
    pub fn of(
        client: &'c ClientHandle<D>,
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            client,
            namespace: Namespace::new(database, collection)?,
        })
    }

    pub fn database(&self) -> &str {
        self.namespace.database()
    }

    pub fn name(&self) -> &str {
        self.namespace.collection()
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn client(&self) -> &'c ClientHandle<D> {
        self.client
    }

    pub(crate) fn driver(&self) -> &'c D {
        self.client.driver()
    }
}

impl<D: DriverClient> Clone for CollectionHandle<'_, D> {
    fn clone(&self) -> Self {
        Self {
            client: self.client,
            namespace: self.namespace.clone(),
        }
    }
}

impl<D: DriverClient> PartialEq for CollectionHandle<'_, D> {
    fn eq(&self, other: &Self) -> bool {
        self.client.shares_connection_with(other.client) && self.namespace == other.namespace
    }
}

impl<D: DriverClient> Eq for CollectionHandle<'_, D> {}

impl<D: DriverClient> fmt::Debug for CollectionHandle<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionHandle")
            .field("connection", &self.client.connection_id())
            .field("namespace", &self.namespace)
            .finish()
    }
}
