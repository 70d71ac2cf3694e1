//! The database capability consumed by the Lua façade.
//!
//! The façade never talks to a driver directly. It calls a [`Backend`]
//! obtained from a [`Connector`], which keeps query execution, pooling and the
//! wire protocol outside this crate:
//!
//! - [`mongo`]: MongoDB through the official driver (feature `mongodb`)
//! - [`memory`]: an in-process store, handy for tests and embedders without a
//!   server
//!
//! All methods are async; the façade runs them on a shared tokio runtime
//! under the client's timeout.

pub mod memory;
#[cfg(feature = "mongodb")]
pub mod mongo;

pub use memory::{MemoryBackend, MemoryConnector};
#[cfg(feature = "mongodb")]
pub use mongo::{MongoBackend, MongoConnector};

use crate::Result;
use async_trait::async_trait;
use bson::Document;
use std::fmt;
use std::sync::Arc;

/// A `database.collection` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    /// Database name.
    pub database: String,
    /// Collection name.
    pub collection: String,
}

impl Namespace {
    /// Creates a namespace.
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self { database: database.into(), collection: collection.into() }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Options for `find`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Fields to include or exclude.
    pub projection: Option<Document>,
    /// Sort specification.
    pub sort: Option<Document>,
    /// Number of documents to skip.
    pub skip: Option<u64>,
    /// Maximum number of documents to return.
    pub limit: Option<i64>,
}

/// Options for `findOne`; a single-document lookup has no limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOneOptions {
    /// Fields to include or exclude.
    pub projection: Option<Document>,
    /// Sort specification.
    pub sort: Option<Document>,
    /// Number of documents to skip.
    pub skip: Option<u64>,
}

impl From<FindOptions> for FindOneOptions {
    fn from(opts: FindOptions) -> Self {
        Self { projection: opts.projection, sort: opts.sort, skip: opts.skip }
    }
}

/// Options for `count`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountOptions {
    /// Number of matching documents to skip before counting.
    pub skip: Option<u64>,
    /// Maximum count to report.
    pub limit: Option<u64>,
}

impl From<FindOptions> for CountOptions {
    fn from(opts: FindOptions) -> Self {
        Self { skip: opts.skip, limit: opts.limit.map(|l| l.unsigned_abs()) }
    }
}

/// Options for `update`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Update every matching document instead of the first one.
    pub multi: bool,
    /// Insert a document when nothing matches.
    pub upsert: bool,
}

/// The modification applied by `update`.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateSpec {
    /// Operator document (`{"$set": ...}`) or replacement document.
    Document(Document),
    /// Aggregation pipeline update.
    Pipeline(Vec<Document>),
}

/// Counts reported by `update`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Documents matching the query.
    pub matched: u64,
    /// Documents actually changed.
    pub modified: u64,
    /// Documents inserted by an upsert (0 or 1).
    pub upserted: u64,
}

/// A live connection to a document database.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Lists database names, optionally filtered.
    async fn list_database_names(&self, filter: Option<Document>) -> Result<Vec<String>>;

    /// Lists collection names of a database, optionally filtered.
    async fn list_collection_names(&self, database: &str, filter: Option<Document>) -> Result<Vec<String>>;

    /// Returns every document matching `filter`.
    async fn find(&self, ns: &Namespace, filter: Document, options: FindOptions) -> Result<Vec<Document>>;

    /// Returns the first document matching `filter`, or `None`.
    async fn find_one(&self, ns: &Namespace, filter: Document, options: FindOneOptions)
        -> Result<Option<Document>>;

    /// Inserts one document.
    async fn insert_one(&self, ns: &Namespace, doc: Document) -> Result<()>;

    /// Inserts a batch and returns the number of inserted documents.
    async fn insert_many(&self, ns: &Namespace, docs: Vec<Document>) -> Result<u64>;

    /// Applies `update` to the documents matching `query`.
    async fn update(
        &self,
        ns: &Namespace,
        query: Document,
        update: UpdateSpec,
        options: UpdateOptions,
    ) -> Result<UpdateOutcome>;

    /// Removes one or all matching documents and returns the removed count.
    async fn remove(&self, ns: &Namespace, query: Document, just_one: bool) -> Result<u64>;

    /// Counts matching documents.
    async fn count(&self, ns: &Namespace, filter: Document, options: CountOptions) -> Result<u64>;

    /// Runs an aggregation pipeline.
    async fn aggregate(&self, ns: &Namespace, pipeline: Vec<Document>) -> Result<Vec<Document>>;

    /// Releases the connection. The backend is not used afterwards.
    async fn shutdown(&self) -> Result<()>;
}

/// Opens backends from connection strings.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connects to `uri` and verifies the connection is usable.
    async fn connect(&self, uri: &str) -> Result<Arc<dyn Backend>>;
}
