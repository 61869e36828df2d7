//! # AskGraph
//!
//! **An embedded graph database you query in plain language.**
//!
//! AskGraph stores a labeled property graph and answers questions
//! written as controlled natural language, no query-language manual
//! required. It is designed for local-first applications: one file,
//! zero configuration, safe to share across threads.
//!
//! ## Quickstart
//!
//! Add `askgraph` to your `Cargo.toml`, then:
//!
//! ```rust
//! use askgraph::Database;
//!
//! let db = Database::in_memory();
//! db.query("create person name=\"Alice\", age=30");
//! db.query("create person name=\"Bob\", age=25");
//! db.query("connect Alice to Bob as knows");
//!
//! let result = db.query("find person where age > 26");
//! assert!(result.success);
//! assert_eq!(result.nodes().len(), 1);
//! ```
//!
//! ## Core Concepts
//!
//! - **[`Database`]**: The entry point. Owns the store and the
//!   variable table; safe to clone and share across threads.
//! - **[`QueryResult`]**: The uniform outcome record every query
//!   produces. Failures are results too, never panics.
//! - **[`query`]**: The query engine (re-exported from
//!   `askgraph-query`) for callers that want structured queries
//!   instead of text.

mod error;

use askgraph_query::executor::Executor;
use askgraph_query::variables::VariableTable;
use askgraph_storage::MemoryGraph;
use std::path::Path;
use std::sync::Arc;

pub use askgraph_api::{
    Edge, EntityId, GraphStore, Node, PropertyMap, PropertyValue, StoreReport,
};
pub use askgraph_query as query;
pub use askgraph_query::result::{Payload, QueryResult, SchemaSummary};
pub use error::{Error, Result};

/// The main database handle.
///
/// # Example
///
/// ```ignore
/// use askgraph::Database;
///
/// let db = Database::open("my_graph.json").unwrap();
/// ```
///
/// # Concurrency
///
/// `Database` can be cloned and shared across threads. Mutations are
/// serialized through the store's internal lock; variable definitions
/// go through the table's own lock.
#[derive(Clone)]
pub struct Database {
    store: Arc<MemoryGraph>,
    variables: Arc<VariableTable>,
}

impl Database {
    /// Opens a database backed by a JSON snapshot at the given path.
    ///
    /// A missing file is not an error: the database starts empty and
    /// the file appears on the first mutation. A present but
    /// unreadable snapshot is an error.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let store = MemoryGraph::with_path(path);
        let report = store.load();
        if !report.ok {
            return Err(Error::Store(report.message));
        }
        log::info!("opened database: {}", report.message);
        Ok(Self {
            store: Arc::new(store),
            variables: Arc::new(VariableTable::new()),
        })
    }

    /// Creates a purely in-memory database. Nothing is persisted.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(MemoryGraph::new()),
            variables: Arc::new(VariableTable::new()),
        }
    }

    /// Runs one line of query text and returns the uniform result.
    ///
    /// This never returns an error: parse failures, unresolvable
    /// references, and execution errors all come back as a failed
    /// `QueryResult` with the error text filled in.
    pub fn query(&self, text: &str) -> QueryResult {
        Executor::new(self.store.as_ref(), &self.variables).run(text)
    }

    /// Runs a query and serializes the result to JSON, for embedders
    /// that pass results over a process or language boundary.
    pub fn query_json(&self, text: &str) -> Result<String> {
        let result = self.query(text);
        serde_json::to_string(&result).map_err(|e| Error::Other(e.to_string()))
    }

    /// Defines a variable directly, bypassing query text.
    pub fn define_variable(&self, name: &str, value: PropertyValue) {
        self.variables.define(name, value);
    }

    /// Forces a snapshot flush. Mutating queries already flush; this
    /// exists for embedders that mutate through the store directly.
    pub fn save(&self) -> Result<StoreReport> {
        let report = self.store.save();
        if report.ok {
            Ok(report)
        } else {
            Err(Error::Store(report.message))
        }
    }

    /// Direct access to the underlying store for embedders that want
    /// to bypass the text pipeline.
    pub fn store(&self) -> &dyn GraphStore {
        self.store.as_ref()
    }
}
