//! Query layer: controlled-natural-language text in, uniform result
//! records out.
//!
//! The pipeline is parse → variable substitution → dispatch. The
//! parser produces one structured [`ast::Query`] per statement, the
//! [`variables::VariableTable`] resolves `$name` tokens, and the
//! [`executor::Executor`] routes the query to its handler over any
//! [`askgraph_api::GraphStore`].

pub mod aggregate;
pub mod ast;
pub mod conditions;
pub mod error;
pub mod executor;
pub mod join;
pub mod parser;
pub mod result;
pub mod subquery;
pub mod traversal;
pub mod variables;

pub use ast::{Query, QueryKind};
pub use error::{Error, Result};
pub use executor::Executor;
pub use result::{Payload, QueryResult};
pub use variables::VariableTable;
