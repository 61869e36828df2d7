//! Error and result types for the query crate.
//!
//! The taxonomy mirrors how failures surface to callers: syntax
//! errors from the parser, reference errors for unresolvable node
//! names, type errors where coercion has no documented fallback,
//! and unsupported operations the parser recognizes but the
//! dispatcher does not execute. No error escapes the dispatcher as
//! a panic; everything becomes a failed `QueryResult`.

use askgraph_api::StoreError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("reference error: {0}")]
    Reference(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("subquery depth limit of {0} exceeded")]
    DepthExceeded(usize),

    #[error(transparent)]
    Store(#[from] StoreError),
}
