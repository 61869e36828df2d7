use std::fmt;

/// The error type for AskGraph operations.
#[derive(Debug)]
pub enum Error {
    /// IO error interacting with the filesystem.
    Io(std::io::Error),
    /// Error returned by the graph store.
    Store(String),
    /// Error during query parsing or execution.
    Query(String),
    /// Other errors.
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Store(e) => write!(f, "Store error: {}", e),
            Error::Query(e) => write!(f, "Query error: {}", e),
            Error::Other(e) => write!(f, "Error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

// Convert store errors to string to hide internal types
impl From<askgraph_api::StoreError> for Error {
    fn from(e: askgraph_api::StoreError) -> Self {
        match e {
            askgraph_api::StoreError::Io(e) => Error::Io(e),
            other => Error::Store(other.to_string()),
        }
    }
}

impl From<askgraph_query::Error> for Error {
    fn from(e: askgraph_query::Error) -> Self {
        Error::Query(e.to_string())
    }
}

/// A specialized Result type for AskGraph operations.
pub type Result<T> = std::result::Result<T, Error>;
