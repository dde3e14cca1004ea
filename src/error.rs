//! Error types for sample collections, views and persistence

use thiserror::Error;

/// Result type alias for sample operations
pub type Result<T> = std::result::Result<T, SampleError>;

/// Main error type of the crate
#[derive(Error, Debug)]
pub enum SampleError {
    #[error("Collection is empty")]
    EmptyCollection,

    #[error("{what} index {index} out of range (size {len})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Incompatible stream: {0}")]
    IncompatibleStream(String),

    #[error("Insufficient neighbors: requested {requested}, available {available}")]
    InsufficientNeighbors { requested: usize, available: usize },

    #[error("IO error: {0}")]
    IoFailure(#[from] std::io::Error),

    #[error("Invalid parameter: {name}, {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SampleError {
    /// Shorthand for an out-of-range index
    pub fn out_of_range(what: &'static str, index: usize, len: usize) -> Self {
        SampleError::IndexOutOfRange { what, index, len }
    }

    /// Shorthand for an invalid parameter
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        SampleError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for SampleError {
    fn from(err: serde_json::Error) -> Self {
        SampleError::Config(err.to_string())
    }
}

impl From<ndarray::ShapeError> for SampleError {
    fn from(err: ndarray::ShapeError) -> Self {
        SampleError::IncompatibleStream(err.to_string())
    }
}

impl From<xmltree::ParseError> for SampleError {
    fn from(err: xmltree::ParseError) -> Self {
        SampleError::SchemaMismatch(err.to_string())
    }
}
