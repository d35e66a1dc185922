//! Error types for ML table pipelines

use std::io;
use thiserror::Error;

/// Result type for ML table pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for ML table pipeline operations
#[derive(Error, Debug)]
pub enum Error {
    /// Rows of incompatible shape met in one collect or chain
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A mapper could not resolve a target field to any source column
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Wrong dynamic type requested or value cannot be converted
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// Non-contiguous bitmap append
    #[error("Bitmap range error: cannot append at {at}, bitmap length is {len}")]
    BitmapRange {
        /// Requested append position
        at: usize,
        /// Current logical length of the bitmap
        len: usize,
    },

    /// Checkpoint iteration outside of the retained window
    #[error("Iteration {iteration} is out of stash [{first}, {last}]")]
    StashRange {
        /// Requested iteration
        iteration: usize,
        /// Oldest retained iteration
        first: usize,
        /// Newest retained iteration
        last: usize,
    },

    /// Failure reported by an external producer or sink
    #[error("Upstream error: {0}")]
    Upstream(#[from] anyhow::Error),

    /// IO error during stash or reader operations
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Wrap any external failure as an upstream error
    pub fn upstream<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Upstream(anyhow::Error::new(err))
    }
}
