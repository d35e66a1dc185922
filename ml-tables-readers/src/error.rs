//! Error types for table readers

use thiserror::Error;

/// Error type for table readers
#[derive(Error, Debug)]
pub enum Error {
    /// Core library error
    #[error("Core error: {0}")]
    Core(#[from] ml_tables_core::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV format error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Cell text that does not parse as the column type
    #[error("Format error: {0}")]
    Format(String),

    /// Header does not provide a requested column
    #[error("Schema error: {0}")]
    Schema(String),

    /// Value outside of a frozen enumeration
    #[error("Unknown category '{0}'")]
    UnknownCategory(String),
}

/// Result type for table readers
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for ml_tables_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Core(e) => e,
            Error::Io(e) => ml_tables_core::Error::Io(e),
            other => ml_tables_core::Error::upstream(other),
        }
    }
}
