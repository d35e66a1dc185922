//! CSV resolvers and categorical encoders for ML table pipelines
//!
//! Columns of a CSV file are bound to record columns through [`Column`]
//! resolvers. Categorical cells are encoded through shared [`Enumset`]s.

#![warn(missing_docs)]

pub mod csv;
pub mod enumset;
mod error;
pub mod resolver;

pub use self::csv::{read, read_file, read_with, write, write_with, CsvOptions};
pub use enumset::Enumset;
pub use error::{Error, Result};
pub use resolver::{Categorical, Category, Column, Resolver, Scalar, TensorText};
