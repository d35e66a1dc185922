//! Null-aware records, shape mappers, lazy streams and tables for ML pipelines
//!
//! This crate is the data core of the toolkit. Rows are [`Record`]s over a
//! schema discovered at runtime, with a [`Bitmap`] of missing cells. Streams
//! of records are built lazily from combinators on [`Lazy`] and run only when
//! a terminal operation drains them, optionally on worker threads, into an
//! immutable columnar [`Table`].

#![warn(missing_docs)]

pub mod bitmap;
pub mod dataset;
pub mod error;
pub mod lazy;
pub mod mapper;
pub mod memo;
pub mod order;
mod parallel;
pub mod pattern;
pub mod record;
pub mod schedule;
pub mod stash;
pub mod table;
pub mod tensor;
pub mod value;

// Re-export key types for convenience
pub use bitmap::Bitmap;
pub use dataset::{AnyData, Dataset};
pub use error::{Error, Result};
pub use lazy::{Lazy, Pull, Stream};
pub use mapper::{Shape, Transformer, Unwrapper, Wrapper};
pub use pattern::Pattern;
pub use record::{OnlyFilter, Record, TensorUnpacker};
pub use schedule::PipelineConfig;
pub use stash::Stash;
pub use table::{Column, ColumnData, Table};
pub use tensor::{ElementType, Tensor};
pub use value::{DataType, Enum, Value};

static_assertions::assert_impl_all!(Record: Send, Sync, Clone);
static_assertions::assert_impl_all!(Table: Send, Sync, Clone);
static_assertions::assert_impl_all!(Lazy<Record>: Send, Sync, Clone);
static_assertions::assert_impl_all!(Dataset: Send, Sync);
