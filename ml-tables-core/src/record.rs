//! Null-aware records over a runtime schema
//!
//! A [`Record`] is one logical row: ordered unique column names, a parallel
//! list of values, and a null bitmap where bit `i` marks column `i` as
//! missing. Column names are shared between records behind a reference
//! count and copied only when a record changes its structure.

use std::fmt;
use std::sync::Arc;

use crate::bitmap::Bitmap;
use crate::error::{Error, Result};
use crate::pattern::Pattern;
use crate::tensor::Tensor;
use crate::value::{DataType, Value};

/// One row of named, dynamically typed, possibly missing values
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    /// Column names, shared copy-on-write
    names: Arc<Vec<String>>,

    /// Values parallel to `names`
    values: Vec<Value>,

    /// Bit `i` set when column `i` is missing
    na: Bitmap,
}

impl Record {
    /// Create a record with no missing values
    pub fn new(names: Vec<String>, values: Vec<Value>) -> Result<Self> {
        Self::from_parts(Arc::new(names), values, Bitmap::new())
    }

    /// Create a record from shared names, values and null flags
    pub fn from_parts(names: Arc<Vec<String>>, values: Vec<Value>, na: Bitmap) -> Result<Self> {
        if names.len() != values.len() {
            return Err(Error::InvalidArgument(format!(
                "record has {} names but {} values",
                names.len(),
                values.len()
            )));
        }
        for (i, n) in names.iter().enumerate() {
            if names[..i].contains(n) {
                return Err(Error::InvalidArgument(format!("duplicate column name '{n}'")));
            }
        }
        Ok(Self { names, values, na })
    }

    /// Assemble a record whose names are known to be unique and match `values`
    pub(crate) fn assemble(names: Arc<Vec<String>>, values: Vec<Value>, na: Bitmap) -> Self {
        debug_assert_eq!(names.len(), values.len());
        Self { names, values, na }
    }

    /// Record over the same columns as this one holding other values
    ///
    /// The names are shared and not validated again, which makes this the
    /// cheap way to build many rows of one schema.
    pub fn sibling(&self, values: Vec<Value>, na: Bitmap) -> Result<Record> {
        if values.len() != self.names.len() {
            return Err(Error::InvalidArgument(format!(
                "record has {} names but {} values",
                self.names.len(),
                values.len()
            )));
        }
        Ok(Self::assemble(Arc::clone(&self.names), values, na))
    }

    /// Create a record from `(name, value)` pairs
    pub fn from_pairs<N, I>(pairs: I) -> Result<Self>
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, Value)>,
    {
        let (names, values): (Vec<String>, Vec<Value>) =
            pairs.into_iter().map(|(n, v)| (n.into(), v)).unzip();
        Self::new(names, values)
    }

    /// Column names
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Shared handle to the column names
    pub fn shared_names(&self) -> Arc<Vec<String>> {
        Arc::clone(&self.names)
    }

    /// Values in column order
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Null flags
    pub fn na(&self) -> &Bitmap {
        &self.na
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the record has no columns
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Position of a column
    pub fn pos(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Value at a column position
    ///
    /// # Panics
    ///
    /// Panics if `i` is not below [`Record::len`]. Use [`Record::value`] for
    /// a checked lookup by name.
    pub fn value_at(&self, i: usize) -> &Value {
        &self.values[i]
    }

    /// Null flag at a column position; false past the last column
    pub fn is_na_at(&self, i: usize) -> bool {
        self.na.bit(i)
    }

    /// Value of a named column
    pub fn value(&self, name: &str) -> Result<&Value> {
        let j = self.require(name)?;
        Ok(&self.values[j])
    }

    /// Null flag of a named column
    pub fn is_na(&self, name: &str) -> Result<bool> {
        let j = self.require(name)?;
        Ok(self.na.bit(j))
    }

    /// Integer column
    pub fn int(&self, name: &str) -> Result<i64> {
        match self.value(name)? {
            Value::Int(i) => Ok(*i),
            other => Err(mismatch(name, DataType::Int, other)),
        }
    }

    /// Double precision column
    pub fn float(&self, name: &str) -> Result<f64> {
        match self.value(name)? {
            Value::Float64(x) => Ok(*x),
            other => Err(mismatch(name, DataType::Float64, other)),
        }
    }

    /// Single precision column
    pub fn real(&self, name: &str) -> Result<f32> {
        match self.value(name)? {
            Value::Float32(x) => Ok(*x),
            other => Err(mismatch(name, DataType::Float32, other)),
        }
    }

    /// Text column
    pub fn text(&self, name: &str) -> Result<&str> {
        match self.value(name)? {
            Value::Text(s) => Ok(s),
            other => Err(mismatch(name, DataType::Text, other)),
        }
    }

    /// Boolean column
    pub fn flag(&self, name: &str) -> Result<bool> {
        match self.value(name)? {
            Value::Bool(b) => Ok(*b),
            other => Err(mismatch(name, DataType::Bool, other)),
        }
    }

    /// Tensor column
    pub fn tensor(&self, name: &str) -> Result<&Tensor> {
        match self.value(name)? {
            Value::Tensor(t) => Ok(t),
            other => Err(Error::TypeMismatch(format!(
                "column '{name}' is {}, not a tensor",
                other.data_type()
            ))),
        }
    }

    /// Independent copy with room for `extra` more columns
    pub fn copy(&self, extra: usize) -> Record {
        let mut names = Vec::with_capacity(self.names.len() + extra);
        names.extend(self.names.iter().cloned());
        let mut values = Vec::with_capacity(self.values.len() + extra);
        values.extend(self.values.iter().cloned());
        Record {
            names: Arc::new(names),
            values,
            na: self.na.clone(),
        }
    }

    /// Right-biased merge: columns of `other` overwrite or extend by name
    pub fn with(&self, other: &Record) -> Record {
        let mut r = self.clone();
        for (i, name) in other.names.iter().enumerate() {
            r.assign(name, other.values[i].clone(), other.na.bit(i));
        }
        r
    }

    /// Assign or append a column, clearing its null flag
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Record {
        self.clone().put(name, value.into(), false)
    }

    /// Assign or append a column with an explicit null flag
    pub fn set_na(&self, name: &str, value: impl Into<Value>, na: bool) -> Record {
        self.clone().put(name, value.into(), na)
    }

    /// Consuming form of [`Record::set_na`]
    pub fn put(mut self, name: &str, value: Value, na: bool) -> Record {
        self.assign(name, value, na);
        self
    }

    /// Copy with floating columns rounded half away from zero
    pub fn round(&self, precision: i32) -> Record {
        Record {
            names: Arc::clone(&self.names),
            values: self.values.iter().map(|v| v.round(precision)).collect(),
            na: self.na.clone(),
        }
    }

    /// Expand a tensor column into scalar columns `<column>1..<column>N`
    pub fn unpack_tensor(&self, column: &str) -> Result<Record> {
        TensorUnpacker::new(self, column)?.apply(self)
    }

    fn assign(&mut self, name: &str, value: Value, na: bool) {
        let j = match self.pos(name) {
            Some(j) => {
                self.values[j] = value;
                j
            }
            None => {
                Arc::make_mut(&mut self.names).push(name.to_string());
                self.values.push(value);
                self.values.len() - 1
            }
        };
        self.na.set(j, na);
    }

    fn require(&self, name: &str) -> Result<usize> {
        self.pos(name)
            .ok_or_else(|| Error::Mapping(format!("record has no column '{name}'")))
    }
}

fn mismatch(name: &str, wanted: DataType, got: &Value) -> Error {
    Error::TypeMismatch(format!(
        "column '{name}' is {}, not {wanted}",
        got.data_type()
    ))
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Record{{")?;
        for (i, n) in self.names.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if self.na.bit(i) {
                write!(f, "{n}:N/A")?;
            } else {
                write!(f, "{n}:{}", self.values[i])?;
            }
        }
        write!(f, "}}")
    }
}

/// Reusable projection onto the columns matching any of a set of patterns
///
/// Patterns are tried in order and the first match wins, so every source
/// column appears at most once, in source order.
#[derive(Debug, Clone)]
pub struct OnlyFilter {
    names: Arc<Vec<String>>,
    indices: Vec<usize>,
}

impl OnlyFilter {
    /// Resolve the projection against a set of column names
    pub fn new(names: &[String], patterns: &[Pattern]) -> Self {
        let mut kept = Vec::with_capacity(names.len());
        let mut indices = Vec::with_capacity(names.len());
        for (i, n) in names.iter().enumerate() {
            if patterns.iter().any(|p| p.matches(n)) {
                kept.push(n.clone());
                indices.push(i);
            }
        }
        Self {
            names: Arc::new(kept),
            indices,
        }
    }

    /// Names kept by the projection
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Project one record
    pub fn apply(&self, record: &Record) -> Record {
        let mut na = Bitmap::new();
        let values = self
            .indices
            .iter()
            .enumerate()
            .map(|(k, &i)| {
                if record.na.bit(i) {
                    na.set(k, true);
                }
                record.values[i].clone()
            })
            .collect();
        Record {
            names: Arc::clone(&self.names),
            values,
            na,
        }
    }
}

/// Expands one tensor column into `volume` scalar columns
#[derive(Debug, Clone)]
pub struct TensorUnpacker {
    column: usize,
    volume: usize,
    names: Arc<Vec<String>>,
}

impl TensorUnpacker {
    /// Build the unpacker from a sample record
    pub fn new(sample: &Record, column: &str) -> Result<Self> {
        let j = sample.require(column)?;
        let volume = sample.tensor(column)?.volume();
        let mut names: Vec<String> = sample
            .names
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != j)
            .map(|(_, n)| n.clone())
            .collect();
        names.extend((1..=volume).map(|k| format!("{column}{k}")));
        Ok(Self {
            column: j,
            volume,
            names: Arc::new(names),
        })
    }

    /// Names produced by the unpacker
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Unpack one record; its tensor must have the sample's volume
    pub fn apply(&self, record: &Record) -> Result<Record> {
        let tensor = match record.values.get(self.column) {
            Some(Value::Tensor(t)) => t,
            _ => {
                return Err(Error::TypeMismatch(format!(
                    "column {} is not a tensor",
                    self.column
                )))
            }
        };
        if tensor.volume() != self.volume {
            return Err(Error::TypeMismatch(format!(
                "tensor volume {} differs from expected {}",
                tensor.volume(),
                self.volume
            )));
        }
        let mut values = Vec::with_capacity(self.names.len());
        let mut na = Bitmap::new();
        for (i, v) in record.values.iter().enumerate() {
            if i != self.column {
                if record.na.bit(i) {
                    na.set(values.len(), true);
                }
                values.push(v.clone());
            }
        }
        let missing = record.na.bit(self.column);
        for v in tensor.extract() {
            if missing {
                na.set(values.len(), true);
            }
            values.push(v);
        }
        Ok(Record {
            names: Arc::clone(&self.names),
            values,
            na,
        })
    }
}
