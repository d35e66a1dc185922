//! Materialized columnar tables
//!
//! A [`Table`] owns fully realized, single-typed column arrays with one null
//! bitmap per column. Tables are immutable once built; [`TableBuilder`]
//! appends records into a table while enforcing a fixed schema.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::bitmap::Bitmap;
use crate::error::{Error, Result};
use crate::record::Record;
use crate::tensor::{ElementType, Tensor};
use crate::value::{DataType, Enum, Value};

/// Typed backing array of one column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// Boolean flags
    Bool(Vec<bool>),

    /// Integers
    Int(Vec<i64>),

    /// Single precision floats
    Float32(Vec<f32>),

    /// Double precision floats
    Float64(Vec<f64>),

    /// Strings
    Text(Vec<String>),

    /// Tensors sharing one element type
    Tensor(ElementType, Vec<Tensor>),

    /// Categorical values
    Enum(Vec<Enum>),
}

impl ColumnData {
    /// Empty array of the given type
    pub fn with_capacity(data_type: DataType, capacity: usize) -> Self {
        match data_type {
            DataType::Bool => ColumnData::Bool(Vec::with_capacity(capacity)),
            DataType::Int => ColumnData::Int(Vec::with_capacity(capacity)),
            DataType::Float32 => ColumnData::Float32(Vec::with_capacity(capacity)),
            DataType::Float64 => ColumnData::Float64(Vec::with_capacity(capacity)),
            DataType::Text => ColumnData::Text(Vec::with_capacity(capacity)),
            DataType::Tensor(elem) => ColumnData::Tensor(elem, Vec::with_capacity(capacity)),
            DataType::Enum => ColumnData::Enum(Vec::with_capacity(capacity)),
        }
    }

    /// Dynamic type of the elements
    pub fn data_type(&self) -> DataType {
        match self {
            ColumnData::Bool(_) => DataType::Bool,
            ColumnData::Int(_) => DataType::Int,
            ColumnData::Float32(_) => DataType::Float32,
            ColumnData::Float64(_) => DataType::Float64,
            ColumnData::Text(_) => DataType::Text,
            ColumnData::Tensor(elem, _) => DataType::Tensor(*elem),
            ColumnData::Enum(_) => DataType::Enum,
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Bool(v) => v.len(),
            ColumnData::Int(v) => v.len(),
            ColumnData::Float32(v) => v.len(),
            ColumnData::Float64(v) => v.len(),
            ColumnData::Text(v) => v.len(),
            ColumnData::Tensor(_, v) => v.len(),
            ColumnData::Enum(v) => v.len(),
        }
    }

    /// Check if the array is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append one value of the array's type
    pub fn push(&mut self, value: Value) -> Result<()> {
        match (self, value) {
            (ColumnData::Bool(v), Value::Bool(x)) => v.push(x),
            (ColumnData::Int(v), Value::Int(x)) => v.push(x),
            (ColumnData::Float32(v), Value::Float32(x)) => v.push(x),
            (ColumnData::Float64(v), Value::Float64(x)) => v.push(x),
            (ColumnData::Text(v), Value::Text(x)) => v.push(x),
            (ColumnData::Tensor(elem, v), Value::Tensor(x)) if x.element_type() == *elem => {
                v.push(x);
            }
            (ColumnData::Enum(v), Value::Enum(x)) => v.push(x),
            (data, value) => {
                return Err(Error::SchemaMismatch(format!(
                    "cannot store {} in a {} column",
                    value.data_type(),
                    data.data_type()
                )))
            }
        }
        Ok(())
    }

    /// Element `i` as a value
    ///
    /// # Panics
    ///
    /// Panics if `i` is not below [`ColumnData::len`].
    pub fn get(&self, i: usize) -> Value {
        match self {
            ColumnData::Bool(v) => Value::Bool(v[i]),
            ColumnData::Int(v) => Value::Int(v[i]),
            ColumnData::Float32(v) => Value::Float32(v[i]),
            ColumnData::Float64(v) => Value::Float64(v[i]),
            ColumnData::Text(v) => Value::Text(v[i].clone()),
            ColumnData::Tensor(_, v) => Value::Tensor(v[i].clone()),
            ColumnData::Enum(v) => Value::Enum(v[i].clone()),
        }
    }

    fn slice(&self, lo: usize, hi: usize) -> Self {
        match self {
            ColumnData::Bool(v) => ColumnData::Bool(v[lo..hi].to_vec()),
            ColumnData::Int(v) => ColumnData::Int(v[lo..hi].to_vec()),
            ColumnData::Float32(v) => ColumnData::Float32(v[lo..hi].to_vec()),
            ColumnData::Float64(v) => ColumnData::Float64(v[lo..hi].to_vec()),
            ColumnData::Text(v) => ColumnData::Text(v[lo..hi].to_vec()),
            ColumnData::Tensor(elem, v) => ColumnData::Tensor(*elem, v[lo..hi].to_vec()),
            ColumnData::Enum(v) => ColumnData::Enum(v[lo..hi].to_vec()),
        }
    }
}

/// One named column of a table
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column name
    name: String,

    /// Typed values; missing cells hold a placeholder
    data: ColumnData,

    /// Bit `i` set when row `i` is missing
    na: Bitmap,
}

impl Column {
    /// Create a column
    pub fn new(name: impl Into<String>, data: ColumnData, na: Bitmap) -> Self {
        Self {
            name: name.into(),
            data,
            na,
        }
    }

    /// Column name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dynamic type of the column
    pub fn data_type(&self) -> DataType {
        self.data.data_type()
    }

    /// Typed backing array
    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    /// Null flags
    pub fn na(&self) -> &Bitmap {
        &self.na
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the column has no rows
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Value at row `i`
    ///
    /// # Panics
    ///
    /// Panics if `i` is not below [`Column::len`]. [`Table::row`] checks
    /// the row index instead.
    pub fn value(&self, i: usize) -> Value {
        self.data.get(i)
    }

    /// Null flag at row `i`
    pub fn is_na(&self, i: usize) -> bool {
        self.na.bit(i)
    }

    /// Integer values
    pub fn ints(&self) -> Result<&[i64]> {
        match &self.data {
            ColumnData::Int(v) => Ok(v),
            _ => Err(self.mismatch(DataType::Int)),
        }
    }

    /// Double precision values
    pub fn floats(&self) -> Result<&[f64]> {
        match &self.data {
            ColumnData::Float64(v) => Ok(v),
            _ => Err(self.mismatch(DataType::Float64)),
        }
    }

    /// Single precision values
    pub fn reals(&self) -> Result<&[f32]> {
        match &self.data {
            ColumnData::Float32(v) => Ok(v),
            _ => Err(self.mismatch(DataType::Float32)),
        }
    }

    /// Text values
    pub fn texts(&self) -> Result<&[String]> {
        match &self.data {
            ColumnData::Text(v) => Ok(v),
            _ => Err(self.mismatch(DataType::Text)),
        }
    }

    /// Boolean values
    pub fn flags(&self) -> Result<&[bool]> {
        match &self.data {
            ColumnData::Bool(v) => Ok(v),
            _ => Err(self.mismatch(DataType::Bool)),
        }
    }

    /// Tensor values
    pub fn tensors(&self) -> Result<&[Tensor]> {
        match &self.data {
            ColumnData::Tensor(_, v) => Ok(v),
            _ => Err(Error::TypeMismatch(format!(
                "column '{}' is {}, not a tensor column",
                self.name,
                self.data_type()
            ))),
        }
    }

    /// Categorical values
    pub fn enums(&self) -> Result<&[Enum]> {
        match &self.data {
            ColumnData::Enum(v) => Ok(v),
            _ => Err(self.mismatch(DataType::Enum)),
        }
    }

    fn mismatch(&self, wanted: DataType) -> Error {
        Error::TypeMismatch(format!(
            "column '{}' is {}, not {wanted}",
            self.name,
            self.data_type()
        ))
    }
}

/// Immutable in-memory columnar table
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    names: Arc<Vec<String>>,
    columns: Vec<Column>,
    len: usize,
}

impl Table {
    /// Create a table from columns of equal length
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let len = columns.first().map_or(0, Column::len);
        let mut names = Vec::with_capacity(columns.len());
        for c in &columns {
            if c.len() != len {
                return Err(Error::SchemaMismatch(format!(
                    "column '{}' has {} rows, expected {len}",
                    c.name,
                    c.len()
                )));
            }
            if names.contains(&c.name) {
                return Err(Error::InvalidArgument(format!(
                    "duplicate column name '{}'",
                    c.name
                )));
            }
            names.push(c.name.clone());
        }
        Ok(Self {
            names: Arc::new(names),
            columns,
            len,
        })
    }

    /// Table with no columns and no rows
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the table has no rows
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Column names
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// All columns
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column by name
    pub fn column(&self, name: &str) -> Result<&Column> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| Error::Mapping(format!("table has no column '{name}'")))
    }

    /// Row `i` as a record
    pub fn row(&self, i: usize) -> Result<Record> {
        if i >= self.len {
            return Err(Error::InvalidArgument(format!(
                "row {i} is out of table of {} rows",
                self.len
            )));
        }
        let mut na = Bitmap::new();
        let values = self
            .columns
            .iter()
            .enumerate()
            .map(|(j, c)| {
                if c.na.bit(i) {
                    na.set(j, true);
                }
                c.data.get(i)
            })
            .collect();
        Ok(Record::assemble(Arc::clone(&self.names), values, na))
    }

    /// Independent copy of rows `lo..hi`, clamped to the table
    pub fn slice(&self, lo: usize, hi: usize) -> Table {
        let hi = hi.min(self.len);
        let lo = lo.min(hi);
        Table {
            names: Arc::clone(&self.names),
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    data: c.data.slice(lo, hi),
                    na: c.na.slice(lo, hi),
                })
                .collect(),
            len: hi - lo,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Table[{}x{}]", self.len, self.columns.len())?;
        writeln!(f, "{}", self.names.join("\t"))?;
        for i in 0..self.len {
            for (j, c) in self.columns.iter().enumerate() {
                if j > 0 {
                    write!(f, "\t")?;
                }
                if c.na.bit(i) {
                    write!(f, "N/A")?;
                } else {
                    write!(f, "{}", c.data.get(i))?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Appends records into a table under a schema fixed by the first record
#[derive(Debug)]
pub struct TableBuilder {
    capacity: usize,
    names: Option<Arc<Vec<String>>>,
    data: Vec<ColumnData>,
    na: Vec<Bitmap>,
    len: usize,
}

impl TableBuilder {
    /// Create a builder with an initial per-column capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            names: None,
            data: Vec::new(),
            na: Vec::new(),
            len: 0,
        }
    }

    /// Number of rows appended so far
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if no rows were appended
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append one record
    ///
    /// The first record fixes names and column types. Later records must
    /// match both exactly.
    pub fn push(&mut self, record: Record) -> Result<()> {
        match &self.names {
            None => {
                self.data = record
                    .values()
                    .iter()
                    .map(|v| ColumnData::with_capacity(v.data_type(), self.capacity))
                    .collect();
                self.na = vec![Bitmap::new(); record.len()];
                debug!(columns = record.len(), "collect schema fixed");
                self.names = Some(record.shared_names());
            }
            Some(names) => {
                if !Arc::ptr_eq(names, &record.shared_names()) && names.as_slice() != record.names()
                {
                    return Err(Error::SchemaMismatch(format!(
                        "row {} has columns {:?}, expected {:?}",
                        self.len,
                        record.names(),
                        names
                    )));
                }
            }
        }
        for (j, value) in record.values().iter().enumerate() {
            let expected = self.data[j].data_type();
            if value.data_type() != expected {
                return Err(Error::SchemaMismatch(format!(
                    "row {} column {j} is {}, expected {expected}",
                    self.len,
                    value.data_type()
                )));
            }
        }
        for (j, value) in record.values().iter().enumerate() {
            self.data[j].push(value.clone())?;
            if record.is_na_at(j) {
                self.na[j].set(self.len, true);
            }
        }
        self.len += 1;
        Ok(())
    }

    /// Finish into an immutable table
    pub fn finish(self) -> Table {
        let Some(names) = self.names else {
            return Table::empty();
        };
        let columns = names
            .iter()
            .zip(self.data)
            .zip(self.na)
            .map(|((name, data), na)| Column {
                name: name.clone(),
                data,
                na,
            })
            .collect();
        Table {
            names,
            columns,
            len: self.len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(a: i64, b: f64) -> Record {
        Record::from_pairs([("a", Value::Int(a)), ("b", Value::Float64(b))]).unwrap()
    }

    fn table() -> Table {
        let mut builder = TableBuilder::new(4);
        builder.push(row(1, 0.5)).unwrap();
        builder.push(row(2, 1.5).set_na("b", 1.5, true)).unwrap();
        builder.push(row(3, 2.5)).unwrap();
        builder.finish()
    }

    #[test]
    fn test_builder_collects_columns() {
        let t = table();
        assert_eq!(t.len(), 3);
        assert_eq!(t.names(), &["a", "b"]);
        assert_eq!(t.column("a").unwrap().ints().unwrap(), &[1, 2, 3]);
        assert_eq!(t.column("b").unwrap().floats().unwrap(), &[0.5, 1.5, 2.5]);
        assert!(t.column("b").unwrap().is_na(1));
        assert!(t.column("a").unwrap().reals().is_err());
    }

    #[test]
    #[should_panic(expected = "index out of bounds")]
    fn test_column_value_past_end_panics() {
        let t = table();
        assert!(t.row(3).is_err());
        let _ = t.column("a").unwrap().value(3);
    }

    #[test]
    fn test_row_round_trips_nulls() {
        let t = table();
        let r = t.row(1).unwrap();
        assert_eq!(r.int("a").unwrap(), 2);
        assert!(r.is_na("b").unwrap());
        assert!(t.row(3).is_err());
    }

    #[test]
    fn test_builder_rejects_schema_drift() {
        let mut builder = TableBuilder::new(1);
        builder.push(row(1, 0.5)).unwrap();
        let renamed = Record::from_pairs([("a", Value::Int(1)), ("c", Value::Float64(0.0))]).unwrap();
        assert!(matches!(builder.push(renamed), Err(Error::SchemaMismatch(_))));
        let retyped = Record::from_pairs([("a", Value::Int(1)), ("b", Value::Int(0))]).unwrap();
        assert!(matches!(builder.push(retyped), Err(Error::SchemaMismatch(_))));
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn test_slice_is_clamped() {
        let t = table().slice(1, 10);
        assert_eq!(t.len(), 2);
        assert_eq!(t.column("a").unwrap().ints().unwrap(), &[2, 3]);
        assert!(t.column("b").unwrap().is_na(0));
    }

    #[test]
    fn test_new_checks_lengths() {
        let a = Column::new("a", ColumnData::Int(vec![1, 2]), Bitmap::new());
        let b = Column::new("b", ColumnData::Bool(vec![true]), Bitmap::new());
        assert!(Table::new(vec![a.clone(), b]).is_err());
        assert_eq!(Table::new(vec![a]).unwrap().len(), 2);
    }

    #[test]
    fn test_empty_builder_finishes_empty() {
        let t = TableBuilder::new(13).finish();
        assert!(t.is_empty());
        assert!(t.names().is_empty());
    }

    #[test]
    fn test_display() {
        let s = table().slice(0, 2).to_string();
        assert_eq!(s, "Table[2x2]\na\tb\n1\t0.5\n2\tN/A\n");
    }
}
