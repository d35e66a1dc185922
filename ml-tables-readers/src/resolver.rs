//! Text cell resolvers
//!
//! A [`Resolver`] turns the text of one CSV cell into a typed [`Value`] plus
//! a null flag, and formats a value back into text. A [`Column`] binds a
//! resolver to a source header and a record column name. A grouped column
//! binds every header matching its source pattern to one tensor column.

use std::fmt;
use std::sync::Arc;

use ml_tables_core::tensor::TensorData;
use ml_tables_core::{DataType, ElementType, Enum, Tensor, Value};

use crate::enumset::Enumset;
use crate::error::{Error, Result};

/// Conversion between cell text and typed values
pub trait Resolver: Send + Sync + fmt::Debug {
    /// Type of the converted values
    fn data_type(&self) -> DataType;

    /// Convert cell text into a value and its null flag
    fn convert(&self, text: &str) -> Result<(Value, bool)>;

    /// Format a value as cell text; nulls become empty cells
    fn format(&self, value: &Value, na: bool) -> Result<String> {
        Ok(if na { String::new() } else { value.to_string() })
    }
}

fn parse<T: std::str::FromStr>(text: &str, what: &str) -> Result<T> {
    text.trim()
        .parse()
        .map_err(|_| Error::Format(format!("'{text}' is not a valid {what}")))
}

fn parse_all<T: std::str::FromStr>(parts: &[&str], what: &str) -> Result<Vec<T>> {
    parts.iter().map(|p| parse(p, what)).collect()
}

/// Scalar column of a fixed type
///
/// Empty cells are nulls, except for text columns where they are empty
/// strings.
#[derive(Debug, Clone, Copy)]
pub struct Scalar(pub DataType);

impl Resolver for Scalar {
    fn data_type(&self) -> DataType {
        self.0
    }

    fn convert(&self, text: &str) -> Result<(Value, bool)> {
        if text.is_empty() && self.0 != DataType::Text {
            return Ok((Value::zero(self.0), true));
        }
        let value = match self.0 {
            DataType::Int => Value::Int(parse(text, "integer")?),
            DataType::Float32 => Value::Float32(parse(text, "float")?),
            DataType::Float64 => Value::Float64(parse(text, "float")?),
            DataType::Text => Value::Text(text.to_string()),
            DataType::Bool => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Value::Bool(true),
                "false" | "0" => Value::Bool(false),
                _ => return Err(Error::Format(format!("'{text}' is not a valid boolean"))),
            },
            other => {
                return Err(Error::Format(format!("{other} is not a scalar column type")));
            }
        };
        Ok((value, false))
    }
}

/// One-dimensional tensor with elements separated by `:`
#[derive(Debug, Clone, Copy)]
pub struct TensorText(pub ElementType);

impl TensorText {
    fn elements(&self, parts: &[&str]) -> Result<TensorData> {
        Ok(match self.0 {
            ElementType::UInt8 => TensorData::UInt8(parse_all(parts, "byte")?),
            ElementType::Int64 => TensorData::Int64(parse_all(parts, "integer")?),
            ElementType::Float32 => TensorData::Float32(parse_all(parts, "float")?),
            ElementType::Float64 => TensorData::Float64(parse_all(parts, "float")?),
        })
    }
}

impl Resolver for TensorText {
    fn data_type(&self) -> DataType {
        DataType::Tensor(self.0)
    }

    fn convert(&self, text: &str) -> Result<(Value, bool)> {
        if text.is_empty() {
            return Ok((Value::zero(self.data_type()), true));
        }
        let parts: Vec<&str> = text.split(':').collect();
        let tensor = Tensor::new(vec![parts.len()], self.elements(&parts)?)?;
        Ok((Value::Tensor(tensor), false))
    }

    fn format(&self, value: &Value, na: bool) -> Result<String> {
        if na {
            return Ok(String::new());
        }
        let Some(tensor) = value.as_tensor() else {
            return Err(Error::Format(format!("{} is not a tensor", value.data_type())));
        };
        let cells: Vec<String> = tensor.extract().iter().map(ToString::to_string).collect();
        Ok(cells.join(":"))
    }
}

/// Representation of a categorical column in records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// [`Enum`] values carrying text and ordinal
    Enum,

    /// The category text; the enumeration only records it
    Text,

    /// The ordinal as an integer
    Integer,

    /// The ordinal as a single precision float
    Float32,
}

/// Categorical column encoded through an [`Enumset`]
#[derive(Debug, Clone)]
pub struct Categorical {
    set: Enumset,
    category: Category,
}

impl Categorical {
    /// Encode cells through `set` into the `category` representation
    pub fn new(set: Enumset, category: Category) -> Self {
        Self { set, category }
    }

    fn known(&self, text: &str) -> Result<String> {
        match self.set.ordinal(text) {
            Some(_) => Ok(text.to_string()),
            None => Err(Error::UnknownCategory(text.to_string())),
        }
    }

    fn text_of(&self, ordinal: i64) -> Result<String> {
        self.set
            .text(ordinal)
            .ok_or_else(|| Error::UnknownCategory(ordinal.to_string()))
    }
}

impl Resolver for Categorical {
    fn data_type(&self) -> DataType {
        match self.category {
            Category::Enum => DataType::Enum,
            Category::Text => DataType::Text,
            Category::Integer => DataType::Int,
            Category::Float32 => DataType::Float32,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn convert(&self, text: &str) -> Result<(Value, bool)> {
        if text.is_empty() {
            return Ok((Value::zero(self.data_type()), true));
        }
        let ordinal = self.set.enumerate(text)?;
        let value = match self.category {
            Category::Enum => Value::Enum(Enum::new(text, ordinal)),
            Category::Text => Value::Text(text.to_string()),
            Category::Integer => Value::Int(ordinal),
            Category::Float32 => Value::Float32(ordinal as f32),
        };
        Ok((value, false))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn format(&self, value: &Value, na: bool) -> Result<String> {
        if na {
            return Ok(String::new());
        }
        match value {
            Value::Enum(e) => self.known(&e.text),
            Value::Text(t) => self.known(t),
            Value::Int(ordinal) => self.text_of(*ordinal),
            Value::Float32(x) => self.text_of(x.round() as i64),
            other => Err(Error::Format(format!("{} is not a category", other.data_type()))),
        }
    }
}

/// Binding of a CSV header to a record column
#[derive(Debug, Clone)]
pub struct Column {
    source: String,
    name: String,
    resolver: Arc<dyn Resolver>,
    precision: Option<i32>,
    /// Tensor element type of a grouped column
    group: Option<ElementType>,
}

impl Column {
    /// Read header `source` through `resolver` into a column of the same name
    pub fn new(source: &str, resolver: impl Resolver + 'static) -> Self {
        Self {
            source: source.to_string(),
            name: source.to_string(),
            resolver: Arc::new(resolver),
            precision: None,
            group: None,
        }
    }

    /// Integer column
    pub fn int(source: &str) -> Self {
        Self::new(source, Scalar(DataType::Int))
    }

    /// Single precision float column
    pub fn float32(source: &str) -> Self {
        Self::new(source, Scalar(DataType::Float32))
    }

    /// Double precision float column
    pub fn float64(source: &str) -> Self {
        Self::new(source, Scalar(DataType::Float64))
    }

    /// Text column
    pub fn text(source: &str) -> Self {
        Self::new(source, Scalar(DataType::Text))
    }

    /// Boolean column
    pub fn bool(source: &str) -> Self {
        Self::new(source, Scalar(DataType::Bool))
    }

    /// Single precision tensor column
    pub fn tensor32f(source: &str) -> Self {
        Self::new(source, TensorText(ElementType::Float32))
    }

    /// Double precision tensor column
    pub fn tensor64f(source: &str) -> Self {
        Self::new(source, TensorText(ElementType::Float64))
    }

    /// Byte tensor column
    pub fn tensor8u(source: &str) -> Self {
        Self::new(source, TensorText(ElementType::UInt8))
    }

    /// Categorical column encoded through `set`
    pub fn categorical(source: &str, set: &Enumset, category: Category) -> Self {
        Self::new(source, Categorical::new(set.clone(), category))
    }

    /// Rename the record column
    #[must_use]
    pub fn as_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Round floats to `precision` decimals when formatting
    #[must_use]
    pub fn round(mut self, precision: i32) -> Self {
        self.precision = Some(precision);
        self
    }

    /// Collect every header matching the source pattern into tensor column `name`
    ///
    /// Cells become tensor elements in header order, each converted by this
    /// column's resolver. The tensor is null when every cell is empty; any
    /// other empty cell becomes NaN, or 0 in an integer group. On write the
    /// tensor spreads over headers `<name>1..<name>N` and NaN elements are
    /// written as empty cells.
    pub fn group(mut self, name: &str) -> Result<Self> {
        let element = match self.resolver.data_type() {
            DataType::Int => ElementType::Int64,
            DataType::Float32 => ElementType::Float32,
            DataType::Float64 => ElementType::Float64,
            other => {
                return Err(Error::Schema(format!(
                    "column '{}' of {other} cannot be grouped",
                    self.source
                )))
            }
        };
        self.group = Some(element);
        self.name = name.to_string();
        Ok(self)
    }

    /// Check if this column groups several headers
    pub fn is_group(&self) -> bool {
        self.group.is_some()
    }

    /// CSV header, or header pattern of a grouped column
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Record column name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type of the record column
    pub fn data_type(&self) -> DataType {
        match self.group {
            Some(element) => DataType::Tensor(element),
            None => self.resolver.data_type(),
        }
    }

    /// Convert cell text of this column
    pub fn convert(&self, text: &str) -> Result<(Value, bool)> {
        self.resolver.convert(text).map_err(|e| match e {
            Error::Format(message) => Error::Format(format!("column '{}': {message}", self.source)),
            other => other,
        })
    }

    /// Convert the cells of a grouped column into one tensor
    pub fn convert_group(&self, cells: &[&str]) -> Result<(Value, bool)> {
        let Some(element) = self.group else {
            return Err(Error::Schema(format!("column '{}' is not grouped", self.source)));
        };
        let mut values = Vec::with_capacity(cells.len());
        let mut missing = 0;
        for text in cells {
            let (value, na) = self.convert(text)?;
            missing += usize::from(na);
            values.push(value);
        }
        let data = match element {
            ElementType::Int64 => TensorData::Int64(elements(&values, Value::to_int)?),
            ElementType::Float32 => TensorData::Float32(elements(&values, Value::to_f32)?),
            ElementType::Float64 => TensorData::Float64(elements(&values, Value::to_f64)?),
            ElementType::UInt8 => {
                return Err(Error::Schema(format!("column '{}' cannot group bytes", self.source)))
            }
        };
        let tensor = Tensor::new(vec![cells.len()], data)?;
        Ok((Value::Tensor(tensor), !cells.is_empty() && missing == cells.len()))
    }

    /// Format a value of this column
    pub fn format(&self, value: &Value, na: bool) -> Result<String> {
        match self.precision {
            Some(precision) if !na => self.resolver.format(&value.round(precision), na),
            _ => self.resolver.format(value, na),
        }
    }

    /// Format the tensor of a grouped column as `width` cells
    pub fn format_group(&self, value: &Value, na: bool, width: usize) -> Result<Vec<String>> {
        if na {
            return Ok(vec![String::new(); width]);
        }
        let Some(tensor) = value.as_tensor() else {
            return Err(Error::Format(format!("column '{}': {} is not a tensor", self.name, value.data_type())));
        };
        if tensor.volume() != width {
            return Err(Error::Format(format!(
                "column '{}': tensor of {} elements, header has {width}",
                self.name,
                tensor.volume()
            )));
        }
        tensor
            .extract()
            .iter()
            .map(|v| match v {
                Value::Float32(x) if x.is_nan() => Ok(String::new()),
                Value::Float64(x) if x.is_nan() => Ok(String::new()),
                v => self.format(v, false),
            })
            .collect()
    }
}

fn elements<T>(values: &[Value], get: impl Fn(&Value) -> ml_tables_core::Result<T>) -> Result<Vec<T>> {
    values
        .iter()
        .map(get)
        .collect::<ml_tables_core::Result<Vec<T>>>()
        .map_err(Error::from)
}
