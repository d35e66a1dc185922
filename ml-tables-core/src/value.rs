//! Dynamically typed cell values
//!
//! Columns of a record carry one of a closed set of value kinds. Every
//! conversion between kinds is dispatched exhaustively here, so adding a
//! kind is a compile-time visible change.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tensor::{ElementType, Tensor};

/// Dynamic type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Boolean flag
    Bool,

    /// 64-bit signed integer
    Int,

    /// 32-bit floating point
    Float32,

    /// 64-bit floating point
    Float64,

    /// UTF-8 string
    Text,

    /// Dense tensor with the given element type
    Tensor(ElementType),

    /// Categorical value
    Enum,
}

impl DataType {
    /// Check if this is a floating point scalar type
    pub fn is_float(&self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    /// Check if this is a numeric scalar type
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int | DataType::Float32 | DataType::Float64)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Bool => write!(f, "Bool"),
            DataType::Int => write!(f, "Int"),
            DataType::Float32 => write!(f, "Float32"),
            DataType::Float64 => write!(f, "Float64"),
            DataType::Text => write!(f, "Text"),
            DataType::Tensor(elem) => write!(f, "Tensor({elem})"),
            DataType::Enum => write!(f, "Enum"),
        }
    }
}

/// A categorical value: its text and its ordinal in an enumeration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Enum {
    /// Text representation
    pub text: String,

    /// Ordinal in the owning enumeration
    pub value: i64,
}

impl Enum {
    /// Create a categorical value
    pub fn new(text: impl Into<String>, value: i64) -> Self {
        Self {
            text: text.into(),
            value,
        }
    }
}

impl fmt::Display for Enum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// One dynamically typed cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Boolean flag
    Bool(bool),

    /// 64-bit signed integer
    Int(i64),

    /// 32-bit floating point
    Float32(f32),

    /// 64-bit floating point
    Float64(f64),

    /// UTF-8 string
    Text(String),

    /// Dense tensor
    Tensor(Tensor),

    /// Categorical value
    Enum(Enum),
}

impl Value {
    /// Dynamic type of this value
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Bool(_) => DataType::Bool,
            Value::Int(_) => DataType::Int,
            Value::Float32(_) => DataType::Float32,
            Value::Float64(_) => DataType::Float64,
            Value::Text(_) => DataType::Text,
            Value::Tensor(t) => DataType::Tensor(t.element_type()),
            Value::Enum(_) => DataType::Enum,
        }
    }

    /// Zero value of a type, used as the payload of missing cells
    pub fn zero(data_type: DataType) -> Value {
        match data_type {
            DataType::Bool => Value::Bool(false),
            DataType::Int => Value::Int(0),
            DataType::Float32 => Value::Float32(f32::NAN),
            DataType::Float64 => Value::Float64(f64::NAN),
            DataType::Text => Value::Text(String::new()),
            DataType::Tensor(ElementType::Float32) => Value::Tensor(Tensor::from_f32(Vec::new())),
            DataType::Tensor(ElementType::Float64) => Value::Tensor(Tensor::from_f64(Vec::new())),
            DataType::Tensor(ElementType::Int64) => Value::Tensor(Tensor::from_i64(Vec::new())),
            DataType::Tensor(ElementType::UInt8) => Value::Tensor(Tensor::from_u8(Vec::new())),
            DataType::Enum => Value::Enum(Enum::new("", 0)),
        }
    }

    /// Convert to a boolean
    pub fn to_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Int(i) => Ok(*i != 0),
            Value::Float32(x) => Ok(*x != 0.0),
            Value::Float64(x) => Ok(*x != 0.0),
            Value::Text(s) => s
                .trim()
                .parse::<bool>()
                .map_err(|_| Error::TypeMismatch(format!("cannot convert text '{s}' to Bool"))),
            Value::Enum(e) => Ok(e.value != 0),
            Value::Tensor(_) => Err(self.mismatch("Bool")),
        }
    }

    /// Convert to an integer; floats are truncated toward zero
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_int(&self) -> Result<i64> {
        match self {
            Value::Bool(b) => Ok(i64::from(*b)),
            Value::Int(i) => Ok(*i),
            Value::Float32(x) => Ok(*x as i64),
            Value::Float64(x) => Ok(*x as i64),
            Value::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| Error::TypeMismatch(format!("cannot convert text '{s}' to Int"))),
            Value::Enum(e) => Ok(e.value),
            Value::Tensor(_) => Err(self.mismatch("Int")),
        }
    }

    /// Convert to a double precision float
    #[allow(clippy::cast_precision_loss)]
    pub fn to_f64(&self) -> Result<f64> {
        match self {
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Ok(*i as f64),
            Value::Float32(x) => Ok(f64::from(*x)),
            Value::Float64(x) => Ok(*x),
            Value::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| Error::TypeMismatch(format!("cannot convert text '{s}' to Float64"))),
            Value::Enum(e) => Ok(e.value as f64),
            Value::Tensor(_) => Err(self.mismatch("Float64")),
        }
    }

    /// Convert to a single precision float
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_f32(&self) -> Result<f32> {
        match self {
            Value::Float32(x) => Ok(*x),
            other => other.to_f64().map(|x| x as f32),
        }
    }

    /// Convert to text
    pub fn to_text(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Convert to a categorical value
    pub fn to_enum(&self) -> Result<Enum> {
        match self {
            Value::Enum(e) => Ok(e.clone()),
            Value::Text(s) => Ok(Enum::new(s.clone(), 0)),
            Value::Int(i) => Ok(Enum::new(i.to_string(), *i)),
            _ => Err(self.mismatch("Enum")),
        }
    }

    /// Borrow as a tensor
    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Value::Tensor(t) => Some(t),
            _ => None,
        }
    }

    /// Copy with floats rounded half away from zero to `precision` decimals
    pub fn round(&self, precision: i32) -> Value {
        match self {
            Value::Float32(x) => Value::Float32(round32(*x, precision)),
            Value::Float64(x) => Value::Float64(round64(*x, precision)),
            Value::Tensor(t) => Value::Tensor(t.round(precision)),
            other => other.clone(),
        }
    }

    fn mismatch(&self, wanted: &str) -> Error {
        Error::TypeMismatch(format!("cannot convert {} to {wanted}", self.data_type()))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float32(x) => write!(f, "{x}"),
            Value::Float64(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
            Value::Tensor(t) => write!(f, "{t}"),
            Value::Enum(e) => write!(f, "{e}"),
        }
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

impl_from_scalar! {
    bool => Bool,
    i64 => Int,
    i32 => Int,
    f32 => Float32,
    f64 => Float64,
    String => Text,
    &str => Text,
    Tensor => Tensor,
    Enum => Enum,
}

/// Round half away from zero to `precision` decimals
pub fn round64(x: f64, precision: i32) -> f64 {
    if !x.is_finite() {
        return x;
    }
    let scale = 10f64.powi(precision);
    (x * scale).round() / scale
}

/// Round an f32 half away from zero to `precision` decimals
#[allow(clippy::cast_possible_truncation)]
pub fn round32(x: f32, precision: i32) -> f32 {
    round64(f64::from(x), precision) as f32
}
