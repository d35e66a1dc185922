//! Dense tensor cells
//!
//! A tensor is a multi-element value stored in one record column. Its shape
//! travels with the value, so the volume of a column is read per record.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::Value;

/// Element type of a tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    /// 8-bit unsigned integer
    UInt8,

    /// 64-bit signed integer
    Int64,

    /// 32-bit floating point
    Float32,

    /// 64-bit floating point
    Float64,
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::UInt8 => write!(f, "UInt8"),
            ElementType::Int64 => write!(f, "Int64"),
            ElementType::Float32 => write!(f, "Float32"),
            ElementType::Float64 => write!(f, "Float64"),
        }
    }
}

/// Typed tensor storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TensorData {
    /// Bytes
    UInt8(Vec<u8>),

    /// Integers
    Int64(Vec<i64>),

    /// Single precision floats
    Float32(Vec<f32>),

    /// Double precision floats
    Float64(Vec<f64>),
}

impl TensorData {
    fn len(&self) -> usize {
        match self {
            TensorData::UInt8(v) => v.len(),
            TensorData::Int64(v) => v.len(),
            TensorData::Float32(v) => v.len(),
            TensorData::Float64(v) => v.len(),
        }
    }
}

/// A dense multidimensional tensor value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    /// Dimensions, outermost first
    shape: Vec<usize>,

    /// Elements in row-major order
    data: TensorData,
}

impl Tensor {
    /// Create a tensor, checking that the shape covers the data exactly
    pub fn new(shape: Vec<usize>, data: TensorData) -> Result<Self> {
        let volume: usize = shape.iter().product();
        if volume != data.len() {
            return Err(Error::InvalidArgument(format!(
                "tensor shape {shape:?} has volume {volume}, data has {} elements",
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// One-dimensional f32 tensor
    pub fn from_f32(values: Vec<f32>) -> Self {
        Self {
            shape: vec![values.len()],
            data: TensorData::Float32(values),
        }
    }

    /// One-dimensional f64 tensor
    pub fn from_f64(values: Vec<f64>) -> Self {
        Self {
            shape: vec![values.len()],
            data: TensorData::Float64(values),
        }
    }

    /// One-dimensional integer tensor
    pub fn from_i64(values: Vec<i64>) -> Self {
        Self {
            shape: vec![values.len()],
            data: TensorData::Int64(values),
        }
    }

    /// One-dimensional byte tensor
    pub fn from_u8(values: Vec<u8>) -> Self {
        Self {
            shape: vec![values.len()],
            data: TensorData::UInt8(values),
        }
    }

    /// Dimensions
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Total element count
    pub fn volume(&self) -> usize {
        self.data.len()
    }

    /// Element type
    pub fn element_type(&self) -> ElementType {
        match &self.data {
            TensorData::UInt8(_) => ElementType::UInt8,
            TensorData::Int64(_) => ElementType::Int64,
            TensorData::Float32(_) => ElementType::Float32,
            TensorData::Float64(_) => ElementType::Float64,
        }
    }

    /// Typed storage
    pub fn data(&self) -> &TensorData {
        &self.data
    }

    /// Element `i` as a scalar value
    pub fn get(&self, i: usize) -> Option<Value> {
        match &self.data {
            TensorData::UInt8(v) => v.get(i).map(|&x| Value::Int(i64::from(x))),
            TensorData::Int64(v) => v.get(i).map(|&x| Value::Int(x)),
            TensorData::Float32(v) => v.get(i).map(|&x| Value::Float32(x)),
            TensorData::Float64(v) => v.get(i).map(|&x| Value::Float64(x)),
        }
    }

    /// All elements as scalar values, in order
    pub fn extract(&self) -> Vec<Value> {
        (0..self.volume()).filter_map(|i| self.get(i)).collect()
    }

    /// Copy with float elements rounded to `precision` decimals
    pub fn round(&self, precision: i32) -> Self {
        let data = match &self.data {
            TensorData::Float32(v) => {
                TensorData::Float32(v.iter().map(|&x| crate::value::round32(x, precision)).collect())
            }
            TensorData::Float64(v) => {
                TensorData::Float64(v.iter().map(|&x| crate::value::round64(x, precision)).collect())
            }
            other => other.clone(),
        };
        Self {
            shape: self.shape.clone(),
            data,
        }
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:?}[", self.element_type(), self.shape)?;
        for (i, v) in self.extract().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensor_volume_checked() {
        let t = Tensor::new(vec![2, 3], TensorData::Float32(vec![0.0; 6])).unwrap();
        assert_eq!(t.volume(), 6);
        assert_eq!(t.shape(), &[2, 3]);
        assert!(Tensor::new(vec![2, 2], TensorData::Int64(vec![1, 2, 3])).is_err());
    }

    #[test]
    fn test_tensor_extract() {
        let t = Tensor::from_u8(vec![1, 2]);
        assert_eq!(t.extract(), vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(t.get(2), None);
    }

    #[test]
    fn test_tensor_round() {
        let t = Tensor::from_f64(vec![1.25, -1.25]).round(1);
        assert_eq!(t.data(), &TensorData::Float64(vec![1.3, -1.3]));
    }
}
