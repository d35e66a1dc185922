//! Shape mappers between records and statically declared shapes
//!
//! A shape is a plain struct whose fields name record columns. The
//! [`shape!`](crate::shape) macro declares such a struct and implements
//! [`Shape`] for it. Three mappers translate in either direction:
//!
//! - [`Wrapper`] builds a record from a shape value
//! - [`Unwrapper`] resolves a shape value from a record
//! - [`Transformer`] overlays a shape value onto an existing record
//!
//! The unwrapper and the transformer resolve their column lookup table from
//! the first record they see and reuse it for their whole lifetime, so one
//! mapper instance must only see records of a stable schema.

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use crate::bitmap::Bitmap;
use crate::error::{Error, Result};
use crate::memo::Memo;
use crate::pattern::Pattern;
use crate::record::Record;
use crate::tensor::Tensor;
use crate::value::{DataType, Enum, Value};

/// One cell as seen by a mapper: a value and its null flag
pub type Cell = (Value, bool);

/// Static description of one shape field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldInfo {
    /// Field name, also the column name produced by [`Wrapper`]
    pub name: &'static str,

    /// Lookup pattern used by [`Unwrapper`]; defaults to the field name
    pub pattern: Option<&'static str>,

    /// Whether the field collects every matching column
    pub multi: bool,
}

impl FieldInfo {
    /// Pattern text used to find source columns
    pub fn lookup(&self) -> &'static str {
        self.pattern.unwrap_or(self.name)
    }
}

/// A statically declared record shape
pub trait Shape: Sized + Send + Sync + 'static {
    /// Fields in declaration order
    fn fields() -> &'static [FieldInfo];

    /// One cell per field, in declaration order
    fn cells(&self) -> Vec<Cell>;

    /// Build a value from the cells matched for each field
    fn from_cells(cells: Vec<Vec<Cell>>) -> Result<Self>;
}

/// A type usable as a shape field
pub trait ShapeField: Sized {
    /// Whether the field collects every matching column
    const MULTI: bool = false;

    /// Cell produced when wrapping
    fn to_cell(&self) -> Cell;

    /// Value built from the matched cells
    fn from_cells(cells: Vec<Cell>) -> Result<Self>;
}

/// A scalar shape field type
pub trait ScalarField: Sized {
    /// Dynamic type of the produced column
    const DATA_TYPE: DataType;

    /// Wrap into a value
    fn to_value(&self) -> Value;

    /// Convert a present cell value
    fn from_value(value: &Value) -> Result<Self>;

    /// Value standing in for a missing cell
    fn missing() -> Self;

    /// Whether this value counts as missing
    fn is_missing(&self) -> bool {
        false
    }
}

/// A scalar type that can live in a tensor column
pub trait TensorElement: ScalarField {
    /// Pack values into a one-dimensional tensor
    fn pack(items: &[Self]) -> Tensor;
}

fn scalar_from_cells<T: ScalarField>(cells: Vec<Cell>) -> Result<T> {
    match cells.into_iter().next() {
        Some((_, true)) => Ok(T::missing()),
        Some((value, false)) => T::from_value(&value),
        None => Err(Error::Mapping("no cell for scalar field".to_string())),
    }
}

macro_rules! impl_scalar_field {
    ($($ty:ty => $dt:expr, $conv:expr, $missing:expr, $is_missing:expr;)*) => {
        $(
            impl ScalarField for $ty {
                const DATA_TYPE: DataType = $dt;

                fn to_value(&self) -> Value {
                    Value::from(self.clone())
                }

                fn from_value(value: &Value) -> Result<Self> {
                    ($conv)(value)
                }

                fn missing() -> Self {
                    $missing
                }

                fn is_missing(&self) -> bool {
                    ($is_missing)(self)
                }
            }

            impl ShapeField for $ty {
                fn to_cell(&self) -> Cell {
                    (self.to_value(), self.is_missing())
                }

                fn from_cells(cells: Vec<Cell>) -> Result<Self> {
                    scalar_from_cells(cells)
                }
            }
        )*
    };
}

impl_scalar_field! {
    bool => DataType::Bool, Value::to_bool, false, |_: &bool| false;
    i64 => DataType::Int, Value::to_int, 0, |_: &i64| false;
    i32 => DataType::Int,
        |v: &Value| -> Result<i32> {
            i32::try_from(v.to_int()?).map_err(|e| Error::TypeMismatch(e.to_string()))
        },
        0, |_: &i32| false;
    f32 => DataType::Float32, Value::to_f32, f32::NAN, |x: &f32| x.is_nan();
    f64 => DataType::Float64, Value::to_f64, f64::NAN, |x: &f64| x.is_nan();
    String => DataType::Text, |v: &Value| -> Result<String> { Ok(v.to_text()) }, String::new(), |_: &String| false;
    Enum => DataType::Enum, Value::to_enum, Enum::new("", 0), |_: &Enum| false;
}

impl ScalarField for u8 {
    const DATA_TYPE: DataType = DataType::Int;

    fn to_value(&self) -> Value {
        Value::Int(i64::from(*self))
    }

    fn from_value(value: &Value) -> Result<Self> {
        u8::try_from(value.to_int()?).map_err(|e| Error::TypeMismatch(e.to_string()))
    }

    fn missing() -> Self {
        0
    }
}

impl ShapeField for u8 {
    fn to_cell(&self) -> Cell {
        (self.to_value(), false)
    }

    fn from_cells(cells: Vec<Cell>) -> Result<Self> {
        scalar_from_cells(cells)
    }
}

impl TensorElement for f32 {
    fn pack(items: &[Self]) -> Tensor {
        Tensor::from_f32(items.to_vec())
    }
}

impl TensorElement for f64 {
    fn pack(items: &[Self]) -> Tensor {
        Tensor::from_f64(items.to_vec())
    }
}

impl TensorElement for i64 {
    fn pack(items: &[Self]) -> Tensor {
        Tensor::from_i64(items.to_vec())
    }
}

impl TensorElement for u8 {
    fn pack(items: &[Self]) -> Tensor {
        Tensor::from_u8(items.to_vec())
    }
}

/// Missing when `None`
impl<T: ScalarField> ShapeField for Option<T> {
    fn to_cell(&self) -> Cell {
        match self {
            Some(v) => (v.to_value(), false),
            None => (Value::zero(T::DATA_TYPE), true),
        }
    }

    fn from_cells(cells: Vec<Cell>) -> Result<Self> {
        match cells.into_iter().next() {
            Some((_, true)) => Ok(None),
            Some((value, false)) => T::from_value(&value).map(Some),
            None => Err(Error::Mapping("no cell for optional field".to_string())),
        }
    }
}

/// Multi-valued: wraps into one tensor column, unwraps from every match
impl<T: TensorElement> ShapeField for Vec<T> {
    const MULTI: bool = true;

    fn to_cell(&self) -> Cell {
        (Value::Tensor(T::pack(self)), false)
    }

    fn from_cells(cells: Vec<Cell>) -> Result<Self> {
        let mut out = Vec::with_capacity(cells.len());
        for (value, na) in cells {
            match (value, na) {
                (Value::Tensor(t), na) => {
                    for v in t.extract() {
                        out.push(if na { T::missing() } else { T::from_value(&v)? });
                    }
                }
                (_, true) => out.push(T::missing()),
                (v, false) => out.push(T::from_value(&v)?),
            }
        }
        Ok(out)
    }
}

/// Declare a struct and implement [`Shape`](crate::mapper::Shape) for it
///
/// Fields may carry a `#[pattern = "..."]` attribute naming the source
/// columns to match; by default a field matches the column of its own name.
/// `Vec<T>` fields collect every matching column.
///
/// ```
/// ml_tables_core::shape! {
///     #[derive(Debug, Clone, PartialEq)]
///     pub struct Sample {
///         pub id: i64,
///         #[pattern = "feature*"]
///         pub features: Vec<f32>,
///         pub label: Option<f64>,
///     }
/// }
/// ```
#[macro_export]
macro_rules! shape {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[pattern = $pattern:literal])?
                $fvis:vis $field:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $( $fvis $field: $ty, )*
        }

        impl $crate::mapper::Shape for $name {
            fn fields() -> &'static [$crate::mapper::FieldInfo] {
                const FIELDS: &[$crate::mapper::FieldInfo] = &[
                    $(
                        $crate::mapper::FieldInfo {
                            name: stringify!($field),
                            pattern: $crate::shape!(@pattern $($pattern)?),
                            multi: <$ty as $crate::mapper::ShapeField>::MULTI,
                        },
                    )*
                ];
                FIELDS
            }

            fn cells(&self) -> ::std::vec::Vec<$crate::mapper::Cell> {
                ::std::vec![
                    $( <$ty as $crate::mapper::ShapeField>::to_cell(&self.$field), )*
                ]
            }

            fn from_cells(
                cells: ::std::vec::Vec<::std::vec::Vec<$crate::mapper::Cell>>,
            ) -> $crate::Result<Self> {
                let mut cells = cells.into_iter();
                ::std::result::Result::Ok(Self {
                    $(
                        $field: <$ty as $crate::mapper::ShapeField>::from_cells(
                            cells.next().unwrap_or_default(),
                        )?,
                    )*
                })
            }
        }
    };
    (@pattern) => { ::std::option::Option::None };
    (@pattern $pattern:literal) => { ::std::option::Option::Some($pattern) };
}

fn field_names<S: Shape>() -> Vec<String> {
    S::fields().iter().map(|f| f.name.to_string()).collect()
}

/// Builds records from shape values
#[derive(Debug)]
pub struct Wrapper<S> {
    names: Arc<Vec<String>>,
    _shape: PhantomData<fn(S)>,
}

impl<S: Shape> Wrapper<S> {
    /// Create a wrapper
    pub fn new() -> Self {
        Self {
            names: Arc::new(field_names::<S>()),
            _shape: PhantomData,
        }
    }

    /// Column names produced, in field order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Wrap one value
    pub fn wrap(&self, value: &S) -> Record {
        let mut na = Bitmap::new();
        let values = value
            .cells()
            .into_iter()
            .enumerate()
            .map(|(i, (v, missing))| {
                if missing {
                    na.set(i, true);
                }
                v
            })
            .collect();
        Record::assemble(Arc::clone(&self.names), values, na)
    }
}

impl<S: Shape> Default for Wrapper<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve source column positions for every field of `S`
fn resolve_sources<S: Shape>(names: &[String]) -> Result<Vec<Vec<usize>>> {
    S::fields()
        .iter()
        .map(|field| {
            let pattern = Pattern::new(field.lookup())?;
            let mut found: Vec<usize> = names
                .iter()
                .enumerate()
                .filter(|(_, n)| pattern.matches(n))
                .map(|(i, _)| i)
                .collect();
            if found.is_empty() {
                return Err(Error::Mapping(format!(
                    "no column matches field '{}' (pattern '{pattern}')",
                    field.name
                )));
            }
            if !field.multi {
                found.truncate(1);
            }
            Ok(found)
        })
        .collect()
}

/// Resolves shape values from records
#[derive(Debug)]
pub struct Unwrapper<S> {
    sources: Memo<Vec<Vec<usize>>>,
    _shape: PhantomData<fn() -> S>,
}

impl<S: Shape> Unwrapper<S> {
    /// Create an unresolved unwrapper
    pub fn new() -> Self {
        Self {
            sources: Memo::new(),
            _shape: PhantomData,
        }
    }

    /// Unwrap one record, resolving the column table on first use
    pub fn unwrap(&self, record: &Record) -> Result<S> {
        let sources = self.sources.get_or_resolve(|| {
            let table = resolve_sources::<S>(record.names())?;
            debug!(
                shape = std::any::type_name::<S>(),
                fields = table.len(),
                "resolved unwrapper columns"
            );
            Ok(table)
        })?;
        let cells = sources
            .iter()
            .map(|indices| {
                indices
                    .iter()
                    .map(|&i| {
                        if i >= record.len() {
                            return Err(Error::Mapping(format!(
                                "column {i} is missing from a record of {} columns",
                                record.len()
                            )));
                        }
                        Ok((record.value_at(i).clone(), record.is_na_at(i)))
                    })
                    .collect::<Result<Vec<Cell>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        S::from_cells(cells)
    }
}

impl<S: Shape> Default for Unwrapper<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Target layout of a transformer
#[derive(Debug)]
struct Overlay {
    names: Arc<Vec<String>>,
    prior: usize,
    slots: Vec<usize>,
}

/// Overlays shape values onto existing records
#[derive(Debug)]
pub struct Transformer<S> {
    overlay: Memo<Overlay>,
    _shape: PhantomData<fn(S)>,
}

impl<S: Shape> Transformer<S> {
    /// Create an unresolved transformer
    pub fn new() -> Self {
        Self {
            overlay: Memo::new(),
            _shape: PhantomData,
        }
    }

    /// Overlay `value` onto `prior`
    ///
    /// Fields named like a prior column overwrite it in place; other fields
    /// are appended in field order.
    pub fn transform(&self, value: &S, prior: &Record) -> Result<Record> {
        let overlay = self.overlay.get_or_resolve(|| {
            let mut names = prior.names().to_vec();
            let slots = S::fields()
                .iter()
                .map(|f| {
                    prior.pos(f.name).unwrap_or_else(|| {
                        names.push(f.name.to_string());
                        names.len() - 1
                    })
                })
                .collect();
            debug!(
                shape = std::any::type_name::<S>(),
                appended = names.len() - prior.len(),
                "resolved transformer layout"
            );
            Ok(Overlay {
                names: Arc::new(names),
                prior: prior.len(),
                slots,
            })
        })?;
        if prior.len() != overlay.prior {
            return Err(Error::Mapping(format!(
                "transformer resolved for {} columns, record has {}",
                overlay.prior,
                prior.len()
            )));
        }

        let mut values = prior.values().to_vec();
        values.resize(overlay.names.len(), Value::Bool(false));
        let mut na = prior.na().clone();
        for (&slot, (v, missing)) in overlay.slots.iter().zip(value.cells()) {
            values[slot] = v;
            na.set(slot, missing);
        }
        Ok(Record::assemble(Arc::clone(&overlay.names), values, na))
    }
}

impl<S: Shape> Default for Transformer<S> {
    fn default() -> Self {
        Self::new()
    }
}
