//! Tensor buffers exchanged with the inference engine, and row-major flattening.
//!
//! A [`Tensor`] is an explicit shape plus one contiguous, typed buffer. Buffers
//! are always laid out row-major (last dimension fastest), which is the layout
//! the engine reads bit-for-bit.

use std::fmt;
use std::str::FromStr;

use half::f16;
use ndarray::{ArrayBase, Data, Dimension};
use serde::{Deserialize, Serialize};

use crate::errors::{ClipError, Result};

/// Element representation of a tensor buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    /// 32-bit IEEE float.
    F32,
    /// 16-bit IEEE half-precision float.
    F16,
    /// Signed 8-bit integer.
    I8,
    /// Unsigned 8-bit integer.
    U8,
    /// 64-bit IEEE float.
    F64,
    /// Signed 32-bit integer (token ids).
    I32,
    /// Signed 64-bit integer (token ids on some exports).
    I64,
}

impl ElementType {
    /// Short lowercase name (`f32`, `f16`, ...).
    pub const fn name(self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::F16 => "f16",
            Self::I8 => "i8",
            Self::U8 => "u8",
            Self::F64 => "f64",
            Self::I32 => "i32",
            Self::I64 => "i64",
        }
    }

    /// Size of one element in bytes.
    pub const fn size_bytes(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::F16 => 2,
            Self::F32 | Self::I32 => 4,
            Self::F64 | Self::I64 => 8,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ElementType {
    type Err = ClipError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "f32" | "float32" | "float" | "fp32" => Ok(Self::F32),
            "f16" | "float16" | "half" | "fp16" => Ok(Self::F16),
            "i8" | "int8" | "sbyte" => Ok(Self::I8),
            "u8" | "uint8" | "byte" => Ok(Self::U8),
            "f64" | "float64" | "double" => Ok(Self::F64),
            "i32" | "int32" => Ok(Self::I32),
            "i64" | "int64" => Ok(Self::I64),
            other => Err(ClipError::UnsupportedNumericType(other.to_string())),
        }
    }
}

/// Typed contiguous buffer.
#[derive(Clone, Debug, PartialEq)]
pub enum TensorData {
    /// `f32` elements.
    Float32(Vec<f32>),
    /// `f16` elements.
    Float16(Vec<f16>),
    /// `i8` elements.
    Int8(Vec<i8>),
    /// `u8` elements.
    Uint8(Vec<u8>),
    /// `f64` elements.
    Float64(Vec<f64>),
    /// `i32` elements.
    Int32(Vec<i32>),
    /// `i64` elements.
    Int64(Vec<i64>),
}

impl TensorData {
    /// Element type of the buffer.
    pub fn element_type(&self) -> ElementType {
        match self {
            Self::Float32(_) => ElementType::F32,
            Self::Float16(_) => ElementType::F16,
            Self::Int8(_) => ElementType::I8,
            Self::Uint8(_) => ElementType::U8,
            Self::Float64(_) => ElementType::F64,
            Self::Int32(_) => ElementType::I32,
            Self::Int64(_) => ElementType::I64,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Self::Float32(v) => v.len(),
            Self::Float16(v) => v.len(),
            Self::Int8(v) => v.len(),
            Self::Uint8(v) => v.len(),
            Self::Float64(v) => v.len(),
            Self::Int32(v) => v.len(),
            Self::Int64(v) => v.len(),
        }
    }

    /// Whether the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A rust type that can travel in a [`TensorData`] buffer.
pub trait TensorElement: Copy + Send + Sync + fmt::Debug + 'static {
    /// Matching element type tag.
    const ELEMENT_TYPE: ElementType;

    /// Wrap a vector into the matching buffer variant.
    fn wrap(values: Vec<Self>) -> TensorData;

    /// Take the vector back out; returns the buffer unchanged on a type mismatch.
    fn unwrap(data: TensorData) -> std::result::Result<Vec<Self>, TensorData>;
}

macro_rules! tensor_element {
    ($ty:ty, $tag:ident, $variant:ident) => {
        impl TensorElement for $ty {
            const ELEMENT_TYPE: ElementType = ElementType::$tag;

            fn wrap(values: Vec<Self>) -> TensorData {
                TensorData::$variant(values)
            }

            fn unwrap(data: TensorData) -> std::result::Result<Vec<Self>, TensorData> {
                match data {
                    TensorData::$variant(v) => Ok(v),
                    other => Err(other),
                }
            }
        }
    };
}

tensor_element!(f32, F32, Float32);
tensor_element!(f16, F16, Float16);
tensor_element!(i8, I8, Int8);
tensor_element!(u8, U8, Uint8);
tensor_element!(f64, F64, Float64);
tensor_element!(i32, I32, Int32);
tensor_element!(i64, I64, Int64);

/// A shaped tensor handed to or received from the engine.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: TensorData,
}

impl Tensor {
    /// Create a tensor, checking that the element count matches the shape.
    pub fn new(shape: Vec<usize>, data: TensorData) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(ClipError::ShapeMismatch(format!(
                "shape {shape:?} needs {expected} elements, buffer has {}",
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// Tensor shape.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Underlying buffer.
    pub fn data(&self) -> &TensorData {
        &self.data
    }

    /// Element type of the buffer.
    pub fn element_type(&self) -> ElementType {
        self.data.element_type()
    }

    /// Split into shape and buffer.
    pub fn into_parts(self) -> (Vec<usize>, TensorData) {
        (self.shape, self.data)
    }
}

/// A batch of equally-shaped items concatenated into one buffer.
///
/// Shape is `[N, ...item_shape]`. Built fresh per encode call and consumed
/// once by [`BatchTensor::into_tensor`].
#[derive(Clone, Debug, PartialEq)]
pub struct BatchTensor<T> {
    shape: Vec<usize>,
    data: Vec<T>,
}

impl<T: Clone> BatchTensor<T> {
    /// Concatenate arrays that all have `item_shape`.
    pub fn from_arrays<S, D>(items: &[ArrayBase<S, D>], item_shape: &[usize]) -> Result<Self>
    where
        S: Data<Elem = T>,
        D: Dimension,
    {
        for (i, item) in items.iter().enumerate() {
            if item.shape() != item_shape {
                return Err(ClipError::ShapeMismatch(format!(
                    "batch item {i} has shape {:?}, expected {item_shape:?}",
                    item.shape()
                )));
            }
        }
        let mut shape = Vec::with_capacity(item_shape.len() + 1);
        shape.push(items.len());
        shape.extend_from_slice(item_shape);
        Ok(Self {
            shape,
            data: flatten_batch(items),
        })
    }

    /// Concatenate equal-length rows into a `[N, len]` batch.
    pub fn from_rows<R: AsRef<[T]>>(rows: &[R], len: usize) -> Result<Self> {
        let mut data = Vec::with_capacity(rows.len() * len);
        for (i, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != len {
                return Err(ClipError::ShapeMismatch(format!(
                    "batch row {i} has length {}, expected {len}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            shape: vec![rows.len(), len],
            data,
        })
    }

    /// Batch shape.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Flat row-major buffer.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Apply an element conversion, keeping the shape.
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> BatchTensor<U> {
        BatchTensor {
            shape: self.shape,
            data: self.data.into_iter().map(f).collect(),
        }
    }
}

impl<T: TensorElement> BatchTensor<T> {
    /// Hand the batch over as an engine tensor.
    pub fn into_tensor(self) -> Tensor {
        Tensor {
            shape: self.shape,
            data: T::wrap(self.data),
        }
    }
}

/// Flatten an array into a contiguous row-major sequence.
///
/// Iterates in logical index order, so the result is independent of the
/// array's memory layout (transposed views flatten the same as owned copies).
pub fn flatten<S, D>(array: &ArrayBase<S, D>) -> Vec<S::Elem>
where
    S: Data,
    S::Elem: Clone,
    D: Dimension,
{
    array.iter().cloned().collect()
}

/// Flatten each item and concatenate in input order, with no padding.
pub fn flatten_batch<S, D>(items: &[ArrayBase<S, D>]) -> Vec<S::Elem>
where
    S: Data,
    S::Elem: Clone,
    D: Dimension,
{
    let total = items.iter().map(ArrayBase::len).sum();
    let mut out = Vec::with_capacity(total);
    for item in items {
        out.extend(item.iter().cloned());
    }
    out
}
