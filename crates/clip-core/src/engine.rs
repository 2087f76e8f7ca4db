//! Inference engine boundary: declared tensor metadata and a single `run` call.

use std::fmt;

use crate::errors::Result;
use crate::tensor::{ElementType, Tensor};

/// One declared tensor dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dim {
    /// Size fixed by the model.
    Fixed(usize),
    /// Size chosen at run time (batch axes, dynamic spatial inputs).
    Dynamic,
}

impl Dim {
    /// Interpret an ONNX-style declared size, where negative means dynamic.
    pub fn from_declared(size: i64) -> Self {
        usize::try_from(size).map_or(Self::Dynamic, Self::Fixed)
    }

    /// The fixed size, if any.
    pub fn fixed(self) -> Option<usize> {
        match self {
            Self::Fixed(n) => Some(n),
            Self::Dynamic => None,
        }
    }

    /// Whether a concrete size is acceptable for this dimension.
    pub fn accepts(self, size: usize) -> bool {
        self.fixed().is_none_or(|n| n == size)
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(n) => write!(f, "{n}"),
            Self::Dynamic => f.write_str("?"),
        }
    }
}

/// Declared metadata for one named model input or output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TensorInfo {
    /// Tensor name used for binding.
    pub name: String,
    /// Declared element type.
    pub element_type: ElementType,
    /// Declared dimensions.
    pub dims: Vec<Dim>,
}

impl TensorInfo {
    /// Create tensor metadata.
    pub fn new(name: impl Into<String>, element_type: ElementType, dims: Vec<Dim>) -> Self {
        Self {
            name: name.into(),
            element_type,
            dims,
        }
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Dimensions formatted as `[?, 3, 224, 224]`.
    pub fn shape_string(&self) -> String {
        let dims: Vec<String> = self.dims.iter().map(ToString::to_string).collect();
        format!("[{}]", dims.join(", "))
    }
}

/// A loaded model that accepts one named input tensor and yields named outputs.
///
/// `run` takes `&mut self`: encoders own their engine exclusively and
/// serialize calls through a mutex.
pub trait InferenceEngine: Send {
    /// Declared model inputs.
    fn inputs(&self) -> &[TensorInfo];

    /// Declared model outputs.
    fn outputs(&self) -> &[TensorInfo];

    /// Bind `input` to `input_name`, execute, and return the `output_name` tensor.
    fn run(&mut self, input_name: &str, input: Tensor, output_name: &str) -> Result<Tensor>;
}

impl<E: InferenceEngine + ?Sized> InferenceEngine for Box<E> {
    fn inputs(&self) -> &[TensorInfo] {
        (**self).inputs()
    }

    fn outputs(&self) -> &[TensorInfo] {
        (**self).outputs()
    }

    fn run(&mut self, input_name: &str, input: Tensor, output_name: &str) -> Result<Tensor> {
        (**self).run(input_name, input, output_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_negative_is_dynamic() {
        assert_eq!(Dim::from_declared(-1), Dim::Dynamic);
        assert_eq!(Dim::from_declared(224), Dim::Fixed(224));
    }

    #[test]
    fn dim_accepts() {
        assert!(Dim::Dynamic.accepts(17));
        assert!(Dim::Fixed(77).accepts(77));
        assert!(!Dim::Fixed(77).accepts(76));
    }

    #[test]
    fn shape_string_formats_dynamic() {
        let info = TensorInfo::new(
            "pixel_values",
            ElementType::F32,
            vec![Dim::Dynamic, Dim::Fixed(3), Dim::Fixed(224), Dim::Fixed(224)],
        );
        assert_eq!(info.shape_string(), "[?, 3, 224, 224]");
        assert_eq!(info.rank(), 4);
    }
}
