//! # clip-core
//!
//! Tensor preprocessing and marshaling for CLIP-style dual encoders.
//!
//! - **Numeric conversion**: [`NumericConverter`] turns normalized `f32`
//!   samples into the engine's element type (`f32`, `f16`, `i8`, ...)
//! - **Images**: [`ImageNormalizer`] produces channel-first tensors with
//!   per-channel mean/std normalization
//! - **Flattening**: [`flatten`] / [`flatten_batch`] and [`BatchTensor`]
//!   build contiguous row-major buffers
//! - **Text**: [`TokenSequence`] wraps token ids in start/end sentinels at a
//!   fixed length
//! - **Encoders**: [`ImageEncoder`] and [`TextEncoder`] validate model
//!   metadata once, then encode batches through an [`InferenceEngine`]
//! - **Similarity**: cosine scoring of the resulting embeddings
//!
//! Model loading, image decoding and tokenization live behind the
//! [`InferenceEngine`], [`ImageDecoder`] and [`TextTokenizer`] traits;
//! `clip-runtime` provides the production implementations.

#![deny(unsafe_code)]

pub mod encoder;
pub mod engine;
pub mod errors;
pub mod image;
pub mod logging;
pub mod mock;
pub mod numeric;
pub mod similarity;
pub mod tensor;
pub mod text;
pub mod traits;

pub use encoder::{DEFAULT_IMAGE_SIZE, ImageEncoder, ImageEncoderOptions, TextEncoder};
pub use engine::{Dim, InferenceEngine, TensorInfo};
pub use errors::{ClipError, Result};
pub use image::{ImageNormalizer, NormalizationStats, PixelGrid};
pub use numeric::NumericConverter;
pub use tensor::{BatchTensor, ElementType, Tensor, TensorData, TensorElement, flatten, flatten_batch};
pub use text::{DEFAULT_SEQUENCE_LENGTH, TokenSequence};
pub use traits::{ImageDecoder, ImageSource, TextTokenizer};
