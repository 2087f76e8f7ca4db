//! # clip-runtime
//!
//! Production implementations of the `clip-core` seams:
//!
//! - [`decode`]: `image`-crate decoders with Lanczos3 and Catmull-Rom resampling
//! - [`engine`]: ONNX Runtime sessions with CUDA to CPU fallback
//! - [`tokenizer`]: `tokenizers` BPE with CLIP sentinel ids
//! - [`model`]: local model files, optionally fetched from `HuggingFace`
//! - [`pipeline`]: settings-driven construction of both encoders
//!
//! The ONNX pieces are behind the default `ort` feature.

#![deny(unsafe_code)]

pub mod decode;
pub mod fallback;
pub mod model;
pub mod pipeline;

#[cfg(feature = "ort")]
pub mod engine;
#[cfg(feature = "ort")]
pub mod tokenizer;

pub use decode::{CubicDecoder, LanczosDecoder, decoder_for};
pub use fallback::build_with_fallback;
pub use model::ModelPaths;
pub use pipeline::VisualEncoder;

#[cfg(feature = "ort")]
pub use engine::OrtEngine;
#[cfg(feature = "ort")]
pub use pipeline::{ClipPipeline, load_text_encoder, load_visual_encoder};
#[cfg(feature = "ort")]
pub use tokenizer::ClipTokenizer;
