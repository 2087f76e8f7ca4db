//! Wiring settings to encoders.
//!
//! The pixel element type is a runtime setting, while [`ImageEncoder`] is
//! generic over it. [`VisualEncoder`] closes that gap with one variant per
//! supported representation; everything past the match is monomorphic.

use clip_core::{ClipError, ElementType, ImageDecoder, ImageEncoder, ImageEncoderOptions, ImageSource, InferenceEngine, NormalizationStats, Result};
use clip_settings::ImageSettings;
use half::f16;

type Encoder<T, E> = ImageEncoder<T, Box<dyn ImageDecoder>, E>;

/// An image encoder whose pixel representation was chosen by configuration.
pub enum VisualEncoder<E> {
    /// `f32` pixels.
    F32(Encoder<f32, E>),
    /// `f16` pixels.
    F16(Encoder<f16, E>),
    /// `i8` pixels.
    I8(Encoder<i8, E>),
    /// `u8` pixels.
    U8(Encoder<u8, E>),
    /// `f64` pixels.
    F64(Encoder<f64, E>),
}

impl<E: InferenceEngine> VisualEncoder<E> {
    /// Build the encoder variant named by `settings.element_type`.
    pub fn new(engine: E, decoder: Box<dyn ImageDecoder>, settings: &ImageSettings) -> Result<Self> {
        let element: ElementType = settings.element_type.parse()?;
        let options = ImageEncoderOptions {
            fallback_size: settings.size,
            stats: NormalizationStats::clip(),
        };
        Ok(match element {
            ElementType::F32 => Self::F32(ImageEncoder::with_options(engine, decoder, options)?),
            ElementType::F16 => Self::F16(ImageEncoder::with_options(engine, decoder, options)?),
            ElementType::I8 => Self::I8(ImageEncoder::with_options(engine, decoder, options)?),
            ElementType::U8 => Self::U8(ImageEncoder::with_options(engine, decoder, options)?),
            ElementType::F64 => Self::F64(ImageEncoder::with_options(engine, decoder, options)?),
            other @ (ElementType::I32 | ElementType::I64) => {
                return Err(ClipError::UnsupportedNumericType(format!(
                    "{other} is not a pixel representation"
                )));
            }
        })
    }

    /// Encode images; `result[i]` is the embedding of `sources[i]`.
    pub fn encode_images(&self, sources: &[ImageSource]) -> Result<Vec<Vec<f32>>> {
        match self {
            Self::F32(e) => e.encode_images(sources),
            Self::F16(e) => e.encode_images(sources),
            Self::I8(e) => e.encode_images(sources),
            Self::U8(e) => e.encode_images(sources),
            Self::F64(e) => e.encode_images(sources),
        }
    }

    /// Square side length images are resized to.
    pub fn image_size(&self) -> usize {
        match self {
            Self::F32(e) => e.image_size(),
            Self::F16(e) => e.image_size(),
            Self::I8(e) => e.image_size(),
            Self::U8(e) => e.image_size(),
            Self::F64(e) => e.image_size(),
        }
    }

    /// Pixel representation in use.
    pub fn element_type(&self) -> ElementType {
        match self {
            Self::F32(_) => ElementType::F32,
            Self::F16(_) => ElementType::F16,
            Self::I8(_) => ElementType::I8,
            Self::U8(_) => ElementType::U8,
            Self::F64(_) => ElementType::F64,
        }
    }
}

#[cfg(feature = "ort")]
pub use onnx::{ClipPipeline, load_text_encoder, load_visual_encoder};

#[cfg(feature = "ort")]
mod onnx {
    use std::path::Path;

    use clip_core::{ImageSource, Result, TextEncoder};
    use clip_settings::ClipSettings;
    use tracing::info;

    use super::VisualEncoder;
    use crate::decode::decoder_for;
    use crate::engine::OrtEngine;
    use crate::model::ModelPaths;
    use crate::tokenizer::ClipTokenizer;

    /// Load the image encoder model at `path`.
    pub fn load_visual_encoder(path: &Path, settings: &ClipSettings) -> Result<VisualEncoder<OrtEngine>> {
        let engine = OrtEngine::load(path, &settings.runtime)?;
        VisualEncoder::new(engine, decoder_for(settings.image.backend), &settings.image)
    }

    /// Load the text encoder model at `model` with the tokenizer at `tokenizer`.
    pub fn load_text_encoder(
        model: &Path,
        tokenizer: &Path,
        settings: &ClipSettings,
    ) -> Result<TextEncoder<ClipTokenizer, OrtEngine>> {
        let tokenizer = ClipTokenizer::from_file(tokenizer, &settings.text)?;
        let engine = OrtEngine::load(model, &settings.runtime)?;
        TextEncoder::with_sequence_length(engine, tokenizer, settings.text.sequence_length)
    }

    /// Both encoders of a CLIP model, built from settings.
    pub struct ClipPipeline {
        visual: VisualEncoder<OrtEngine>,
        text: TextEncoder<ClipTokenizer, OrtEngine>,
        paths: ModelPaths,
    }

    impl ClipPipeline {
        /// Validate settings, resolve model files and load both encoders.
        pub fn from_settings(settings: &ClipSettings) -> Result<Self> {
            settings.validate()?;
            let paths = ModelPaths::resolve(&settings.model)?;
            Self::from_paths(paths, settings)
        }

        /// Load both encoders from already-resolved files.
        pub fn from_paths(paths: ModelPaths, settings: &ClipSettings) -> Result<Self> {
            let visual = load_visual_encoder(&paths.visual, settings)?;
            let text = load_text_encoder(&paths.textual, &paths.tokenizer, settings)?;
            info!(
                image_size = visual.image_size(),
                element = %visual.element_type(),
                sequence_length = text.sequence_length(),
                "pipeline ready"
            );
            Ok(Self { visual, text, paths })
        }

        /// Encode images; `result[i]` is the embedding of `sources[i]`.
        pub fn encode_images(&self, sources: &[ImageSource]) -> Result<Vec<Vec<f32>>> {
            self.visual.encode_images(sources)
        }

        /// Encode texts; `result[i]` is the embedding of `texts[i]`.
        pub fn encode_texts<S: AsRef<str>>(&self, texts: &[S]) -> Result<Vec<Vec<f32>>> {
            self.text.encode_texts(texts)
        }

        /// Model files in use.
        pub fn paths(&self) -> &ModelPaths {
            &self.paths
        }
    }
}
