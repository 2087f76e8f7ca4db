//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`
//! so a settings file only needs the keys it changes.

use std::path::PathBuf;

use clip_core::{DEFAULT_IMAGE_SIZE, DEFAULT_SEQUENCE_LENGTH, ElementType};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Largest accepted image side length.
pub const MAX_IMAGE_SIZE: usize = 4096;

/// Largest accepted token sequence length.
pub const MAX_SEQUENCE_LENGTH: usize = 4096;

/// Root settings type.
///
/// ```json
/// {
///   "model": { "modelDir": "~/models/clip" },
///   "image": { "backend": "cubic", "elementType": "f16" },
///   "runtime": { "executionProvider": "cuda" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClipSettings {
    /// Model file locations.
    pub model: ModelSettings,
    /// Image preprocessing.
    pub image: ImageSettings,
    /// Text preprocessing.
    pub text: TextSettings,
    /// Inference runtime.
    pub runtime: RuntimeSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl ClipSettings {
    /// Reject values no pipeline can be built from.
    pub fn validate(&self) -> Result<()> {
        if self.image.size == 0 || self.image.size > MAX_IMAGE_SIZE {
            return Err(SettingsError::InvalidValue(format!(
                "image.size must be in 1..={MAX_IMAGE_SIZE}, got {}",
                self.image.size
            )));
        }
        let _ = self.image.element_type()?;
        if self.text.sequence_length < 2 || self.text.sequence_length > MAX_SEQUENCE_LENGTH {
            return Err(SettingsError::InvalidValue(format!(
                "text.sequenceLength must be in 2..={MAX_SEQUENCE_LENGTH}, got {}",
                self.text.sequence_length
            )));
        }
        if self.text.sot_token.is_empty() || self.text.eot_token.is_empty() {
            return Err(SettingsError::InvalidValue(
                "text.sotToken and text.eotToken must not be empty".into(),
            ));
        }
        if self.runtime.intra_threads == 0 {
            return Err(SettingsError::InvalidValue(
                "runtime.intraThreads must be at least 1".into(),
            ));
        }
        if self.runtime.optimization_level > 3 {
            return Err(SettingsError::InvalidValue(format!(
                "runtime.optimizationLevel must be 0-3, got {}",
                self.runtime.optimization_level
            )));
        }
        Ok(())
    }
}

/// Where model files live and where to fetch them from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelSettings {
    /// Local directory holding the model files (may start with `~/`).
    pub model_dir: String,
    /// `HuggingFace` repository to download missing files from; empty disables downloads.
    pub hf_repo: String,
    /// Image encoder ONNX file, relative to `model_dir`.
    pub visual_file: String,
    /// Text encoder ONNX file, relative to `model_dir`.
    pub textual_file: String,
    /// `tokenizers` JSON file, relative to `model_dir`.
    pub tokenizer_file: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_dir: "~/.clipprep/models".to_string(),
            hf_repo: String::new(),
            visual_file: "visual.onnx".to_string(),
            textual_file: "textual.onnx".to_string(),
            tokenizer_file: "tokenizer.json".to_string(),
        }
    }
}

impl ModelSettings {
    /// Resolve the model directory, expanding `~/` to the home directory.
    pub fn resolved_model_dir(&self) -> PathBuf {
        if let Some(rest) = self.model_dir.strip_prefix("~/") {
            if let Ok(home) = std::env::var("HOME") {
                return PathBuf::from(home).join(rest);
            }
        }
        PathBuf::from(&self.model_dir)
    }
}

/// Image resampling backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageBackend {
    /// Lanczos3 resampling.
    #[default]
    Lanczos,
    /// Catmull-Rom bicubic resampling.
    Cubic,
}

/// Image preprocessing settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageSettings {
    /// Side length used when the model leaves spatial dimensions dynamic.
    pub size: usize,
    /// Resampling backend.
    pub backend: ImageBackend,
    /// Element type of the model's pixel input (`f32`, `f16`, `i8`, ...).
    pub element_type: String,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            size: DEFAULT_IMAGE_SIZE,
            backend: ImageBackend::default(),
            element_type: "f32".to_string(),
        }
    }
}

impl ImageSettings {
    /// Parsed pixel element type.
    pub fn element_type(&self) -> Result<ElementType> {
        self.element_type
            .parse()
            .map_err(|e: clip_core::ClipError| SettingsError::InvalidValue(format!("image.elementType: {e}")))
    }
}

/// Text preprocessing settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextSettings {
    /// Fixed token sequence length.
    pub sequence_length: usize,
    /// Start-of-text token string.
    pub sot_token: String,
    /// End-of-text token string (also the padding token).
    pub eot_token: String,
}

impl Default for TextSettings {
    fn default() -> Self {
        Self {
            sequence_length: DEFAULT_SEQUENCE_LENGTH,
            sot_token: "<|startoftext|>".to_string(),
            eot_token: "<|endoftext|>".to_string(),
        }
    }
}

/// Preferred execution provider. CPU is always the fallback.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// CPU only.
    #[default]
    Cpu,
    /// CUDA first, CPU on failure.
    Cuda,
}

/// Inference runtime settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeSettings {
    /// Preferred execution provider.
    pub execution_provider: ExecutionProvider,
    /// Intra-op thread count.
    pub intra_threads: usize,
    /// Graph optimization level, 0 (off) to 3 (all).
    pub optimization_level: u8,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            execution_provider: ExecutionProvider::default(),
            intra_threads: 4,
            optimization_level: 3,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}
