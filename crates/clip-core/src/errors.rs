//! Preprocessing and encoding error types.
//!
//! No operation retries. Every failure is a deterministic function of the
//! input or configuration and is surfaced synchronously; a single bad item
//! fails the whole batch.

use thiserror::Error;

/// Errors from preprocessing, engine marshaling, and encoding.
#[derive(Debug, Error)]
pub enum ClipError {
    /// An image source could not be decoded (corrupt or unsupported input).
    #[error("Image decode failed: {0}")]
    ImageDecode(String),

    /// A decoded grid does not match the configured target size.
    #[error("Dimension mismatch: expected {expected_width}x{expected_height}, got {width}x{height}")]
    DimensionMismatch {
        /// Configured width.
        expected_width: usize,
        /// Configured height.
        expected_height: usize,
        /// Width of the grid that was received.
        width: usize,
        /// Height of the grid that was received.
        height: usize,
    },

    /// The requested numeric representation has no defined conversion.
    #[error("Unsupported numeric type: {0}")]
    UnsupportedNumericType(String),

    /// Engine input shape is incompatible with the fixed preprocessing shape.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Engine metadata violates the encoder contract (names, element types, ranks).
    #[error("Engine contract violation: {0}")]
    EngineContractViolation(String),

    /// The engine returned a tensor that cannot be sliced into per-item vectors.
    #[error("Unexpected engine output: {0}")]
    UnexpectedOutput(String),

    /// Tokenization failed.
    #[error("Tokenization failed: {0}")]
    Tokenize(String),

    /// Engine execution failed.
    #[error("Inference failed: {0}")]
    Inference(String),

    /// Model files are missing or could not be fetched.
    #[error("Model not available: {0}")]
    ModelNotAvailable(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// I/O error (preserves source chain).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for preprocessing and encoding operations.
pub type Result<T> = std::result::Result<T, ClipError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn error_display_variants() {
        let cases = vec![
            (
                ClipError::ImageDecode("bad header".into()),
                "Image decode failed: bad header",
            ),
            (
                ClipError::DimensionMismatch {
                    expected_width: 224,
                    expected_height: 224,
                    width: 100,
                    height: 80,
                },
                "Dimension mismatch: expected 224x224, got 100x80",
            ),
            (
                ClipError::UnsupportedNumericType("bf16".into()),
                "Unsupported numeric type: bf16",
            ),
            (
                ClipError::ShapeMismatch("rank 3".into()),
                "Shape mismatch: rank 3",
            ),
            (
                ClipError::EngineContractViolation("no outputs".into()),
                "Engine contract violation: no outputs",
            ),
            (
                ClipError::UnexpectedOutput("rank 1".into()),
                "Unexpected engine output: rank 1",
            ),
            (
                ClipError::Tokenize("vocab".into()),
                "Tokenization failed: vocab",
            ),
            (ClipError::Inference("oom".into()), "Inference failed: oom"),
            (
                ClipError::ModelNotAvailable("missing".into()),
                "Model not available: missing",
            ),
            (ClipError::Config("size".into()), "Config error: size"),
        ];
        for (err, expected) in cases {
            assert_eq!(err.to_string(), expected);
        }
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ClipError>();
    }

    #[test]
    fn io_error_source_chain_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ClipError = io.into();
        assert!(matches!(err, ClipError::Io(_)));
        let source = err.source().expect("should have source");
        assert!(source.to_string().contains("gone"));
    }
}
