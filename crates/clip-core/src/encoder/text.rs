use std::marker::PhantomData;

use parking_lot::Mutex;
use tracing::{debug, debug_span};

use super::{embedding_output, first_input, split_rows};
use crate::engine::{Dim, InferenceEngine, TensorInfo};
use crate::errors::{ClipError, Result};
use crate::tensor::{BatchTensor, ElementType, Tensor, TensorElement};
use crate::text::{DEFAULT_SEQUENCE_LENGTH, TokenSequence};
use crate::traits::TextTokenizer;

/// Encodes batches of texts into embedding vectors.
///
/// The model input must be declared `[N, L]` with a fixed `L` equal to the
/// encoder's sequence length, and carry `i32` or `i64` token ids.
pub struct TextEncoder<K, E, O = f32> {
    tokenizer: K,
    engine: Mutex<E>,
    sequence_length: usize,
    input: TensorInfo,
    output: TensorInfo,
    _output: PhantomData<fn() -> O>,
}

impl<K, E, O> TextEncoder<K, E, O>
where
    K: TextTokenizer,
    E: InferenceEngine,
    O: TensorElement,
{
    /// Bind an engine and tokenizer for 77-token sequences.
    pub fn new(engine: E, tokenizer: K) -> Result<Self> {
        Self::with_sequence_length(engine, tokenizer, DEFAULT_SEQUENCE_LENGTH)
    }

    /// Bind an engine and tokenizer for `sequence_length`-token sequences.
    pub fn with_sequence_length(engine: E, tokenizer: K, sequence_length: usize) -> Result<Self> {
        let input = first_input(&engine)?;
        if input.rank() != 2 || input.dims[1] != Dim::Fixed(sequence_length) {
            return Err(ClipError::ShapeMismatch(format!(
                "text input '{}' must be [N, {sequence_length}], model declares {}",
                input.name,
                input.shape_string()
            )));
        }
        if !matches!(input.element_type, ElementType::I32 | ElementType::I64) {
            return Err(ClipError::EngineContractViolation(format!(
                "text input '{}' is {}, token ids need i32 or i64",
                input.name, input.element_type
            )));
        }
        let output = embedding_output::<E, O>(&engine)?;

        debug!(
            input = %input.name,
            output = %output.name,
            shape = %input.shape_string(),
            element = %input.element_type,
            "text encoder ready"
        );

        Ok(Self {
            tokenizer,
            engine: Mutex::new(engine),
            sequence_length,
            input,
            output,
            _output: PhantomData,
        })
    }

    /// Fixed token sequence length.
    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    /// Embedding width, when the model declares it.
    pub fn embedding_dim(&self) -> Option<usize> {
        self.output.dims[1].fixed()
    }

    /// Bound input metadata.
    pub fn input(&self) -> &TensorInfo {
        &self.input
    }

    /// Tokenize every text into a `[N, L]` batch of sentinel-wrapped ids.
    pub fn tokenize<S: AsRef<str>>(&self, texts: &[S]) -> Result<BatchTensor<i32>> {
        let sot = self.tokenizer.sot_token();
        let eot = self.tokenizer.eot_token();
        let rows = texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let ids = self.tokenizer.encode(text.as_ref()).map_err(|e| match e {
                    ClipError::Tokenize(msg) => ClipError::Tokenize(format!("item {i}: {msg}")),
                    other => other,
                })?;
                Ok(TokenSequence::build(&ids, sot, eot, self.sequence_length))
            })
            .collect::<Result<Vec<_>>>()?;
        BatchTensor::from_rows(&rows, self.sequence_length)
    }

    /// Encode texts; `result[i]` is the embedding of `texts[i]`.
    pub fn encode_texts<S: AsRef<str>>(&self, texts: &[S]) -> Result<Vec<Vec<O>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let n = texts.len();
        let _span = debug_span!("encode_texts", batch = n).entered();
        if !self.input.dims[0].accepts(n) {
            return Err(ClipError::ShapeMismatch(format!(
                "model batch dimension is {}, got {n} texts",
                self.input.dims[0]
            )));
        }

        let batch = self.tokenize(texts)?;
        debug!(shape = ?batch.shape(), "token batch assembled");
        let tensor = self.to_input_tensor(batch);

        let output = {
            let mut engine = self.engine.lock();
            engine.run(&self.input.name, tensor, &self.output.name)?
        };
        debug!(shape = ?output.shape(), "text embeddings received");
        split_rows(output, n)
    }

    fn to_input_tensor(&self, batch: BatchTensor<i32>) -> Tensor {
        match self.input.element_type {
            ElementType::I64 => batch.map(i64::from).into_tensor(),
            _ => batch.into_tensor(),
        }
    }
}
