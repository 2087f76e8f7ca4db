//! In-memory collaborators for tests.
//!
//! - [`MockEngine`] records every call and answers with one row per batch
//!   item: column 0 is the item's batch index, the remaining columns are
//!   derived from the sum of the item's input elements. Equal inputs give
//!   equal rows (apart from the index tag), which makes order checks simple.
//! - [`MockDecoder`] paints a solid `(b, b, b)` grid for `Bytes([b, ..])`
//!   and fails on empty buffers or paths containing `corrupt`.
//! - [`MockTokenizer`] maps each char to its code point.

use std::sync::Arc;

use half::f16;
use parking_lot::Mutex;

use crate::engine::{InferenceEngine, TensorInfo};
use crate::errors::{ClipError, Result};
use crate::image::PixelGrid;
use crate::tensor::{ElementType, Tensor, TensorData};
use crate::traits::{ImageDecoder, ImageSource, TextTokenizer};

/// Embedding width used when the mock output declares a dynamic width.
const DEFAULT_MOCK_DIM: usize = 4;

/// One recorded [`MockEngine::run`] call.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedCall {
    /// Bound input name.
    pub input_name: String,
    /// Requested output name.
    pub output_name: String,
    /// Input tensor shape.
    pub shape: Vec<usize>,
    /// Input tensor buffer.
    pub data: TensorData,
}

/// Engine double with fixed metadata and identity-tagged output rows.
pub struct MockEngine {
    inputs: Vec<TensorInfo>,
    outputs: Vec<TensorInfo>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    rows_override: Option<usize>,
}

impl MockEngine {
    /// Engine with one input and one output.
    pub fn new(input: TensorInfo, output: TensorInfo) -> Self {
        Self::with_metadata(vec![input], vec![output])
    }

    /// Engine with arbitrary declared metadata.
    pub fn with_metadata(inputs: Vec<TensorInfo>, outputs: Vec<TensorInfo>) -> Self {
        Self {
            inputs,
            outputs,
            calls: Arc::new(Mutex::new(Vec::new())),
            rows_override: None,
        }
    }

    /// Always answer with `rows` rows, whatever the batch size.
    #[must_use]
    pub fn returning_rows(mut self, rows: usize) -> Self {
        self.rows_override = Some(rows);
        self
    }

    /// Shared handle to the call log; stays valid after the engine is moved.
    pub fn calls(&self) -> Arc<Mutex<Vec<RecordedCall>>> {
        Arc::clone(&self.calls)
    }
}

impl InferenceEngine for MockEngine {
    fn inputs(&self) -> &[TensorInfo] {
        &self.inputs
    }

    fn outputs(&self) -> &[TensorInfo] {
        &self.outputs
    }

    fn run(&mut self, input_name: &str, input: Tensor, output_name: &str) -> Result<Tensor> {
        let output = self
            .outputs
            .iter()
            .find(|o| o.name == output_name)
            .cloned()
            .ok_or_else(|| ClipError::Inference(format!("unknown output '{output_name}'")))?;
        if !self.inputs.iter().any(|i| i.name == input_name) {
            return Err(ClipError::Inference(format!("unknown input '{input_name}'")));
        }

        let (shape, data) = input.into_parts();
        let batch = shape.first().copied().unwrap_or(0);
        let item_len = if batch == 0 { 0 } else { data.len() / batch };
        let values = as_f64(&data);
        self.calls.lock().push(RecordedCall {
            input_name: input_name.to_string(),
            output_name: output_name.to_string(),
            shape,
            data,
        });

        let dim = output
            .dims
            .get(1)
            .and_then(|d| d.fixed())
            .unwrap_or(DEFAULT_MOCK_DIM);
        let rows = self.rows_override.unwrap_or(batch);
        let mut out = Vec::with_capacity(rows * dim);
        for i in 0..rows {
            let sum: f64 = values
                .get(i * item_len..(i + 1) * item_len)
                .map_or(0.0, |item| item.iter().sum());
            out.push(i as f64);
            for j in 1..dim {
                out.push(sum * j as f64 / 1000.0);
            }
        }
        Tensor::new(vec![rows, dim], from_f64(output.element_type, out))
    }
}

fn as_f64(data: &TensorData) -> Vec<f64> {
    match data {
        TensorData::Float32(v) => v.iter().map(|x| f64::from(*x)).collect(),
        TensorData::Float16(v) => v.iter().map(|x| f64::from(x.to_f32())).collect(),
        TensorData::Int8(v) => v.iter().map(|x| f64::from(*x)).collect(),
        TensorData::Uint8(v) => v.iter().map(|x| f64::from(*x)).collect(),
        TensorData::Float64(v) => v.clone(),
        TensorData::Int32(v) => v.iter().map(|x| f64::from(*x)).collect(),
        TensorData::Int64(v) => v.iter().map(|x| *x as f64).collect(),
    }
}

fn from_f64(element: ElementType, values: Vec<f64>) -> TensorData {
    match element {
        ElementType::F32 => TensorData::Float32(values.into_iter().map(|x| x as f32).collect()),
        ElementType::F16 => TensorData::Float16(values.into_iter().map(f16::from_f64).collect()),
        ElementType::I8 => TensorData::Int8(values.into_iter().map(|x| x as i8).collect()),
        ElementType::U8 => TensorData::Uint8(values.into_iter().map(|x| x as u8).collect()),
        ElementType::F64 => TensorData::Float64(values),
        ElementType::I32 => TensorData::Int32(values.into_iter().map(|x| x as i32).collect()),
        ElementType::I64 => TensorData::Int64(values.into_iter().map(|x| x as i64).collect()),
    }
}

/// Decoder double producing solid-color grids.
#[derive(Clone, Debug)]
pub struct MockDecoder {
    native: (usize, usize),
    resize: bool,
}

impl MockDecoder {
    /// Decoder whose decoded grids are 5x3 before resize.
    pub fn new() -> Self {
        Self {
            native: (5, 3),
            resize: true,
        }
    }

    /// Make `resize` a no-op so grids keep their native size.
    #[must_use]
    pub fn without_resize(mut self) -> Self {
        self.resize = false;
        self
    }
}

impl Default for MockDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageDecoder for MockDecoder {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn decode(&self, source: &ImageSource) -> Result<PixelGrid> {
        let shade = match source {
            ImageSource::Bytes(bytes) => *bytes
                .first()
                .ok_or_else(|| ClipError::ImageDecode("empty buffer".into()))?,
            ImageSource::Path(path) => {
                let text = path.to_string_lossy();
                if text.contains("corrupt") {
                    return Err(ClipError::ImageDecode("not an image".into()));
                }
                text.bytes().fold(0u8, u8::wrapping_add)
            }
        };
        let (w, h) = self.native;
        Ok(PixelGrid::filled(w, h, [shade; 3]))
    }

    fn resize(&self, grid: &PixelGrid, size: usize) -> PixelGrid {
        if !self.resize {
            return grid.clone();
        }
        PixelGrid::filled(size, size, grid.pixel(0, 0))
    }
}

/// Tokenizer double: one id per char, CLIP sentinel ids.
#[derive(Clone, Debug)]
pub struct MockTokenizer {
    fail_on: Option<String>,
}

impl MockTokenizer {
    /// CLIP start-of-text id.
    pub const SOT: i32 = 49_406;
    /// CLIP end-of-text id.
    pub const EOT: i32 = 49_407;

    /// Tokenizer that never fails.
    pub fn new() -> Self {
        Self { fail_on: None }
    }

    /// Fail any text containing `marker`.
    #[must_use]
    pub fn failing_on(marker: impl Into<String>) -> Self {
        Self {
            fail_on: Some(marker.into()),
        }
    }
}

impl Default for MockTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TextTokenizer for MockTokenizer {
    fn sot_token(&self) -> i32 {
        Self::SOT
    }

    fn eot_token(&self) -> i32 {
        Self::EOT
    }

    fn encode(&self, text: &str) -> Result<Vec<i32>> {
        if let Some(marker) = &self.fail_on {
            if text.contains(marker.as_str()) {
                return Err(ClipError::Tokenize(format!("refusing '{text}'")));
            }
        }
        Ok(text.chars().map(|c| c as i32).collect())
    }
}
