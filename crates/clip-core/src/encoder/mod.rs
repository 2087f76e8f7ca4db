//! Batch encoders: raw inputs in, one embedding vector per item out.
//!
//! Both encoders validate the engine's declared metadata once at
//! construction, then on every call build a fresh batch tensor, run the
//! engine under a mutex, and slice the `[N, D]` output back into `N`
//! vectors in input order. An empty batch never reaches the engine.

mod image;
mod text;

pub use image::{DEFAULT_IMAGE_SIZE, ImageEncoder, ImageEncoderOptions};
pub use text::TextEncoder;

use crate::engine::{InferenceEngine, TensorInfo};
use crate::errors::{ClipError, Result};
use crate::tensor::{Tensor, TensorElement};

/// Bind the first declared input of an engine.
fn first_input<E: InferenceEngine>(engine: &E) -> Result<TensorInfo> {
    engine
        .inputs()
        .first()
        .cloned()
        .ok_or_else(|| ClipError::EngineContractViolation("model declares no inputs".into()))
}

/// Bind the first declared output and check it can carry `[N, D]` rows of `O`.
fn embedding_output<E: InferenceEngine, O: TensorElement>(engine: &E) -> Result<TensorInfo> {
    let output = engine
        .outputs()
        .first()
        .cloned()
        .ok_or_else(|| ClipError::EngineContractViolation("model declares no outputs".into()))?;
    if output.rank() != 2 {
        return Err(ClipError::EngineContractViolation(format!(
            "output '{}' must be [N, D], model declares {}",
            output.name,
            output.shape_string()
        )));
    }
    if output.element_type != O::ELEMENT_TYPE {
        return Err(ClipError::EngineContractViolation(format!(
            "output '{}' is {}, encoder expects {}",
            output.name,
            output.element_type,
            O::ELEMENT_TYPE
        )));
    }
    Ok(output)
}

/// Slice an `[N, D]` output tensor into `N` vectors of length `D`, in order.
pub fn split_rows<O: TensorElement>(tensor: Tensor, batch: usize) -> Result<Vec<Vec<O>>> {
    let (shape, data) = tensor.into_parts();
    let [rows, dim] = shape[..] else {
        return Err(ClipError::UnexpectedOutput(format!(
            "expected rank 2 [N, D], got {shape:?}"
        )));
    };
    if rows != batch {
        return Err(ClipError::UnexpectedOutput(format!(
            "output has {rows} rows for a batch of {batch}"
        )));
    }
    let found = data.element_type();
    let values = O::unwrap(data).map_err(|_| {
        ClipError::UnexpectedOutput(format!(
            "output element type {found}, expected {}",
            O::ELEMENT_TYPE
        ))
    })?;
    if values.len() != rows * dim {
        return Err(ClipError::UnexpectedOutput(format!(
            "output buffer has {} elements, shape {shape:?} needs {}",
            values.len(),
            rows * dim
        )));
    }
    if dim == 0 {
        return Ok(vec![Vec::new(); rows]);
    }
    Ok(values.chunks_exact(dim).map(<[O]>::to_vec).collect())
}
