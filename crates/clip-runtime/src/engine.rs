//! ONNX Runtime implementation of [`InferenceEngine`].

use std::fmt::{Debug, Display};
use std::path::{Path, PathBuf};

use clip_core::{
    ClipError, Dim, ElementType, InferenceEngine, Result, Tensor, TensorData, TensorElement, TensorInfo,
};
use clip_settings::{ExecutionProvider, RuntimeSettings};
use half::f16;
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::tensor::{PrimitiveTensorElementType, TensorElementType};
use ort::value::{DynValue, ValueType};
use tracing::{debug, info};

use crate::fallback::build_with_fallback;

/// A loaded ONNX model.
pub struct OrtEngine {
    session: Session,
    inputs: Vec<TensorInfo>,
    outputs: Vec<TensorInfo>,
    provider: ExecutionProvider,
    path: PathBuf,
}

impl OrtEngine {
    /// Load a model, trying the preferred execution provider before CPU.
    pub fn load(path: &Path, settings: &RuntimeSettings) -> Result<Self> {
        if !path.is_file() {
            return Err(ClipError::ModelNotAvailable(format!(
                "model file not found: {}",
                path.display()
            )));
        }

        let (session, provider) =
            build_with_fallback(settings.execution_provider, |p| build_session(path, settings, p))?;

        let inputs = session
            .inputs
            .iter()
            .map(|i| tensor_info(&i.name, &i.input_type))
            .collect::<Result<Vec<_>>>()?;
        let outputs = session
            .outputs
            .iter()
            .map(|o| tensor_info(&o.name, &o.output_type))
            .collect::<Result<Vec<_>>>()?;

        info!(
            model = %path.display(),
            provider = ?provider,
            inputs = inputs.len(),
            outputs = outputs.len(),
            "ONNX model loaded"
        );

        Ok(Self {
            session,
            inputs,
            outputs,
            provider,
            path: path.to_path_buf(),
        })
    }

    /// Execution provider the session was built with.
    pub fn provider(&self) -> ExecutionProvider {
        self.provider
    }

    /// Model file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl InferenceEngine for OrtEngine {
    fn inputs(&self) -> &[TensorInfo] {
        &self.inputs
    }

    fn outputs(&self) -> &[TensorInfo] {
        &self.outputs
    }

    fn run(&mut self, input_name: &str, input: Tensor, output_name: &str) -> Result<Tensor> {
        let element = self
            .outputs
            .iter()
            .find(|o| o.name == output_name)
            .map(|o| o.element_type)
            .ok_or_else(|| ClipError::Inference(format!("model has no output '{output_name}'")))?;

        let (shape, data) = input.into_parts();
        let shape: Vec<i64> = shape.iter().map(|&d| d as i64).collect();
        debug!(input = input_name, ?shape, "running session");
        let value = match data {
            TensorData::Float32(v) => to_value(shape, v)?,
            TensorData::Float16(v) => to_value(shape, v)?,
            TensorData::Int8(v) => to_value(shape, v)?,
            TensorData::Uint8(v) => to_value(shape, v)?,
            TensorData::Float64(v) => to_value(shape, v)?,
            TensorData::Int32(v) => to_value(shape, v)?,
            TensorData::Int64(v) => to_value(shape, v)?,
        };

        let outputs = self
            .session
            .run(ort::inputs![input_name => value])
            .map_err(ort_err("inference"))?;
        let output = outputs
            .get(output_name)
            .ok_or_else(|| ClipError::UnexpectedOutput(format!("session returned no '{output_name}'")))?;

        match element {
            ElementType::F32 => extract::<f32>(output),
            ElementType::F16 => extract::<f16>(output),
            ElementType::I8 => extract::<i8>(output),
            ElementType::U8 => extract::<u8>(output),
            ElementType::F64 => extract::<f64>(output),
            ElementType::I32 => extract::<i32>(output),
            ElementType::I64 => extract::<i64>(output),
        }
    }
}

fn build_session(path: &Path, settings: &RuntimeSettings, provider: ExecutionProvider) -> Result<Session> {
    let dispatch = match provider {
        ExecutionProvider::Cuda => CUDAExecutionProvider::default().build().error_on_failure(),
        ExecutionProvider::Cpu => CPUExecutionProvider::default().build(),
    };
    Session::builder()
        .map_err(ort_err("session builder"))?
        .with_optimization_level(optimization_level(settings.optimization_level))
        .map_err(ort_err("optimization level"))?
        .with_intra_threads(settings.intra_threads)
        .map_err(ort_err("thread config"))?
        .with_execution_providers([dispatch])
        .map_err(ort_err("execution provider"))?
        .commit_from_file(path)
        .map_err(ort_err("model load"))
}

fn optimization_level(level: u8) -> GraphOptimizationLevel {
    match level {
        0 => GraphOptimizationLevel::Disable,
        1 => GraphOptimizationLevel::Level1,
        2 => GraphOptimizationLevel::Level2,
        _ => GraphOptimizationLevel::Level3,
    }
}

fn ort_err<E: Display>(context: &'static str) -> impl FnOnce(E) -> ClipError {
    move |e| ClipError::Inference(format!("{context}: {e}"))
}

/// Map an ONNX tensor element type onto a supported representation.
pub fn element_type(ty: TensorElementType) -> Result<ElementType> {
    match ty {
        TensorElementType::Float32 => Ok(ElementType::F32),
        TensorElementType::Float16 => Ok(ElementType::F16),
        TensorElementType::Int8 => Ok(ElementType::I8),
        TensorElementType::Uint8 => Ok(ElementType::U8),
        TensorElementType::Float64 => Ok(ElementType::F64),
        TensorElementType::Int32 => Ok(ElementType::I32),
        TensorElementType::Int64 => Ok(ElementType::I64),
        other => Err(ClipError::UnsupportedNumericType(format!("{other:?}"))),
    }
}

fn tensor_info(name: &str, value_type: &ValueType) -> Result<TensorInfo> {
    let (Some(ty), Some(shape)) = (value_type.tensor_type(), value_type.tensor_shape()) else {
        return Err(ClipError::EngineContractViolation(format!(
            "'{name}' is not a tensor"
        )));
    };
    let dims = shape.iter().map(|&d| Dim::from_declared(d)).collect();
    Ok(TensorInfo::new(name, element_type(ty)?, dims))
}

fn to_value<T>(shape: Vec<i64>, data: Vec<T>) -> Result<DynValue>
where
    T: PrimitiveTensorElementType + Debug + Clone + 'static,
{
    Ok(ort::value::Tensor::from_array((shape, data))
        .map_err(ort_err("input tensor"))?
        .into_dyn())
}

fn extract<T>(value: &DynValue) -> Result<Tensor>
where
    T: PrimitiveTensorElementType + TensorElement,
{
    let (shape, data) = value
        .try_extract_tensor::<T>()
        .map_err(|e| ClipError::UnexpectedOutput(format!("extract {}: {e}", T::ELEMENT_TYPE)))?;
    let dims = shape
        .iter()
        .map(|&d| usize::try_from(d))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| ClipError::UnexpectedOutput(format!("negative output dimension in {shape:?}")))?;
    Tensor::new(dims, T::wrap(data.to_vec()))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn supported_element_types() {
        assert_eq!(element_type(TensorElementType::Float32).unwrap(), ElementType::F32);
        assert_eq!(element_type(TensorElementType::Float16).unwrap(), ElementType::F16);
        assert_eq!(element_type(TensorElementType::Int8).unwrap(), ElementType::I8);
        assert_eq!(element_type(TensorElementType::Int64).unwrap(), ElementType::I64);
    }

    #[test]
    fn unsupported_element_type() {
        assert_matches!(
            element_type(TensorElementType::Bool),
            Err(ClipError::UnsupportedNumericType(_))
        );
    }

    #[test]
    fn optimization_levels() {
        assert!(matches!(optimization_level(0), GraphOptimizationLevel::Disable));
        assert!(matches!(optimization_level(3), GraphOptimizationLevel::Level3));
        assert!(matches!(optimization_level(9), GraphOptimizationLevel::Level3));
    }

    #[test]
    fn missing_model_is_not_available() {
        let dir = tempfile::tempdir().unwrap();
        let result = OrtEngine::load(&dir.path().join("visual.onnx"), &RuntimeSettings::default());
        assert_matches!(result.err(), Some(ClipError::ModelNotAvailable(ref m)) if m.contains("visual.onnx"));
    }
}
