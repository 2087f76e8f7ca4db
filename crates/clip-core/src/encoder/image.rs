use std::marker::PhantomData;

use parking_lot::Mutex;
use tracing::{debug, debug_span};

use super::{embedding_output, first_input, split_rows};
use crate::engine::{Dim, InferenceEngine, TensorInfo};
use crate::errors::{ClipError, Result};
use crate::image::{CHANNELS, ImageNormalizer, NormalizationStats};
use crate::numeric::NumericConverter;
use crate::tensor::{BatchTensor, TensorElement};
use crate::traits::{ImageDecoder, ImageSource};

/// Side length used when a model leaves both spatial dimensions dynamic.
pub const DEFAULT_IMAGE_SIZE: usize = 224;

/// Construction options for [`ImageEncoder`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImageEncoderOptions {
    /// Size to use when the model's spatial dimensions are both dynamic.
    pub fallback_size: usize,
    /// Per-channel normalization statistics.
    pub stats: NormalizationStats,
}

impl Default for ImageEncoderOptions {
    fn default() -> Self {
        Self {
            fallback_size: DEFAULT_IMAGE_SIZE,
            stats: NormalizationStats::clip(),
        }
    }
}

/// Encodes batches of images into embedding vectors.
///
/// `T` is the element representation of the model's pixel input and `O` the
/// element type of its embedding output. The model input must be declared
/// `[N, 3, S, S]`.
pub struct ImageEncoder<T, D, E, O = f32> {
    decoder: D,
    normalizer: ImageNormalizer<T>,
    engine: Mutex<E>,
    input: TensorInfo,
    output: TensorInfo,
    _output: PhantomData<fn() -> O>,
}

impl<T, D, E, O> ImageEncoder<T, D, E, O>
where
    T: NumericConverter,
    D: ImageDecoder,
    E: InferenceEngine,
    O: TensorElement,
{
    /// Bind an engine and decoder with CLIP statistics.
    pub fn new(engine: E, decoder: D) -> Result<Self> {
        Self::with_options(engine, decoder, ImageEncoderOptions::default())
    }

    /// Bind an engine and decoder, validating the model's declared input once.
    pub fn with_options(engine: E, decoder: D, options: ImageEncoderOptions) -> Result<Self> {
        let input = first_input(&engine)?;
        let size = image_input_size(&input, options.fallback_size)?;
        if input.element_type != T::ELEMENT_TYPE {
            return Err(ClipError::EngineContractViolation(format!(
                "input '{}' is {}, encoder produces {}",
                input.name,
                input.element_type,
                T::ELEMENT_TYPE
            )));
        }
        let output = embedding_output::<E, O>(&engine)?;
        let normalizer = ImageNormalizer::with_stats(size, options.stats)?;

        debug!(
            input = %input.name,
            output = %output.name,
            shape = %input.shape_string(),
            element = %T::ELEMENT_TYPE,
            decoder = decoder.name(),
            "image encoder ready"
        );

        Ok(Self {
            decoder,
            normalizer,
            engine: Mutex::new(engine),
            input,
            output,
            _output: PhantomData,
        })
    }

    /// Square side length images are resized to.
    pub fn image_size(&self) -> usize {
        self.normalizer.size()
    }

    /// Embedding width, when the model declares it.
    pub fn embedding_dim(&self) -> Option<usize> {
        self.output.dims[1].fixed()
    }

    /// Bound input metadata.
    pub fn input(&self) -> &TensorInfo {
        &self.input
    }

    /// Decode, normalize and flatten every source into a `[N, 3, S, S]` batch.
    ///
    /// Fails on the first source that cannot be decoded.
    pub fn preprocess(&self, sources: &[ImageSource]) -> Result<BatchTensor<T>> {
        let size = self.normalizer.size();
        let items = sources
            .iter()
            .enumerate()
            .map(|(i, source)| {
                let grid = self.decoder.load(source, size).map_err(|e| match e {
                    ClipError::ImageDecode(msg) => {
                        ClipError::ImageDecode(format!("item {i} ({source}): {msg}"))
                    }
                    other => other,
                })?;
                self.normalizer.normalize(&grid)
            })
            .collect::<Result<Vec<_>>>()?;
        BatchTensor::from_arrays(&items, &self.normalizer.item_shape())
    }

    /// Encode images; `result[i]` is the embedding of `sources[i]`.
    pub fn encode_images(&self, sources: &[ImageSource]) -> Result<Vec<Vec<O>>> {
        if sources.is_empty() {
            return Ok(Vec::new());
        }
        let n = sources.len();
        let _span = debug_span!("encode_images", batch = n).entered();
        if !self.input.dims[0].accepts(n) {
            return Err(ClipError::ShapeMismatch(format!(
                "model batch dimension is {}, got {n} images",
                self.input.dims[0]
            )));
        }

        let batch = self.preprocess(sources)?;
        debug!(shape = ?batch.shape(), "image batch assembled");

        let output = {
            let mut engine = self.engine.lock();
            engine.run(&self.input.name, batch.into_tensor(), &self.output.name)?
        };
        debug!(shape = ?output.shape(), "image embeddings received");
        split_rows(output, n)
    }
}

/// Validate `[N, 3, S, S]` and return `S`.
fn image_input_size(input: &TensorInfo, fallback: usize) -> Result<usize> {
    if input.rank() != 4 {
        return Err(ClipError::ShapeMismatch(format!(
            "image input '{}' must have rank 4 [N, 3, H, W], model declares {}",
            input.name,
            input.shape_string()
        )));
    }
    if !input.dims[1].accepts(CHANNELS) {
        return Err(ClipError::ShapeMismatch(format!(
            "image input '{}' must have 3 channels, model declares {}",
            input.name,
            input.shape_string()
        )));
    }
    match (input.dims[2], input.dims[3]) {
        (Dim::Fixed(h), Dim::Fixed(w)) if h == w && h > 0 => Ok(h),
        (Dim::Dynamic, Dim::Dynamic) => Ok(fallback),
        _ => Err(ClipError::ShapeMismatch(format!(
            "image input '{}' must have equal height and width, model declares {}",
            input.name,
            input.shape_string()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::capture_logs;
    use crate::mock::{MockDecoder, MockEngine};
    use crate::tensor::{ElementType, TensorData};
    use assert_matches::assert_matches;
    use half::f16;
    use tracing::Level;

    fn image_engine(element: ElementType, dims: Vec<Dim>) -> MockEngine {
        MockEngine::new(
            TensorInfo::new("pixel_values", element, dims),
            TensorInfo::new("image_embeds", ElementType::F32, vec![Dim::Dynamic, Dim::Fixed(4)]),
        )
    }

    fn square(size: usize) -> Vec<Dim> {
        vec![Dim::Dynamic, Dim::Fixed(3), Dim::Fixed(size), Dim::Fixed(size)]
    }

    fn sources(colors: &[u8]) -> Vec<ImageSource> {
        colors.iter().map(|c| ImageSource::Bytes(vec![*c])).collect()
    }

    #[test]
    fn rank_three_input_fails_construction() {
        let engine = image_engine(ElementType::F32, vec![Dim::Fixed(3), Dim::Fixed(8), Dim::Fixed(8)]);
        let result = ImageEncoder::<f32, _, _>::new(engine, MockDecoder::new());
        assert_matches!(result.err(), Some(ClipError::ShapeMismatch(_)));
    }

    #[test]
    fn non_square_input_fails_construction() {
        let engine = image_engine(
            ElementType::F32,
            vec![Dim::Dynamic, Dim::Fixed(3), Dim::Fixed(224), Dim::Fixed(256)],
        );
        let result = ImageEncoder::<f32, _, _>::new(engine, MockDecoder::new());
        assert_matches!(result.err(), Some(ClipError::ShapeMismatch(_)));
    }

    #[test]
    fn half_dynamic_spatial_fails_construction() {
        let engine = image_engine(
            ElementType::F32,
            vec![Dim::Dynamic, Dim::Fixed(3), Dim::Dynamic, Dim::Fixed(224)],
        );
        let result = ImageEncoder::<f32, _, _>::new(engine, MockDecoder::new());
        assert_matches!(result.err(), Some(ClipError::ShapeMismatch(_)));
    }

    #[test]
    fn wrong_channels_fails_construction() {
        let engine = image_engine(
            ElementType::F32,
            vec![Dim::Dynamic, Dim::Fixed(4), Dim::Fixed(8), Dim::Fixed(8)],
        );
        let result = ImageEncoder::<f32, _, _>::new(engine, MockDecoder::new());
        assert_matches!(result.err(), Some(ClipError::ShapeMismatch(_)));
    }

    #[test]
    fn element_type_mismatch_fails_construction() {
        let engine = image_engine(ElementType::F16, square(8));
        let result = ImageEncoder::<f32, _, _>::new(engine, MockDecoder::new());
        assert_matches!(result.err(), Some(ClipError::EngineContractViolation(_)));
    }

    #[test]
    fn output_type_mismatch_fails_construction() {
        let engine = image_engine(ElementType::F32, square(8));
        let result = ImageEncoder::<f32, _, _, f16>::new(engine, MockDecoder::new());
        assert_matches!(result.err(), Some(ClipError::EngineContractViolation(_)));
    }

    #[test]
    fn dynamic_spatial_uses_fallback() {
        let engine = image_engine(
            ElementType::F32,
            vec![Dim::Dynamic, Dim::Fixed(3), Dim::Dynamic, Dim::Dynamic],
        );
        let encoder = ImageEncoder::<f32, _, _>::new(engine, MockDecoder::new()).unwrap();
        assert_eq!(encoder.image_size(), DEFAULT_IMAGE_SIZE);
    }

    #[test]
    fn size_comes_from_model() {
        let encoder = ImageEncoder::<f32, _, _>::new(image_engine(ElementType::F32, square(16)), MockDecoder::new()).unwrap();
        assert_eq!(encoder.image_size(), 16);
        assert_eq!(encoder.embedding_dim(), Some(4));
    }

    #[test]
    fn output_order_matches_input_order() {
        let engine = image_engine(ElementType::F32, square(4));
        let encoder = ImageEncoder::<f32, _, _>::new(engine, MockDecoder::new()).unwrap();
        let out = encoder.encode_images(&sources(&[10, 200, 10, 90])).unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(out[0][1..], out[2][1..]);
        assert_ne!(out[0][1..], out[1][1..]);
        assert_ne!(out[1][1..], out[3][1..]);
        // The mock tags each row with its batch index.
        for (i, row) in out.iter().enumerate() {
            assert_eq!(row[0], i as f32);
        }
    }

    #[test]
    fn batch_tensor_shape_and_layout() {
        let engine = image_engine(ElementType::F32, square(2));
        let encoder = ImageEncoder::<f32, _, _>::new(engine, MockDecoder::new()).unwrap();
        let batch = encoder.preprocess(&sources(&[255, 0])).unwrap();
        assert_eq!(batch.shape(), &[2, 3, 2, 2]);
        let data = batch.as_slice();
        // MockDecoder paints (c, c, c); item 0 is white, item 1 black.
        let stats = NormalizationStats::clip();
        assert_eq!(data[0], stats.apply(0, 255));
        assert_eq!(data[4], stats.apply(1, 255));
        assert_eq!(data[8], stats.apply(2, 255));
        assert_eq!(data[12], stats.apply(0, 0));
        assert_eq!(data[23], stats.apply(2, 0));
    }

    #[test]
    fn engine_receives_batch_tensor() {
        let engine = image_engine(ElementType::I8, square(2));
        let calls = engine.calls();
        let encoder = ImageEncoder::<i8, _, _>::new(engine, MockDecoder::new()).unwrap();
        let _ = encoder.encode_images(&sources(&[255, 0, 128])).unwrap();
        let recorded = calls.lock();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].input_name, "pixel_values");
        assert_eq!(recorded[0].shape, vec![3, 3, 2, 2]);
        assert_matches!(recorded[0].data, TensorData::Int8(ref v) if v.len() == 36 && v[0] == 2);
    }

    #[test]
    fn decode_failure_aborts_batch() {
        let engine = image_engine(ElementType::F32, square(2));
        let calls = engine.calls();
        let encoder = ImageEncoder::<f32, _, _>::new(engine, MockDecoder::new()).unwrap();
        let mut batch = sources(&[1, 2]);
        batch.insert(1, ImageSource::Bytes(Vec::new()));
        let err = encoder.encode_images(&batch).unwrap_err();
        assert_matches!(err, ClipError::ImageDecode(ref msg) if msg.contains("item 1"));
        assert!(calls.lock().is_empty(), "engine must not run on a failed batch");
    }

    #[test]
    fn empty_batch_skips_engine() {
        let engine = image_engine(ElementType::F32, square(2));
        let calls = engine.calls();
        let encoder = ImageEncoder::<f32, _, _>::new(engine, MockDecoder::new()).unwrap();
        assert!(encoder.encode_images(&[]).unwrap().is_empty());
        assert!(calls.lock().is_empty());
    }

    #[test]
    fn fixed_batch_dimension_enforced() {
        let engine = image_engine(
            ElementType::F32,
            vec![Dim::Fixed(1), Dim::Fixed(3), Dim::Fixed(2), Dim::Fixed(2)],
        );
        let encoder = ImageEncoder::<f32, _, _>::new(engine, MockDecoder::new()).unwrap();
        assert!(encoder.encode_images(&sources(&[1])).is_ok());
        assert_matches!(encoder.encode_images(&sources(&[1, 2])), Err(ClipError::ShapeMismatch(_)));
    }

    #[test]
    fn concurrent_encodes_are_serialized() {
        const THREADS: usize = 6;
        let engine = image_engine(ElementType::F32, square(2));
        let calls = engine.calls();
        let encoder = ImageEncoder::<f32, _, _>::new(engine, MockDecoder::new()).unwrap();
        let batches: Vec<Vec<ImageSource>> = (0..THREADS)
            .map(|t| sources(&[t as u8 * 20, t as u8 * 20 + 5, t as u8 * 20 + 10]))
            .collect();
        let expected: Vec<_> = batches.iter().map(|b| encoder.encode_images(b).unwrap()).collect();
        let before = calls.lock().len();

        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = batches
                .iter()
                .map(|batch| scope.spawn(|| encoder.encode_images(batch).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for (got, want) in results.iter().zip(&expected) {
            assert_eq!(got, want);
            for (i, row) in got.iter().enumerate() {
                assert_eq!(row[0], i as f32);
            }
        }
        assert_eq!(calls.lock().len() - before, THREADS);
    }

    #[test]
    fn encode_is_logged() {
        let (logs, _guard) = capture_logs();
        let encoder = ImageEncoder::<f32, _, _>::new(image_engine(ElementType::F32, square(2)), MockDecoder::new()).unwrap();
        let _ = encoder.encode_images(&sources(&[3, 4])).unwrap();
        assert!(logs.has_event(Level::DEBUG, "image encoder ready"));
        assert!(logs.has_event(Level::DEBUG, "image batch assembled"));
        assert!(logs.has_span("encode_images"));
    }

    #[test]
    fn wrong_grid_from_decoder_is_dimension_mismatch() {
        let engine = image_engine(ElementType::F32, square(4));
        let encoder = ImageEncoder::<f32, _, _>::new(engine, MockDecoder::new().without_resize()).unwrap();
        let err = encoder.encode_images(&sources(&[7])).unwrap_err();
        assert_matches!(err, ClipError::DimensionMismatch { .. });
    }
}
