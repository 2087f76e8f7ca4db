//! Decoded pixel grids and per-channel CLIP normalization into CHW tensors.

use std::marker::PhantomData;

use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::errors::{ClipError, Result};
use crate::numeric::NumericConverter;

/// Number of color channels kept after decode (R, G, B).
pub const CHANNELS: usize = 3;

/// CLIP per-channel mean, R, G, B.
pub const CLIP_MEAN: [f32; CHANNELS] = [0.481_454_66, 0.457_827_5, 0.408_210_73];

/// CLIP per-channel standard deviation, R, G, B.
pub const CLIP_STD: [f32; CHANNELS] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// A decoded, resized image: interleaved RGB bytes, row-major, no alpha.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelGrid {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl PixelGrid {
    /// Wrap an interleaved RGB buffer of `width * height * 3` bytes.
    pub fn new(width: usize, height: usize, data: Vec<u8>) -> Result<Self> {
        let expected = width * height * CHANNELS;
        if data.len() != expected {
            return Err(ClipError::ShapeMismatch(format!(
                "{width}x{height} RGB grid needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A grid where every pixel has the same color.
    pub fn filled(width: usize, height: usize, rgb: [u8; CHANNELS]) -> Self {
        Self::from_fn(width, height, |_, _| rgb)
    }

    /// Build a grid from a per-pixel function of `(x, y)`.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> [u8; CHANNELS]) -> Self {
        let mut data = Vec::with_capacity(width * height * CHANNELS);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Grid width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Grid height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// RGB bytes of the pixel at `(x, y)`.
    pub fn pixel(&self, x: usize, y: usize) -> [u8; CHANNELS] {
        debug_assert!(
            x < self.width && y < self.height,
            "pixel ({x}, {y}) outside {}x{} grid",
            self.width,
            self.height
        );
        let i = (y * self.width + x) * CHANNELS;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Interleaved RGB bytes.
    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }
}

/// Per-channel mean and standard deviation applied after scaling to `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizationStats {
    /// Channel means, R, G, B.
    pub mean: [f32; CHANNELS],
    /// Channel standard deviations, R, G, B.
    pub std: [f32; CHANNELS],
}

impl NormalizationStats {
    /// CLIP (`OpenAI`) statistics.
    pub const fn clip() -> Self {
        Self {
            mean: CLIP_MEAN,
            std: CLIP_STD,
        }
    }

    /// Normalize one raw channel byte.
    pub fn apply(&self, channel: usize, byte: u8) -> f32 {
        (f32::from(byte) / 255.0 - self.mean[channel]) / self.std[channel]
    }
}

impl Default for NormalizationStats {
    fn default() -> Self {
        Self::clip()
    }
}

/// Turns a [`PixelGrid`] into a `(3, size, size)` tensor of `T`.
///
/// `tensor[c, y, x] = T::convert((byte / 255 - mean[c]) / std[c])`.
/// A channel byte has only 256 values, so the converted samples are
/// precomputed per channel at construction.
#[derive(Clone, Debug)]
pub struct ImageNormalizer<T> {
    size: usize,
    stats: NormalizationStats,
    table: Vec<T>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: NumericConverter> ImageNormalizer<T> {
    /// Normalizer for square `size x size` grids with CLIP statistics.
    pub fn new(size: usize) -> Result<Self> {
        Self::with_stats(size, NormalizationStats::clip())
    }

    /// Normalizer with custom statistics.
    pub fn with_stats(size: usize, stats: NormalizationStats) -> Result<Self> {
        if size == 0 {
            return Err(ClipError::Config("image size must be positive".into()));
        }
        if stats.std.iter().any(|s| *s == 0.0 || !s.is_finite()) {
            return Err(ClipError::Config(format!(
                "normalization std must be finite and non-zero: {:?}",
                stats.std
            )));
        }
        let table = (0..CHANNELS)
            .flat_map(|c| (0..=u8::MAX).map(move |b| T::convert(stats.apply(c, b))))
            .collect();
        Ok(Self {
            size,
            stats,
            table,
            _marker: PhantomData,
        })
    }

    /// Configured side length.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Statistics in use.
    pub fn stats(&self) -> &NormalizationStats {
        &self.stats
    }

    /// Shape of every produced tensor, `[3, size, size]`.
    pub fn item_shape(&self) -> [usize; 3] {
        [CHANNELS, self.size, self.size]
    }

    /// Normalize a grid into channel-major layout.
    pub fn normalize(&self, grid: &PixelGrid) -> Result<Array3<T>> {
        if grid.width != self.size || grid.height != self.size {
            return Err(ClipError::DimensionMismatch {
                expected_width: self.size,
                expected_height: self.size,
                width: grid.width,
                height: grid.height,
            });
        }

        let plane = self.size * self.size;
        let mut data = vec![self.table[0]; CHANNELS * plane];
        for (i, px) in grid.data.chunks_exact(CHANNELS).enumerate() {
            for (c, byte) in px.iter().enumerate() {
                data[c * plane + i] = self.table[c * 256 + usize::from(*byte)];
            }
        }

        Array3::from_shape_vec((CHANNELS, self.size, self.size), data)
            .map_err(|e| ClipError::ShapeMismatch(format!("normalized tensor: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use half::f16;

    const TOL: f32 = 1e-4;

    #[test]
    fn pixel_grid_new_checks_length() {
        let err = PixelGrid::new(2, 2, vec![0; 11]).unwrap_err();
        assert!(matches!(err, ClipError::ShapeMismatch(_)));
        assert!(PixelGrid::new(2, 2, vec![0; 12]).is_ok());
    }

    #[test]
    fn pixel_grid_from_fn_row_major() {
        let grid = PixelGrid::from_fn(3, 2, |x, y| [x as u8, y as u8, 9]);
        assert_eq!(grid.pixel(2, 1), [2, 1, 9]);
        assert_eq!(&grid.as_raw()[..6], &[0, 0, 9, 1, 0, 9]);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "outside 3x2 grid")]
    fn pixel_past_row_end_panics() {
        let grid = PixelGrid::filled(3, 2, [1, 2, 3]);
        let _ = grid.pixel(3, 0);
    }

    #[test]
    fn red_pixel_matches_clip_reference() {
        let norm = ImageNormalizer::<f32>::new(2).unwrap();
        let t = norm.normalize(&PixelGrid::filled(2, 2, [255, 0, 0])).unwrap();
        assert!((t[[0, 0, 0]] - 1.930_33).abs() < TOL, "R = {}", t[[0, 0, 0]]);
        assert!((t[[1, 0, 0]] + 1.752_28).abs() < TOL, "G = {}", t[[1, 0, 0]]);
        assert!((t[[2, 0, 0]] + 1.479_82).abs() < TOL, "B = {}", t[[2, 0, 0]]);
    }

    #[test]
    fn output_index_is_channel_row_column() {
        let norm = ImageNormalizer::<f32>::new(3).unwrap();
        let grid = PixelGrid::from_fn(3, 3, |x, y| if (x, y) == (2, 0) { [255, 255, 255] } else { [0, 0, 0] });
        let t = norm.normalize(&grid).unwrap();
        let white_r = NormalizationStats::clip().apply(0, 255);
        assert_eq!(t[[0, 0, 2]], white_r);
        assert_ne!(t[[0, 2, 0]], white_r);
        assert_eq!(t.shape(), &[3, 3, 3]);
    }

    #[test]
    fn table_matches_direct_formula() {
        let norm = ImageNormalizer::<f32>::new(16).unwrap();
        let grid = PixelGrid::from_fn(16, 16, |x, y| [(x * 16 + y) as u8, (y * 16 + x) as u8, 255 - (x * 16 + y) as u8]);
        let t = norm.normalize(&grid).unwrap();
        for y in 0..16 {
            for x in 0..16 {
                let px = grid.pixel(x, y);
                for c in 0..CHANNELS {
                    let direct = (f32::from(px[c]) / 255.0 - CLIP_MEAN[c]) / CLIP_STD[c];
                    assert_eq!(t[[c, y, x]], direct);
                }
            }
        }
    }

    #[test]
    fn wrong_size_is_dimension_mismatch() {
        let norm = ImageNormalizer::<f32>::new(224).unwrap();
        let err = norm.normalize(&PixelGrid::filled(223, 224, [0, 0, 0])).unwrap_err();
        assert!(matches!(
            err,
            ClipError::DimensionMismatch {
                expected_width: 224,
                width: 223,
                ..
            }
        ));
    }

    #[test]
    fn i8_output_is_rounded() {
        let norm = ImageNormalizer::<i8>::new(1).unwrap();
        let t = norm.normalize(&PixelGrid::filled(1, 1, [255, 0, 0])).unwrap();
        assert_eq!(t[[0, 0, 0]], 2);
        assert_eq!(t[[1, 0, 0]], -2);
        assert_eq!(t[[2, 0, 0]], -1);
    }

    #[test]
    fn f16_output_is_close() {
        let norm = ImageNormalizer::<f16>::new(1).unwrap();
        let t = norm.normalize(&PixelGrid::filled(1, 1, [255, 0, 0])).unwrap();
        assert!((t[[0, 0, 0]].to_f32() - 1.930_33).abs() < 2e-3);
    }

    #[test]
    fn zero_std_rejected() {
        let stats = NormalizationStats {
            mean: [0.5; 3],
            std: [1.0, 0.0, 1.0],
        };
        assert!(matches!(
            ImageNormalizer::<f32>::with_stats(4, stats),
            Err(ClipError::Config(_))
        ));
    }

    #[test]
    fn zero_size_rejected() {
        assert!(matches!(ImageNormalizer::<f32>::new(0), Err(ClipError::Config(_))));
    }

    #[test]
    fn normalization_is_deterministic() {
        let norm = ImageNormalizer::<f32>::new(8).unwrap();
        let grid = PixelGrid::from_fn(8, 8, |x, y| [(x * 30) as u8, (y * 30) as u8, 128]);
        assert_eq!(norm.normalize(&grid).unwrap(), norm.normalize(&grid).unwrap());
    }
}
