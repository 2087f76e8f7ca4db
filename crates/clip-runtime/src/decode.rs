//! Image decoders backed by the `image` crate.
//!
//! Two backends share decoding and differ only in the resampling filter:
//! [`LanczosDecoder`] (Lanczos3) and [`CubicDecoder`] (Catmull-Rom). Both
//! stretch to a square without preserving aspect ratio and drop alpha.

use clip_core::{ClipError, ImageDecoder, ImageSource, PixelGrid, Result};
use clip_settings::ImageBackend;
use image::imageops::{self, FilterType};
use image::{ImageReader, RgbImage};
use tracing::trace;

/// Lanczos3 resampling.
#[derive(Clone, Copy, Debug, Default)]
pub struct LanczosDecoder;

/// Catmull-Rom bicubic resampling.
#[derive(Clone, Copy, Debug, Default)]
pub struct CubicDecoder;

impl ImageDecoder for LanczosDecoder {
    fn name(&self) -> &'static str {
        "lanczos"
    }

    fn decode(&self, source: &ImageSource) -> Result<PixelGrid> {
        decode_rgb(source)
    }

    fn resize(&self, grid: &PixelGrid, size: usize) -> PixelGrid {
        resize_with(grid, size, FilterType::Lanczos3)
    }
}

impl ImageDecoder for CubicDecoder {
    fn name(&self) -> &'static str {
        "cubic"
    }

    fn decode(&self, source: &ImageSource) -> Result<PixelGrid> {
        decode_rgb(source)
    }

    fn resize(&self, grid: &PixelGrid, size: usize) -> PixelGrid {
        resize_with(grid, size, FilterType::CatmullRom)
    }
}

/// Decoder for a configured backend.
pub fn decoder_for(backend: ImageBackend) -> Box<dyn ImageDecoder> {
    match backend {
        ImageBackend::Lanczos => Box::new(LanczosDecoder),
        ImageBackend::Cubic => Box::new(CubicDecoder),
    }
}

fn decode_rgb(source: &ImageSource) -> Result<PixelGrid> {
    let image = match source {
        ImageSource::Path(path) => ImageReader::open(path)
            .and_then(ImageReader::with_guessed_format)
            .map_err(|e| ClipError::ImageDecode(format!("{}: {e}", path.display())))?
            .decode(),
        ImageSource::Bytes(bytes) => image::load_from_memory(bytes),
    }
    .map_err(|e| ClipError::ImageDecode(e.to_string()))?;

    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    trace!(width, height, "decoded image");
    PixelGrid::new(width as usize, height as usize, rgb.into_raw())
}

fn resize_with(grid: &PixelGrid, size: usize, filter: FilterType) -> PixelGrid {
    let Some(rgb) = RgbImage::from_raw(
        grid.width() as u32,
        grid.height() as u32,
        grid.as_raw().to_vec(),
    ) else {
        return grid.clone();
    };
    let resized = imageops::resize(&rgb, size as u32, size as u32, filter);
    let (width, height) = resized.dimensions();
    PixelGrid::new(width as usize, height as usize, resized.into_raw()).unwrap_or_else(|_| grid.clone())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use assert_matches::assert_matches;
    use image::{DynamicImage, ImageFormat, Rgb, Rgba, RgbaImage};

    use super::*;

    fn png_bytes(image: DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn solid_png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
        png_bytes(DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(rgb))))
    }

    #[test]
    fn decodes_bytes_at_native_size() {
        let grid = LanczosDecoder.decode(&ImageSource::Bytes(solid_png(7, 5, [255, 0, 0]))).unwrap();
        assert_eq!((grid.width(), grid.height()), (7, 5));
        assert_eq!(grid.pixel(6, 4), [255, 0, 0]);
    }

    #[test]
    fn alpha_is_dropped() {
        let rgba = RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 0]));
        let bytes = png_bytes(DynamicImage::ImageRgba8(rgba));
        let grid = CubicDecoder.decode(&ImageSource::Bytes(bytes)).unwrap();
        assert_eq!(grid.as_raw().len(), 12);
        assert_eq!(grid.pixel(1, 1), [10, 20, 30]);
    }

    #[test]
    fn both_backends_resize_to_square() {
        let source = ImageSource::Bytes(solid_png(40, 10, [0, 128, 255]));
        for decoder in [decoder_for(ImageBackend::Lanczos), decoder_for(ImageBackend::Cubic)] {
            let grid = decoder.load(&source, 16).unwrap();
            assert_eq!((grid.width(), grid.height()), (16, 16), "{}", decoder.name());
            // Solid input stays solid under either filter.
            assert_eq!(grid.pixel(8, 8), [0, 128, 255], "{}", decoder.name());
        }
    }

    #[test]
    fn corrupt_bytes_fail() {
        let err = LanczosDecoder
            .decode(&ImageSource::Bytes(b"definitely not a png".to_vec()))
            .unwrap_err();
        assert_matches!(err, ClipError::ImageDecode(_));
    }

    #[test]
    fn missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = CubicDecoder
            .decode(&ImageSource::Path(dir.path().join("nope.png")))
            .unwrap_err();
        assert_matches!(err, ClipError::ImageDecode(ref msg) if msg.contains("nope.png"));
    }

    #[test]
    fn decodes_file_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo");
        std::fs::write(&path, solid_png(3, 3, [1, 2, 3])).unwrap();
        let grid = LanczosDecoder.decode(&ImageSource::Path(path)).unwrap();
        assert_eq!(grid.pixel(0, 0), [1, 2, 3]);
    }

    #[test]
    fn backend_names() {
        assert_eq!(decoder_for(ImageBackend::Lanczos).name(), "lanczos");
        assert_eq!(decoder_for(ImageBackend::Cubic).name(), "cubic");
    }
}
