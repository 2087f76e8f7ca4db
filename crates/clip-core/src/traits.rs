//! Collaborator interfaces for image decoding and text tokenization.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::errors::Result;
use crate::image::PixelGrid;

/// Where an image comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageSource {
    /// Image file on disk.
    Path(PathBuf),
    /// Encoded image bytes (PNG, JPEG, ...).
    Bytes(Vec<u8>),
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(p) => write!(f, "{}", p.display()),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for ImageSource {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<Vec<u8>> for ImageSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

/// Decodes encoded images into RGB pixel grids and resizes them.
pub trait ImageDecoder: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Decode a source at its native size, dropping any alpha channel.
    ///
    /// Fails with [`ClipError::ImageDecode`](crate::ClipError::ImageDecode)
    /// when the source is not a valid image.
    fn decode(&self, source: &ImageSource) -> Result<PixelGrid>;

    /// Resample a valid grid to `size x size`.
    fn resize(&self, grid: &PixelGrid, size: usize) -> PixelGrid;

    /// Decode, then resize unless the grid is already `size x size`.
    fn load(&self, source: &ImageSource, size: usize) -> Result<PixelGrid> {
        let grid = self.decode(source)?;
        if grid.width() == size && grid.height() == size {
            return Ok(grid);
        }
        Ok(self.resize(&grid, size))
    }
}

impl<D: ImageDecoder + ?Sized> ImageDecoder for Box<D> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn decode(&self, source: &ImageSource) -> Result<PixelGrid> {
        (**self).decode(source)
    }

    fn resize(&self, grid: &PixelGrid, size: usize) -> PixelGrid {
        (**self).resize(grid, size)
    }

    fn load(&self, source: &ImageSource, size: usize) -> Result<PixelGrid> {
        (**self).load(source, size)
    }
}

/// Turns text into token ids and exposes the sentinel ids.
pub trait TextTokenizer: Send + Sync {
    /// Start-of-text sentinel id.
    fn sot_token(&self) -> i32;

    /// End-of-text sentinel id (also used as padding).
    fn eot_token(&self) -> i32;

    /// Encode text without sentinels.
    fn encode(&self, text: &str) -> Result<Vec<i32>>;
}

impl<K: TextTokenizer + ?Sized> TextTokenizer for Box<K> {
    fn sot_token(&self) -> i32 {
        (**self).sot_token()
    }

    fn eot_token(&self) -> i32 {
        (**self).eot_token()
    }

    fn encode(&self, text: &str) -> Result<Vec<i32>> {
        (**self).encode(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_display() {
        assert_eq!(ImageSource::from(PathBuf::from("a/b.png")).to_string(), "a/b.png");
        assert_eq!(ImageSource::from(vec![1u8, 2, 3]).to_string(), "<3 bytes>");
    }
}
