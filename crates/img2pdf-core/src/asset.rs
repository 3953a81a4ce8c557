use std::io::Cursor;
use std::path::Path;

use bytes::Bytes;
use image::{ImageFormat, ImageReader};

use crate::error::{Error, Result};

/// An image whose header has been read and whose size is known.
///
/// Holds the raw encoded bytes; pixel decoding is left to the encoder so
/// formats it can embed directly (JPEG) never get decompressed.
#[derive(Clone)]
pub struct ImageAsset {
    /// Where the image came from (path or upload name), for logs and errors
    label: String,
    data: Bytes,
    width: u32,
    height: u32,
    format: ImageFormat,
}

impl ImageAsset {
    /// Probe an in-memory image.
    ///
    /// The format is sniffed from the content, not from `label`.
    pub fn from_bytes(label: impl Into<String>, data: impl Into<Bytes>) -> Result<Self> {
        let label = label.into();
        let data = data.into();

        let reader = ImageReader::new(Cursor::new(data.as_ref()))
            .with_guessed_format()
            .map_err(|e| Error::decode(&label, e))?;

        let format = reader
            .format()
            .ok_or_else(|| Error::decode(&label, "unrecognized image format"))?;

        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| Error::decode(&label, e))?;

        if width == 0 || height == 0 {
            return Err(Error::decode(&label, format!("empty image ({width}x{height})")));
        }

        Ok(Self {
            label,
            data,
            width,
            height,
            format,
        })
    }

    /// Probe an image on disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| {
            Error::decode(path.display().to_string(), format!("failed to read file: {e}"))
        })?;
        Self::from_bytes(path.display().to_string(), data)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub const fn width(&self) -> u32 {
        self.width
    }

    pub const fn height(&self) -> u32 {
        self.height
    }

    pub const fn format(&self) -> ImageFormat {
        self.format
    }
}

impl std::fmt::Debug for ImageAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageAsset")
            .field("label", &self.label)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("bytes_len", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn encode(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 30, 30]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_probe_png() {
        let asset = ImageAsset::from_bytes("scan.png", encode(20, 10, ImageFormat::Png)).unwrap();
        assert_eq!((asset.width(), asset.height()), (20, 10));
        assert_eq!(asset.format(), ImageFormat::Png);
        assert_eq!(asset.label(), "scan.png");
    }

    #[test]
    fn test_format_sniffed_from_content() {
        // Misnamed file: the label says PNG, the bytes are JPEG
        let asset = ImageAsset::from_bytes("photo.png", encode(8, 16, ImageFormat::Jpeg)).unwrap();
        assert_eq!(asset.format(), ImageFormat::Jpeg);
        assert_eq!((asset.width(), asset.height()), (8, 16));
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let err = ImageAsset::from_bytes("photo.jpg", b"this is not an image".to_vec()).unwrap_err();
        assert!(matches!(err, Error::Decode { ref name, .. } if name == "photo.jpg"));
    }

    #[test]
    fn test_missing_file_is_decode_error() {
        let err = ImageAsset::from_file("/nonexistent/photo.jpg").unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.bmp");
        std::fs::write(&path, encode(3, 5, ImageFormat::Bmp)).unwrap();

        let asset = ImageAsset::from_file(&path).unwrap();
        assert_eq!(asset.format(), ImageFormat::Bmp);
        assert_eq!((asset.width(), asset.height()), (3, 5));
    }
}
