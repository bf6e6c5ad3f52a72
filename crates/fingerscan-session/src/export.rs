//! Export of captured images.
//!
//! Captured images are 8-bit grayscale; the bundled exporter encodes them as
//! PNG through the `image` crate.

use std::path::{Path, PathBuf};

use image::{GrayImage, ImageError, ImageFormat};
use tracing::info;

use fingerscan_core::{Error, Result};
use fingerscan_hardware::ImageData;

/// Writes a captured image somewhere durable.
pub trait ImageExporter: Send + Sync {
    /// Export `image` under `file_name` and return where it was written.
    fn export(&self, image: &ImageData, file_name: &str) -> Result<PathBuf>;
}

/// Exporter writing `<file_name>.png` files into one directory.
///
/// # Examples
///
/// ```
/// use fingerscan_hardware::ImageData;
/// use fingerscan_session::export::{ImageExporter, PngExporter};
///
/// let dir = tempfile::tempdir().unwrap();
/// let exporter = PngExporter::new(dir.path());
///
/// let path = exporter.export(&ImageData::blank(4, 2), "left-index").unwrap();
/// assert!(path.ends_with("left-index.png"));
/// ```
#[derive(Debug, Clone)]
pub struct PngExporter {
    directory: PathBuf,
}

impl PngExporter {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn target(&self, file_name: &str) -> Result<PathBuf> {
        let valid = !file_name.is_empty()
            && file_name != "."
            && file_name != ".."
            && !file_name.contains(['/', '\\']);
        if !valid {
            return Err(Error::InvalidFileName(file_name.to_string()));
        }
        Ok(self.directory.join(format!("{}.png", file_name)))
    }
}

impl ImageExporter for PngExporter {
    fn export(&self, image: &ImageData, file_name: &str) -> Result<PathBuf> {
        let path = self.target(file_name)?;

        let gray = GrayImage::from_raw(image.width(), image.height(), image.pixels().to_vec())
            .ok_or_else(|| {
                Error::ImageEncoding(format!(
                    "{}x{} pixels do not fit the buffer",
                    image.width(),
                    image.height()
                ))
            })?;
        gray.save_with_format(&path, ImageFormat::Png)
            .map_err(encoding_error)?;

        info!(
            "Exported {}x{} image to {}",
            image.width(),
            image.height(),
            path.display()
        );
        Ok(path)
    }
}

fn encoding_error(error: ImageError) -> Error {
    match error {
        ImageError::IoError(e) => Error::Io(e),
        other => Error::ImageEncoding(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use rstest::rstest;

    #[test]
    fn test_writes_grayscale_png() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = PngExporter::new(dir.path());
        let image = ImageData::new(Bytes::from_static(&[0, 64, 128, 255, 1, 2]), 3, 2, 0.0).unwrap();

        let path = exporter.export(&image, "output").unwrap();

        let decoded = image::open(&path).unwrap().into_luma8();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.as_raw(), &[0, 64, 128, 255, 1, 2]);
    }

    #[test]
    fn test_trailing_buffer_bytes_are_not_exported() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = PngExporter::new(dir.path());
        let image = ImageData::new(Bytes::from(vec![1u8; 7]), 3, 2, 0.0).unwrap();

        let path = exporter.export(&image, "padded").unwrap();

        let decoded = image::open(&path).unwrap().into_luma8();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.as_raw().len(), 6);
    }

    #[rstest]
    #[case("")]
    #[case("..")]
    #[case("../escape")]
    #[case("nested/name")]
    #[case("back\\slash")]
    fn test_rejects_unsafe_names(#[case] name: &str) {
        let dir = tempfile::tempdir().unwrap();
        let exporter = PngExporter::new(dir.path());

        let result = exporter.export(&ImageData::blank(1, 1), name);
        assert!(matches!(result, Err(Error::InvalidFileName(_))));
    }

    #[test]
    fn test_missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = PngExporter::new(dir.path().join("missing"));

        let result = exporter.export(&ImageData::blank(1, 1), "output");
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
