//! The decoder boundary: consumed by the worker pool, implemented by
//! whatever image-decoding backend the host application wants to supply.
//!
//! The specification treats decoding as an opaque blocking call; this module
//! only defines the trait and ships one concrete, synchronous implementation
//! (`DefaultDecoder`) backed by the `image` crate (matching the teacher's
//! `image_loader.rs::LoadedImage::load`) and `imagesize` for the cheap
//! header-only probe `add` needs (`read_header` must not pull in a full
//! decode just to learn a file's dimensions).

use std::path::Path;

use crate::error::DecodeError;

/// A fully-decoded RGBA8 image, smallest unit of work the pyramid generator
/// consumes.
#[derive(Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    /// Tightly packed, row-major RGBA8 pixels; `len() == width*height*4`.
    pub pixels: Vec<u8>,
}

/// Consumed by the worker pool; implemented by an external decoder
/// collaborator. Must be thread-safe — each worker calls it from its own
/// thread with no external synchronization.
pub trait Decoder: Send + Sync + 'static {
    /// Fully decode `path` to RGBA8. Called only on worker threads.
    fn decode(&self, path: &Path) -> Result<DecodedImage, DecodeError>;

    /// Cheaply read `(width, height)` from a file header without a full
    /// decode. Called only by `CacheDirectory::add` (on the render thread,
    /// from directory-enumeration-provided paths), never by a worker.
    fn read_header(&self, path: &Path) -> Result<(u32, u32), DecodeError>;
}

/// The `image`-crate-backed decoder shipped with this crate. Mirrors the
/// teacher's `LoadedImage::load_static`: `image::open` then `to_rgba8()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDecoder;

impl Decoder for DefaultDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedImage, DecodeError> {
        let img = image::open(path).map_err(|e| DecodeError::DecodeFailed {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;
        let rgba = img.to_rgba8();
        let (width, height) = (rgba.width(), rgba.height());
        Ok(DecodedImage {
            width,
            height,
            pixels: rgba.into_raw(),
        })
    }

    fn read_header(&self, path: &Path) -> Result<(u32, u32), DecodeError> {
        let size = imagesize::size(path).map_err(|e| DecodeError::HeaderReadFailed {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;
        Ok((size.width as u32, size.height as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_test_png(path: &std::path::Path, w: u32, h: u32) {
        let img = image::RgbaImage::from_fn(w, h, |_, _| image::Rgba([10, 20, 30, 255]));
        image::DynamicImage::ImageRgba8(img)
            .save_with_format(path, image::ImageFormat::Png)
            .unwrap();
    }

    #[test]
    fn default_decoder_round_trips_a_real_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.png");
        write_test_png(&path, 8, 4);

        let decoder = DefaultDecoder;
        let (w, h) = decoder.read_header(&path).unwrap();
        assert_eq!((w, h), (8, 4));

        let decoded = decoder.decode(&path).unwrap();
        assert_eq!((decoded.width, decoded.height), (8, 4));
        assert_eq!(decoded.pixels.len(), 8 * 4 * 4);
    }

    #[test]
    fn decode_failure_surfaces_as_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-an-image.png");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"not a real png").unwrap();

        let decoder = DefaultDecoder;
        assert!(decoder.decode(&path).is_err());
    }

    #[test]
    fn header_read_failure_surfaces_as_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.png");
        let decoder = DefaultDecoder;
        assert!(decoder.read_header(&path).is_err());
    }
}
