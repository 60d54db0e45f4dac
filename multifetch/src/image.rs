//! Image decoding for fetched blobs.

use ::image::DynamicImage;

use crate::error::DownloadError;
use crate::key::ResourceKey;

/// Decodes `data` into an image, guessing the format from its magic bytes.
pub fn decode(key: &ResourceKey, data: &[u8]) -> Result<DynamicImage, DownloadError> {
    ::image::load_from_memory(data).map_err(|e| DownloadError::Decode {
        key: key.clone(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ::image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    /// Encodes a solid `width`×`height` PNG.
    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_decode_png() {
        let data = png_bytes(4, 3);
        let img = decode(&ResourceKey::new("a.png"), &data).unwrap();
        assert_eq!(img.width(), 4);
        assert_eq!(img.height(), 3);
    }

    #[test]
    fn test_decode_garbage_is_decode_error() {
        let err = decode(&ResourceKey::new("bad.png"), b"definitely not an image").unwrap_err();
        assert!(matches!(err, DownloadError::Decode { ref key, .. } if key.as_str() == "bad.png"));
    }
}
