//! Upload image normalisation: every accepted file is re-encoded as JPEG in
//! two sizes before it reaches blob storage.

use std::io::Cursor;

use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage};
use thiserror::Error;

pub const ACCEPTED_MIME_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];
pub const OUTPUT_MIME_TYPE: &str = "image/jpeg";

pub const MAX_ORIGINAL_DIMENSION: u32 = 2000;
pub const THUMBNAIL_DIMENSION: u32 = 300;
const ORIGINAL_QUALITY: u8 = 85;
const THUMBNAIL_QUALITY: u8 = 80;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Invalid image file")]
    Decode(String),
    #[error("image encoding failed: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedImage {
    pub original: Vec<u8>,
    pub thumbnail: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// CPU-bound image work. Callers run it on a blocking thread.
pub trait ImageProcessor: Send + Sync {
    fn process(&self, bytes: &[u8]) -> Result<ProcessedImage, MediaError>;
}

pub fn is_accepted_mime(mime: &str) -> bool {
    ACCEPTED_MIME_TYPES
        .iter()
        .any(|accepted| accepted.eq_ignore_ascii_case(mime))
}

/// Fits the original inside 2000x2000 without enlarging it and crops a
/// 300x300 cover thumbnail.
#[derive(Debug, Default, Clone, Copy)]
pub struct JpegProcessor;

impl ImageProcessor for JpegProcessor {
    fn process(&self, bytes: &[u8]) -> Result<ProcessedImage, MediaError> {
        let decoded =
            image::load_from_memory(bytes).map_err(|err| MediaError::Decode(err.to_string()))?;

        let original = if decoded.width() > MAX_ORIGINAL_DIMENSION
            || decoded.height() > MAX_ORIGINAL_DIMENSION
        {
            decoded.resize(
                MAX_ORIGINAL_DIMENSION,
                MAX_ORIGINAL_DIMENSION,
                FilterType::Lanczos3,
            )
        } else {
            decoded.clone()
        };
        let thumbnail =
            decoded.resize_to_fill(THUMBNAIL_DIMENSION, THUMBNAIL_DIMENSION, FilterType::Triangle);

        Ok(ProcessedImage {
            width: original.width(),
            height: original.height(),
            original: encode_jpeg(&original, ORIGINAL_QUALITY)?,
            thumbnail: encode_jpeg(&thumbnail, THUMBNAIL_QUALITY)?,
        })
    }
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, MediaError> {
    let rgb = image.to_rgb8();
    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(&rgb)
        .map_err(|err| MediaError::Encode(err.to_string()))?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn dimensions(jpeg: &[u8]) -> (u32, u32) {
        let decoded = image::load_from_memory(jpeg).unwrap();
        (decoded.width(), decoded.height())
    }

    #[test]
    fn large_originals_are_fitted_and_thumbnails_cropped() {
        let processed = JpegProcessor.process(&png(4000, 1000)).unwrap();
        assert_eq!((processed.width, processed.height), (2000, 500));
        assert_eq!(dimensions(&processed.original), (2000, 500));
        assert_eq!(dimensions(&processed.thumbnail), (300, 300));
    }

    #[test]
    fn small_originals_are_not_enlarged() {
        let processed = JpegProcessor.process(&png(640, 480)).unwrap();
        assert_eq!(dimensions(&processed.original), (640, 480));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = JpegProcessor.process(b"definitely not an image").unwrap_err();
        assert!(matches!(err, MediaError::Decode(_)));
    }

    #[test]
    fn mime_allow_list() {
        assert!(is_accepted_mime("image/png"));
        assert!(is_accepted_mime("IMAGE/JPEG"));
        assert!(!is_accepted_mime("image/gif"));
        assert!(!is_accepted_mime("application/pdf"));
    }
}
