//! Image decoding with content-based format detection and dimension limits.

use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;

use crate::config::LimitsConfig;
use crate::error::IngestError;

use super::validate::AcceptedFormat;

/// Image decoder with configurable limits.
pub struct ImageDecoder {
    limits: LimitsConfig,
}

/// Result of decoding an image.
pub struct DecodedImage {
    /// The decoded image data
    pub image: DynamicImage,
    /// Format detected from the content
    pub format: AcceptedFormat,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

impl ImageDecoder {
    /// Create a new decoder with the given limits.
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Decode an in-memory upload. Blocking; call from a worker thread.
    ///
    /// The format is detected from the content and must agree with the
    /// format the upload was declared (and validated) as.
    pub fn decode(&self, bytes: &[u8], expected: AcceptedFormat) -> Result<DecodedImage, IngestError> {
        let reader = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| IngestError::DecodeFailure {
                message: format!("Cannot detect image format: {e}"),
            })?;

        let detected = reader.format().ok_or_else(|| IngestError::DecodeFailure {
            message: "Unrecognized image format".to_string(),
        })?;
        if detected != expected.image_format() {
            return Err(IngestError::DecodeFailure {
                message: format!(
                    "Content is {} but was declared as {}",
                    format_to_string(detected),
                    expected.mimetype()
                ),
            });
        }

        let image = reader.decode().map_err(|e| IngestError::DecodeFailure {
            message: e.to_string(),
        })?;

        let (width, height) = image.dimensions();
        self.check_dimensions(width, height)?;

        Ok(DecodedImage {
            image,
            format: expected,
            width,
            height,
        })
    }

    /// Decode a stored original from disk (maintenance pass).
    pub fn decode_path(
        &self,
        path: &std::path::Path,
        expected: AcceptedFormat,
    ) -> Result<DecodedImage, IngestError> {
        let bytes = std::fs::read(path).map_err(|e| IngestError::DecodeFailure {
            message: format!("Cannot read {}: {e}", path.display()),
        })?;
        self.decode(&bytes, expected)
    }

    fn check_dimensions(&self, width: u32, height: u32) -> Result<(), IngestError> {
        if width > self.limits.max_image_dimension || height > self.limits.max_image_dimension {
            return Err(IngestError::DecodeFailure {
                message: format!(
                    "Image too large ({width}x{height} > {})",
                    self.limits.max_image_dimension
                ),
            });
        }
        if width < self.limits.min_image_dimension || height < self.limits.min_image_dimension {
            return Err(IngestError::DecodeFailure {
                message: format!(
                    "Image too small ({width}x{height} < {})",
                    self.limits.min_image_dimension
                ),
            });
        }
        Ok(())
    }
}

/// Convert an ImageFormat to a string representation.
pub fn format_to_string(format: ImageFormat) -> String {
    match format {
        ImageFormat::Jpeg => "jpeg".to_string(),
        ImageFormat::Png => "png".to_string(),
        ImageFormat::WebP => "webp".to_string(),
        ImageFormat::Gif => "gif".to_string(),
        ImageFormat::Tiff => "tiff".to_string(),
        ImageFormat::Bmp => "bmp".to_string(),
        _ => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([1, 2, 3])));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_format_to_string() {
        assert_eq!(format_to_string(ImageFormat::Jpeg), "jpeg");
        assert_eq!(format_to_string(ImageFormat::Png), "png");
        assert_eq!(format_to_string(ImageFormat::WebP), "webp");
    }

    #[test]
    fn test_decode_png() {
        let decoder = ImageDecoder::new(LimitsConfig::default());
        let decoded = decoder.decode(&png_bytes(40, 30), AcceptedFormat::Png).unwrap();
        assert_eq!((decoded.width, decoded.height), (40, 30));
        assert_eq!(decoded.format, AcceptedFormat::Png);
    }

    #[test]
    fn test_decode_rejects_declared_mismatch() {
        let decoder = ImageDecoder::new(LimitsConfig::default());
        let err = decoder
            .decode(&png_bytes(4, 4), AcceptedFormat::Jpeg)
            .err()
            .unwrap();
        assert!(matches!(err, IngestError::DecodeFailure { .. }));
    }

    #[test]
    fn test_decode_rejects_truncated() {
        let decoder = ImageDecoder::new(LimitsConfig::default());
        let bytes = png_bytes(64, 64);
        let err = decoder.decode(&bytes[..40], AcceptedFormat::Png).err().unwrap();
        assert!(matches!(err, IngestError::DecodeFailure { .. }));
    }

    #[test]
    fn test_decode_enforces_dimension_limits() {
        let limits = LimitsConfig {
            max_image_dimension: 32,
            min_image_dimension: 8,
            ..Default::default()
        };
        let decoder = ImageDecoder::new(limits);
        let too_big = decoder.decode(&png_bytes(64, 16), AcceptedFormat::Png).err().unwrap();
        assert!(too_big.to_string().contains("too large"));
        let too_small = decoder.decode(&png_bytes(4, 16), AcceptedFormat::Png).err().unwrap();
        assert!(too_small.to_string().contains("too small"));
    }
}
