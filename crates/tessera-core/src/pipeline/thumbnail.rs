//! Fixed-size thumbnails by center crop and resize.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;

use crate::config::ThumbnailConfig;
use crate::error::IngestError;

/// Extension of every format a thumbnail may have been written in.
pub const THUMBNAIL_EXTENSIONS: &[&str] = &["jpg", "png", "webp"];

/// Renders thumbnails of exactly the configured size.
pub struct ThumbnailRenderer {
    config: ThumbnailConfig,
}

/// Centered crop rectangle in source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    /// Largest centered region of the source with the target's aspect ratio.
    ///
    /// `scale = min(W / dstW, H / dstH)`; the region is `(dstW·scale, dstH·scale)`.
    pub fn centered(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Self {
        let scale = (f64::from(src_w) / f64::from(dst_w)).min(f64::from(src_h) / f64::from(dst_h));
        let width = ((f64::from(dst_w) * scale).round() as u32).clamp(1, src_w.max(1));
        let height = ((f64::from(dst_h) * scale).round() as u32).clamp(1, src_h.max(1));
        Self {
            x: (src_w - width) / 2,
            y: (src_h - height) / 2,
            width,
            height,
        }
    }
}

impl ThumbnailRenderer {
    /// Create a new renderer with the given configuration.
    pub fn new(config: ThumbnailConfig) -> Self {
        Self { config }
    }

    /// Crop the centered region and resize it to exactly the target size.
    pub fn render(&self, image: &DynamicImage) -> DynamicImage {
        let (src_w, src_h) = image.dimensions();
        let region = CropRegion::centered(src_w, src_h, self.config.width, self.config.height);
        image
            .crop_imm(region.x, region.y, region.width, region.height)
            .resize_exact(self.config.width, self.config.height, FilterType::Lanczos3)
    }

    /// Render and encode in the configured format.
    pub fn render_bytes(&self, image: &DynamicImage) -> Result<Vec<u8>, IngestError> {
        let thumbnail = self.render(image);
        let mut buffer = Cursor::new(Vec::new());

        let result = match self.config.format.as_str() {
            "jpeg" => {
                let encoder = JpegEncoder::new_with_quality(&mut buffer, self.config.quality);
                DynamicImage::ImageRgb8(thumbnail.to_rgb8()).write_with_encoder(encoder)
            }
            "png" => thumbnail.write_to(&mut buffer, ImageFormat::Png),
            "webp" => DynamicImage::ImageRgba8(thumbnail.to_rgba8()).write_to(&mut buffer, ImageFormat::WebP),
            other => {
                return Err(IngestError::RenderFailure {
                    message: format!("unsupported thumbnail format '{other}'"),
                })
            }
        };

        result.map_err(|e| IngestError::RenderFailure {
            message: e.to_string(),
        })?;
        Ok(buffer.into_inner())
    }

    /// File extension for encoded thumbnails.
    pub fn extension(&self) -> &str {
        match self.config.format.as_str() {
            "jpeg" => "jpg",
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer(width: u32, height: u32, format: &str) -> ThumbnailRenderer {
        ThumbnailRenderer::new(ThumbnailConfig {
            width,
            height,
            format: format.to_string(),
            quality: 80,
        })
    }

    #[test]
    fn test_output_is_exact_for_any_aspect() {
        let r = renderer(300, 200, "jpeg");
        for (w, h) in [(1000, 500), (500, 1000), (300, 200), (7, 3), (1, 1), (4000, 200)] {
            let thumb = r.render(&DynamicImage::new_rgb8(w, h));
            assert_eq!(thumb.dimensions(), (300, 200), "source {w}x{h}");
        }
    }

    #[test]
    fn test_crop_region_centered_wide_source() {
        // scale = min(1000/300, 500/200) = 2.5 → 750x500 crop
        let region = CropRegion::centered(1000, 500, 300, 200);
        assert_eq!(
            region,
            CropRegion {
                x: 125,
                y: 0,
                width: 750,
                height: 500
            }
        );
    }

    #[test]
    fn test_crop_region_centered_tall_source() {
        // scale = min(600/300, 1200/200) = 2 → 600x400 crop
        let region = CropRegion::centered(600, 1200, 300, 200);
        assert_eq!(
            region,
            CropRegion {
                x: 0,
                y: 400,
                width: 600,
                height: 400
            }
        );
    }

    #[test]
    fn test_jpeg_bytes() {
        let bytes = renderer(64, 48, "jpeg")
            .render_bytes(&DynamicImage::new_rgb8(200, 200))
            .unwrap();
        assert_eq!(&bytes[0..3], &[0xFF, 0xD8, 0xFF]);
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (64, 48));
    }

    #[test]
    fn test_webp_bytes() {
        let bytes = renderer(32, 32, "webp")
            .render_bytes(&DynamicImage::new_rgb8(100, 60))
            .unwrap();
        // WebP files start with "RIFF"
        assert_eq!(&bytes[0..4], b"RIFF");
    }

    #[test]
    fn test_every_format_has_a_known_extension() {
        for format in ["jpeg", "png", "webp"] {
            let ext = renderer(4, 4, format).extension().to_string();
            assert!(THUMBNAIL_EXTENSIONS.contains(&ext.as_str()), "{format} -> {ext}");
        }
    }

    #[test]
    fn test_unknown_format_is_render_failure() {
        let err = renderer(32, 32, "bmp")
            .render_bytes(&DynamicImage::new_rgb8(10, 10))
            .unwrap_err();
        assert!(matches!(err, IngestError::RenderFailure { .. }));
    }
}
