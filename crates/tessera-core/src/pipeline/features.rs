//! Perceptual descriptors: average colour, palette and luminance grid.
//!
//! All three are pure functions of the decoded pixels. They are computed
//! once at ingestion (or by the explicit recompute pass) and stored.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, RgbImage};

use crate::config::FeaturesConfig;
use crate::types::{Features, Rgb};

/// Longest edge of the raster sampled for palette quantization.
const PALETTE_SAMPLE_EDGE: u32 = 128;

/// Derives [`Features`] from decoded images.
pub struct FeatureExtractor {
    config: FeaturesConfig,
}

impl FeatureExtractor {
    pub fn new(config: FeaturesConfig) -> Self {
        Self { config }
    }

    /// Derive all descriptors from the same source pixels.
    pub fn extract(&self, image: &DynamicImage) -> Features {
        let rgb = image.to_rgb8();
        Features {
            average_color: average_color(&rgb),
            palette: palette(image, self.config.palette_size),
            luminance: luminance_grid(&rgb, self.config.grid_size),
        }
    }
}

/// Per-channel mean over every pixel, rounded to the nearest integer.
pub fn average_color(rgb: &RgbImage) -> Rgb {
    let count = u64::from(rgb.width()) * u64::from(rgb.height());
    if count == 0 {
        return Rgb::new(0, 0, 0);
    }
    let mut sums = [0u64; 3];
    for pixel in rgb.pixels() {
        for (sum, channel) in sums.iter_mut().zip(pixel.0) {
            *sum += u64::from(channel);
        }
    }
    Rgb(sums.map(|s| rounded_mean(s, count)))
}

/// Integer mean with halves rounded up.
fn rounded_mean(sum: u64, count: u64) -> u8 {
    ((sum * 2 + count) / (count * 2)).min(255) as u8
}

/// Resize to `grid_size × grid_size` ignoring aspect ratio and take
/// `round((R+G+B)/3)` per cell, flattened in raster order.
pub fn luminance_grid(rgb: &RgbImage, grid_size: u32) -> Vec<u8> {
    if rgb.width() == 0 || rgb.height() == 0 {
        return vec![0; (grid_size * grid_size) as usize];
    }
    let cells = imageops::resize(rgb, grid_size, grid_size, FilterType::Triangle);
    cells
        .pixels()
        .map(|p| rounded_mean(p.0.iter().map(|&c| u64::from(c)).sum(), 3))
        .collect()
}

/// `k` representative colours by median-cut quantization.
///
/// Colours are ordered by how many pixels they represent. When the image
/// has fewer than `k` distinct colours the found colours are repeated in
/// order until the palette is full.
pub fn palette(image: &DynamicImage, k: usize) -> Vec<Rgb> {
    if k == 0 {
        return Vec::new();
    }

    let (width, height) = image.dimensions();
    let sample = if width > PALETTE_SAMPLE_EDGE || height > PALETTE_SAMPLE_EDGE {
        image
            .resize(PALETTE_SAMPLE_EDGE, PALETTE_SAMPLE_EDGE, FilterType::Nearest)
            .to_rgb8()
    } else {
        image.to_rgb8()
    };
    let pixels: Vec<[u8; 3]> = sample.pixels().map(|p| p.0).collect();
    if pixels.is_empty() {
        return vec![Rgb::new(0, 0, 0); k];
    }

    let mut boxes = vec![ColorBox::new(pixels)];
    while boxes.len() < k {
        let Some(index) = widest_splittable(&boxes) else {
            break;
        };
        let target = boxes.swap_remove(index);
        let (low, high) = target.split();
        boxes.push(low);
        boxes.push(high);
    }

    boxes.sort_by(|a, b| {
        b.pixels
            .len()
            .cmp(&a.pixels.len())
            .then_with(|| a.mean().0.cmp(&b.mean().0))
    });

    let mut found: Vec<Rgb> = Vec::with_capacity(k);
    for color in boxes.iter().map(ColorBox::mean) {
        if !found.contains(&color) {
            found.push(color);
        }
    }

    found.iter().copied().cycle().take(k).collect()
}

/// Index of the box with the widest channel range, if any box can be split.
fn widest_splittable(boxes: &[ColorBox]) -> Option<usize> {
    boxes
        .iter()
        .enumerate()
        .filter(|(_, b)| b.widest_channel().1 > 0)
        .max_by(|(ia, a), (ib, b)| {
            a.widest_channel()
                .1
                .cmp(&b.widest_channel().1)
                .then_with(|| a.pixels.len().cmp(&b.pixels.len()))
                .then_with(|| ib.cmp(ia))
        })
        .map(|(i, _)| i)
}

struct ColorBox {
    pixels: Vec<[u8; 3]>,
}

impl ColorBox {
    fn new(pixels: Vec<[u8; 3]>) -> Self {
        Self { pixels }
    }

    /// Channel with the largest value range, and that range.
    fn widest_channel(&self) -> (usize, u8) {
        let mut min = [u8::MAX; 3];
        let mut max = [u8::MIN; 3];
        for p in &self.pixels {
            for c in 0..3 {
                min[c] = min[c].min(p[c]);
                max[c] = max[c].max(p[c]);
            }
        }
        (0..3)
            .map(|c| (c, max[c].saturating_sub(min[c])))
            .fold((0, 0), |best, cur| if cur.1 > best.1 { cur } else { best })
    }

    /// Split along the widest channel at the value boundary nearest the
    /// median, so equal colours never straddle two boxes. Requires a
    /// non-zero range.
    fn split(mut self) -> (ColorBox, ColorBox) {
        let (channel, _) = self.widest_channel();
        self.pixels.sort_by_key(|p| p[channel]);
        let median = self.pixels[self.pixels.len() / 2][channel];
        let mut at = self.pixels.partition_point(|p| p[channel] < median);
        if at == 0 {
            at = self.pixels.partition_point(|p| p[channel] <= median);
        }
        let high = self.pixels.split_off(at);
        (ColorBox::new(self.pixels), ColorBox::new(high))
    }

    fn mean(&self) -> Rgb {
        let count = self.pixels.len() as u64;
        let mut sums = [0u64; 3];
        for p in &self.pixels {
            for c in 0..3 {
                sums[c] += u64::from(p[c]);
            }
        }
        Rgb(sums.map(|s| rounded_mean(s, count.max(1))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb as Pixel;

    fn solid(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Pixel(color)))
    }

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::new(FeaturesConfig::default())
    }

    #[test]
    fn test_uniform_image_features() {
        let features = extractor().extract(&solid(800, 600, [10, 10, 10]));
        assert_eq!(features.average_color, Rgb::new(10, 10, 10));
        assert_eq!(features.luminance.len(), 256);
        assert!(features.luminance.iter().all(|&l| l == 10));
        assert_eq!(features.palette, vec![Rgb::new(10, 10, 10); 5]);
    }

    #[test]
    fn test_average_color_rounds() {
        let mut img = RgbImage::from_pixel(2, 1, Pixel([0, 0, 0]));
        img.put_pixel(1, 0, Pixel([1, 2, 3]));
        // Means are 0.5, 1.0, 1.5.
        assert_eq!(average_color(&img), Rgb::new(1, 1, 2));
    }

    #[test]
    fn test_luminance_grid_is_positional() {
        // Left half black, right half white: every row reads dark then bright.
        let mut img = RgbImage::from_pixel(64, 32, Pixel([0, 0, 0]));
        for y in 0..32 {
            for x in 32..64 {
                img.put_pixel(x, y, Pixel([255, 255, 255]));
            }
        }
        let grid = luminance_grid(&img, 4);
        assert_eq!(grid.len(), 16);
        for row in grid.chunks(4) {
            // The filter may blend the two middle cells across the edge,
            // but the outer cells stay pure and the order never flips.
            assert!(row[0] < 16, "{row:?}");
            assert!(row[3] > 239, "{row:?}");
            assert!(row[0] <= row[1] && row[1] < row[2] && row[2] <= row[3], "{row:?}");
        }
        assert!(grid.chunks(4).all(|row| row == &grid[..4]));
    }

    #[test]
    fn test_luminance_is_channel_mean() {
        let img = RgbImage::from_pixel(8, 8, Pixel([30, 60, 91]));
        // (30 + 60 + 91) / 3 = 60.33
        assert!(luminance_grid(&img, 2).iter().all(|&l| l == 60));
    }

    #[test]
    fn test_luminance_grid_tiny_source() {
        let img = RgbImage::from_pixel(1, 1, Pixel([90, 90, 90]));
        let grid = luminance_grid(&img, 16);
        assert_eq!(grid.len(), 256);
        assert!(grid.iter().all(|&l| l == 90));
    }

    #[test]
    fn test_grid_ignores_aspect_ratio() {
        let wide = extractor().extract(&solid(1000, 100, [40, 40, 40]));
        let tall = extractor().extract(&solid(100, 1000, [40, 40, 40]));
        assert_eq!(wide.luminance, tall.luminance);
    }

    #[test]
    fn test_palette_pads_by_cycling() {
        let mut img = RgbImage::from_pixel(10, 10, Pixel([255, 0, 0]));
        for x in 0..4 {
            for y in 0..10 {
                img.put_pixel(x, y, Pixel([0, 0, 255]));
            }
        }
        let colors = palette(&DynamicImage::ImageRgb8(img), 5);
        assert_eq!(colors.len(), 5);
        // Red covers more pixels, so it comes first.
        assert_eq!(colors[0], Rgb::new(255, 0, 0));
        assert_eq!(colors[1], Rgb::new(0, 0, 255));
        assert_eq!(colors[2], colors[0]);
        assert_eq!(colors[3], colors[1]);
        assert_eq!(colors[4], colors[0]);
    }

    #[test]
    fn test_palette_finds_distinct_colors() {
        let mut img = RgbImage::new(40, 10);
        let bands = [[255, 0, 0], [0, 255, 0], [0, 0, 255], [250, 250, 250]];
        for (i, color) in bands.iter().enumerate() {
            for x in (i as u32 * 10)..(i as u32 * 10 + 10) {
                for y in 0..10 {
                    img.put_pixel(x, y, Pixel(*color));
                }
            }
        }
        let colors = palette(&DynamicImage::ImageRgb8(img), 4);
        for color in bands {
            assert!(colors.contains(&Rgb(color)), "missing {color:?} in {colors:?}");
        }
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let mut img = RgbImage::new(97, 61);
        for (x, y, p) in img.enumerate_pixels_mut() {
            *p = Pixel([(x * 7 % 256) as u8, (y * 11 % 256) as u8, ((x + y) % 256) as u8]);
        }
        let img = DynamicImage::ImageRgb8(img);
        assert_eq!(extractor().extract(&img), extractor().extract(&img));
    }
}
