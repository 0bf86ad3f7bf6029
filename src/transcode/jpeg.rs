use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, ExtendedColorType, ImageEncoder};

use super::ImageCodec;
use crate::config::Quality;

/// Lossy JPEG re-encode.
///
/// Grayscale stays single channel. Everything else is flattened to RGB,
/// which drops alpha and expands palettes.
#[derive(Debug, Clone, Copy)]
pub struct JpegCodec {
    quality: Quality,
    optimize: bool,
}

impl JpegCodec {
    pub fn new(quality: Quality, optimize: bool) -> Self {
        Self { quality, optimize }
    }
}

impl ImageCodec for JpegCodec {
    fn name(&self) -> &'static str {
        "jpeg"
    }

    fn encode(&self, image: &DynamicImage) -> Result<Vec<u8>> {
        let (width, height) = (image.width(), image.height());
        let (pixels, color) = match image.color() {
            ColorType::L8 | ColorType::L16 => (image.to_luma8().into_raw(), ExtendedColorType::L8),
            _ => (image.to_rgb8().into_raw(), ExtendedColorType::Rgb8),
        };

        let mut out = Vec::new();
        if self.optimize {
            // image's encoder always writes the standard Huffman tables
            let width = u16::try_from(width).context("image too wide for JPEG")?;
            let height = u16::try_from(height).context("image too tall for JPEG")?;
            let color = match color {
                ExtendedColorType::L8 => jpeg_encoder::ColorType::Luma,
                _ => jpeg_encoder::ColorType::Rgb,
            };

            let mut encoder = jpeg_encoder::Encoder::new(&mut out, self.quality.get());
            encoder.set_optimized_huffman_tables(true);
            encoder.encode(&pixels, width, height, color)?;
        } else {
            JpegEncoder::new_with_quality(&mut out, self.quality.get())
                .write_image(&pixels, width, height, color)?;
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgba, RgbaImage};

    fn textured(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x * 7 % 256) as u8, (y * 5 % 256) as u8, ((x ^ y) % 256) as u8, (x % 256) as u8])
        })
    }

    #[test]
    fn alpha_is_flattened_to_rgb() {
        let codec = JpegCodec::new(Quality::new(80).unwrap(), false);
        let jpeg = codec.encode(&DynamicImage::ImageRgba8(textured(40, 24))).unwrap();

        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 24));
        assert_eq!(decoded.color(), ColorType::Rgb8);
    }

    #[test]
    fn grayscale_stays_grayscale() {
        let gray = GrayImage::from_fn(16, 16, |x, _| Luma([(x * 16) as u8]));
        let codec = JpegCodec::new(Quality::new(80).unwrap(), true);
        let jpeg = codec.encode(&DynamicImage::ImageLuma8(gray)).unwrap();

        assert_eq!(image::load_from_memory(&jpeg).unwrap().color(), ColorType::L8);
    }

    #[test]
    fn lower_quality_gives_smaller_files() {
        let image = DynamicImage::ImageRgba8(textured(128, 128));
        let high = JpegCodec::new(Quality::new(95).unwrap(), false).encode(&image).unwrap();
        let low = JpegCodec::new(Quality::new(10).unwrap(), false).encode(&image).unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn optimized_output_decodes() {
        let image = DynamicImage::ImageRgba8(textured(64, 48));
        let jpeg = JpegCodec::new(Quality::new(60).unwrap(), true).encode(&image).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }
}
