use anyhow::Result;
use color_quant::NeuQuant;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ImageEncoder};
use std::collections::HashMap;

use super::ImageCodec;
use crate::error::Error;

/// Lossy PNG reduction to an indexed image of at most 256 colors.
///
/// Images that already use few enough colors get an exact palette and lose
/// nothing; the rest are quantized with NeuQuant. Transparency survives
/// through a `tRNS` chunk.
#[derive(Debug, Clone, Copy)]
pub struct PaletteCodec {
    max_colors: usize,
    /// NeuQuant sampling factor, 1 (best) to 30 (fastest)
    sample_factor: i32,
}

impl Default for PaletteCodec {
    fn default() -> Self {
        Self {
            max_colors: 256,
            sample_factor: 10,
        }
    }
}

impl PaletteCodec {
    /// Returns an RGBA palette and one index per pixel.
    fn quantize(&self, rgba: &[u8]) -> (Vec<u8>, Vec<u8>) {
        if let Some(exact) = exact_palette(rgba, self.max_colors) {
            return exact;
        }

        let quant = NeuQuant::new(self.sample_factor, self.max_colors, rgba);
        let indices = rgba
            .chunks_exact(4)
            .map(|px| quant.index_of(px) as u8)
            .collect();
        (quant.color_map_rgba(), indices)
    }
}

fn exact_palette(rgba: &[u8], max_colors: usize) -> Option<(Vec<u8>, Vec<u8>)> {
    let mut lookup: HashMap<[u8; 4], u8> = HashMap::new();
    let mut palette = Vec::new();
    let mut indices = Vec::with_capacity(rgba.len() / 4);

    for px in rgba.chunks_exact(4) {
        let color = [px[0], px[1], px[2], px[3]];
        let index = match lookup.get(&color) {
            Some(&index) => index,
            None => {
                if lookup.len() == max_colors {
                    return None;
                }
                let index = lookup.len() as u8;
                lookup.insert(color, index);
                palette.extend_from_slice(&color);
                index
            }
        };
        indices.push(index);
    }

    Some((palette, indices))
}

impl ImageCodec for PaletteCodec {
    fn name(&self) -> &'static str {
        "png-palette"
    }

    fn encode(&self, image: &DynamicImage) -> Result<Vec<u8>> {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        let (palette, indices) = self.quantize(rgba.as_raw());

        let rgb: Vec<u8> = palette.chunks_exact(4).flat_map(|c| [c[0], c[1], c[2]]).collect();
        let mut alpha: Vec<u8> = palette.chunks_exact(4).map(|c| c[3]).collect();
        // tRNS may stop at the last non-opaque entry
        while alpha.last() == Some(&255) {
            alpha.pop();
        }

        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, width, height);
            encoder.set_color(png::ColorType::Indexed);
            encoder.set_depth(png::BitDepth::Eight);
            encoder.set_palette(rgb);
            if !alpha.is_empty() {
                encoder.set_trns(alpha);
            }
            encoder.set_compression(png::Compression::Best);
            // Filters rarely help on index data
            encoder.set_filter(png::FilterType::NoFilter);

            let mut writer = encoder.write_header()?;
            writer.write_image_data(&indices)?;
            writer.finish()?;
        }

        Ok(out)
    }
}

/// Deflate effort and row filter for a lossless PNG re-encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PngSettings {
    pub compression: CompressionType,
    pub filter: FilterType,
}

impl PngSettings {
    /// zlib-style level 0-9: 0-2 fast, 3-6 default, 7-9 best effort, with
    /// adaptive filtering.
    pub fn from_level(level: i64) -> crate::error::Result<Self> {
        if !(0..=9).contains(&level) {
            return Err(Error::validation(format!(
                "compression level must be between 0 and 9, got {level}"
            )));
        }
        Ok(Self {
            compression: compression_for_level(level),
            filter: FilterType::Adaptive,
        })
    }

    /// ImageMagick-style PNG quality 0-100: the tens digit is the
    /// compression level and the ones digit picks the filter (0 none, 1 sub,
    /// 2 up, 3 average, 4 paeth, 5-9 adaptive).
    pub fn from_quality(quality: i64) -> crate::error::Result<Self> {
        if !(0..=100).contains(&quality) {
            return Err(Error::validation(format!(
                "quality must be between 0 and 100, got {quality}"
            )));
        }
        let filter = match quality % 10 {
            0 => FilterType::NoFilter,
            1 => FilterType::Sub,
            2 => FilterType::Up,
            3 => FilterType::Avg,
            4 => FilterType::Paeth,
            _ => FilterType::Adaptive,
        };
        Ok(Self {
            compression: compression_for_level((quality / 10).min(9)),
            filter,
        })
    }
}

impl Default for PngSettings {
    fn default() -> Self {
        Self {
            compression: CompressionType::Best,
            filter: FilterType::Adaptive,
        }
    }
}

fn compression_for_level(level: i64) -> CompressionType {
    match level {
        0..=2 => CompressionType::Fast,
        3..=6 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}

/// Lossless PNG re-encode with configurable effort.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngCodec {
    settings: PngSettings,
}

impl PngCodec {
    pub fn new(settings: PngSettings) -> Self {
        Self { settings }
    }
}

impl ImageCodec for PngCodec {
    fn name(&self) -> &'static str {
        "png"
    }

    fn encode(&self, image: &DynamicImage) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        PngEncoder::new_with_quality(&mut out, self.settings.compression, self.settings.filter)
            .write_image(image.as_bytes(), image.width(), image.height(), image.color().into())?;
        Ok(out)
    }
}
