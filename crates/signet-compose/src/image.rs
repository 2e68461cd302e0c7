//! Image normalization: any supported raster format becomes a
//! single-page PDF sized to the image.
//!
//! JPEG bytes pass through intact (DCTDecode); PNG is decoded and
//! re-embedded as zlib-compressed samples (FlateDecode). Everything else
//! goes through the host raster capability to become PNG first.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::ComposeError;
use crate::page::{PdfBuilder, PdfImage};
use crate::sniff::ImageFormat;
use crate::Rasterizer;

/// A4 in points: pages never exceed this in either dimension.
pub const MAX_PAGE_WIDTH: f64 = 595.0;
pub const MAX_PAGE_HEIGHT: f64 = 842.0;

/// Page size for an image of the given pixel dimensions: native size,
/// scaled down uniformly when oversized. Never scales up.
pub fn page_size_for(width_px: u32, height_px: u32) -> (f64, f64) {
    let w = width_px.max(1) as f64;
    let h = height_px.max(1) as f64;
    if w <= MAX_PAGE_WIDTH && h <= MAX_PAGE_HEIGHT {
        return (w, h);
    }
    let scale = (MAX_PAGE_WIDTH / w).min(MAX_PAGE_HEIGHT / h);
    (w * scale, h * scale)
}

/// Convert raster image bytes into a single-page PDF, the image drawn at
/// the origin filling the whole page.
pub fn image_to_pdf(
    bytes: &[u8],
    format: ImageFormat,
    rasterizer: Option<&dyn Rasterizer>,
) -> Result<Vec<u8>, ComposeError> {
    let image = decode_image(bytes, format, rasterizer)?;
    let (width, height) = page_size_for(image.width, image.height);
    let mut builder = PdfBuilder::new();
    builder.add_image_page(width, height, image);
    builder.finish()
}

/// Decode to an embeddable [`PdfImage`], transcoding through the host
/// capability when the format has no native PDF filter.
pub(crate) fn decode_image(
    bytes: &[u8],
    format: ImageFormat,
    rasterizer: Option<&dyn Rasterizer>,
) -> Result<PdfImage, ComposeError> {
    match format {
        ImageFormat::Jpeg => decode_jpeg(bytes),
        ImageFormat::Png => decode_png(bytes),
        other => {
            let rasterizer = rasterizer.ok_or_else(|| {
                ComposeError::UnsupportedFormat(format!(
                    "{} requires the host raster capability",
                    other.name()
                ))
            })?;
            let png = rasterizer.transcode_to_png(bytes, other)?;
            decode_png(&png)
        }
    }
}

/// Scan JPEG markers for the frame header. Returns (width, height,
/// component count).
fn jpeg_info(bytes: &[u8]) -> Option<(u32, u32, u8)> {
    if !bytes.starts_with(&[0xFF, 0xD8]) {
        return None;
    }
    let mut i = 2;
    while i + 3 < bytes.len() {
        if bytes[i] != 0xFF {
            i += 1;
            continue;
        }
        let marker = bytes[i + 1];
        match marker {
            0xFF => i += 1,
            // Standalone markers carry no length.
            0xD8 | 0x01 | 0xD0..=0xD7 => i += 2,
            // SOF0..SOF15 minus DHT/JPG/DAC hold the frame dimensions.
            0xC0..=0xCF if marker != 0xC4 && marker != 0xC8 && marker != 0xCC => {
                if i + 9 >= bytes.len() {
                    return None;
                }
                let height = u16::from_be_bytes([bytes[i + 5], bytes[i + 6]]) as u32;
                let width = u16::from_be_bytes([bytes[i + 7], bytes[i + 8]]) as u32;
                return Some((width, height, bytes[i + 9]));
            }
            _ => {
                if i + 3 >= bytes.len() {
                    return None;
                }
                let len = u16::from_be_bytes([bytes[i + 2], bytes[i + 3]]) as usize;
                i += 2 + len;
            }
        }
    }
    None
}

fn decode_jpeg(bytes: &[u8]) -> Result<PdfImage, ComposeError> {
    let (width, height, components) = jpeg_info(bytes)
        .ok_or_else(|| ComposeError::RasterError("JPEG frame header not found".into()))?;
    if width == 0 || height == 0 {
        return Err(ComposeError::RasterError("JPEG has zero dimensions".into()));
    }
    match components {
        1 | 3 => Ok(PdfImage {
            width,
            height,
            gray: components == 1,
            dct: true,
            data: bytes.to_vec(),
        }),
        other => Err(ComposeError::UnsupportedFormat(format!(
            "JPEG with {} components",
            other
        ))),
    }
}

/// Flatten an interleaved alpha channel onto a white background.
fn composite_alpha(samples: &[u8], channels: usize) -> Vec<u8> {
    let color_channels = channels - 1;
    let mut out = Vec::with_capacity(samples.len() / channels * color_channels);
    for px in samples.chunks_exact(channels) {
        let alpha = px[color_channels] as u16;
        for &c in &px[..color_channels] {
            out.push(((c as u16 * alpha + 255 * (255 - alpha)) / 255) as u8);
        }
    }
    out
}

fn decode_png(bytes: &[u8]) -> Result<PdfImage, ComposeError> {
    let mut decoder = png::Decoder::new(bytes);
    // Expand palettes and 16-bit depths down to plain 8-bit channels.
    decoder.set_transformations(png::Transformations::normalize_to_color8());
    let mut reader = decoder
        .read_info()
        .map_err(|e| ComposeError::RasterError(format!("PNG decode failed: {}", e)))?;
    let mut buf = vec![0u8; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buf)
        .map_err(|e| ComposeError::RasterError(format!("PNG decode failed: {}", e)))?;
    buf.truncate(info.buffer_size());

    let (gray, samples) = match info.color_type {
        png::ColorType::Rgb => (false, buf),
        png::ColorType::Grayscale => (true, buf),
        png::ColorType::Rgba => (false, composite_alpha(&buf, 4)),
        png::ColorType::GrayscaleAlpha => (true, composite_alpha(&buf, 2)),
        other => {
            return Err(ComposeError::RasterError(format!(
                "unsupported PNG color type {:?}",
                other
            )))
        }
    };

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&samples)
        .and_then(|_| encoder.finish())
        .map(|data| PdfImage {
            width: info.width,
            height: info.height,
            gray,
            dct: false,
            data,
        })
        .map_err(|e| ComposeError::RasterError(format!("sample compression failed: {}", e)))
}
