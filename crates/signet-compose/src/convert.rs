//! Word-processor document conversion with graduated fallback.
//!
//! Tier 1 renders extracted HTML through the host raster capability and
//! embeds the resulting page image. Tier 2 lays extracted plain text out
//! onto generated A4 pages in a fixed-width font. Tier 3 emits a
//! single diagnostic page carrying whatever text was salvaged; it is the
//! terminal fallback and does not depend on any extraction succeeding.

use std::io::Read;

use flate2::read::DeflateDecoder;
use tracing::warn;

use crate::error::ComposeError;
use crate::image;
use crate::page::{escape_pdf_string, PdfBuilder};
use crate::sniff::ImageFormat;
use crate::Rasterizer;

/// A4 at 96dpi, the fixed viewport for the HTML render tier.
const RENDER_WIDTH_PX: u32 = 794;
const RENDER_HEIGHT_PX: u32 = 1123;

/// A4 in points for the text-layout tier.
const LAYOUT_PAGE: (f64, f64) = (595.0, 842.0);
const LAYOUT_MARGIN: f64 = 50.0;
const LAYOUT_LINE_HEIGHT: f64 = 14.0;
const LAYOUT_FONT_SIZE: f64 = 10.0;
// Courier advances 0.6em per glyph.
const LAYOUT_WRAP_COLUMNS: usize = ((LAYOUT_PAGE.0 - 2.0 * LAYOUT_MARGIN)
    / (LAYOUT_FONT_SIZE * 0.6)) as usize;

const DIAGNOSTIC_MAX_LINES: usize = 15;
const DIAGNOSTIC_MAX_COLUMNS: usize = 80;

/// Convert a word-processor document to PDF.
///
/// Each tier is attempted only when the previous one fails; the
/// diagnostic tier always produces a page, so the only remaining failure
/// mode is PDF serialization itself.
pub fn doc_to_pdf(
    bytes: &[u8],
    rasterizer: Option<&dyn Rasterizer>,
) -> Result<Vec<u8>, ComposeError> {
    let extracted = extract_text(bytes);

    if let Ok(text) = &extracted {
        if let Some(rasterizer) = rasterizer {
            match render_tier(text, rasterizer) {
                Ok(pdf) => return Ok(pdf),
                Err(e) => warn!(error = %e, "HTML render tier failed, trying text layout"),
            }
        }
        match text_layout_tier(text) {
            Ok(pdf) => return Ok(pdf),
            Err(e) => warn!(error = %e, "text layout tier failed, emitting diagnostic page"),
        }
    } else if let Err(e) = &extracted {
        warn!(error = %e, "document text extraction failed, emitting diagnostic page");
    }

    diagnostic_tier(extracted.ok().as_deref())
}

/// Extract plain text from the document bytes.
///
/// DOCX is the only structured format handled natively; legacy OLE2
/// documents fail here and land on the diagnostic tier.
pub fn extract_text(bytes: &[u8]) -> Result<String, ComposeError> {
    let xml = docx_entry(bytes, b"word/document.xml")?;
    docx_xml_to_text(&xml)
}

/// Tier 1: extracted text as minimal HTML, rasterized at a fixed A4
/// viewport, then embedded through the image normalizer.
fn render_tier(text: &str, rasterizer: &dyn Rasterizer) -> Result<Vec<u8>, ComposeError> {
    let html = text_to_html(text);
    let png = rasterizer.render_html_to_png(&html, RENDER_WIDTH_PX, RENDER_HEIGHT_PX)?;
    image::image_to_pdf(&png, ImageFormat::Png, None)
}

fn text_to_html(text: &str) -> String {
    let mut body = String::new();
    for paragraph in text.lines() {
        body.push_str("<p>");
        for c in paragraph.chars() {
            match c {
                '&' => body.push_str("&amp;"),
                '<' => body.push_str("&lt;"),
                '>' => body.push_str("&gt;"),
                _ => body.push(c),
            }
        }
        body.push_str("</p>\n");
    }
    format!(
        "<!DOCTYPE html><html><body style=\"width:{}px;height:{}px;margin:0;\
         padding:40px;box-sizing:border-box;font-family:serif;font-size:14px;\
         background:#fff;\">\n{}</body></html>",
        RENDER_WIDTH_PX, RENDER_HEIGHT_PX, body
    )
}

/// Tier 2: manual pagination in Courier onto A4 pages.
fn text_layout_tier(text: &str) -> Result<Vec<u8>, ComposeError> {
    let (page_w, page_h) = LAYOUT_PAGE;
    let mut builder = PdfBuilder::new();
    let mut content = String::new();
    let mut y = page_h - LAYOUT_MARGIN - LAYOUT_LINE_HEIGHT;

    for line in wrap_lines(text, LAYOUT_WRAP_COLUMNS) {
        if y < LAYOUT_MARGIN {
            builder.add_text_page(page_w, page_h, "Courier", std::mem::take(&mut content));
            y = page_h - LAYOUT_MARGIN - LAYOUT_LINE_HEIGHT;
        }
        content.push_str(&format!(
            "BT /F1 {fs} Tf {x} {y} Td ({text}) Tj ET\n",
            fs = LAYOUT_FONT_SIZE,
            x = LAYOUT_MARGIN,
            y = y,
            text = escape_pdf_string(&line),
        ));
        y -= LAYOUT_LINE_HEIGHT;
    }

    // Empty documents still produce one blank page.
    builder.add_text_page(page_w, page_h, "Courier", content);
    builder.finish()
}

/// Tier 3: a single page stating conversion failed, with a best-effort
/// excerpt of any salvaged text.
fn diagnostic_tier(salvaged: Option<&str>) -> Result<Vec<u8>, ComposeError> {
    let (page_w, page_h) = LAYOUT_PAGE;
    let mut content = format!(
        "BT /F1 12 Tf {x} {y} Td (This document could not be converted for signing.) Tj ET\n",
        x = LAYOUT_MARGIN,
        y = page_h - LAYOUT_MARGIN - LAYOUT_LINE_HEIGHT,
    );

    if let Some(text) = salvaged {
        let mut y = page_h - LAYOUT_MARGIN - 3.0 * LAYOUT_LINE_HEIGHT;
        for line in wrap_lines(text, DIAGNOSTIC_MAX_COLUMNS)
            .into_iter()
            .take(DIAGNOSTIC_MAX_LINES)
        {
            content.push_str(&format!(
                "BT /F1 {fs} Tf {x} {y} Td ({text}) Tj ET\n",
                fs = LAYOUT_FONT_SIZE,
                x = LAYOUT_MARGIN,
                y = y,
                text = escape_pdf_string(&line),
            ));
            y -= LAYOUT_LINE_HEIGHT;
        }
    }

    let mut builder = PdfBuilder::new();
    builder.add_text_page(page_w, page_h, "Courier", content);
    builder.finish()
}

/// Split text into lines no wider than `columns`, breaking on
/// whitespace where possible.
fn wrap_lines(text: &str, columns: usize) -> Vec<String> {
    let mut out = Vec::new();
    for raw in text.lines() {
        if raw.is_empty() {
            out.push(String::new());
            continue;
        }
        let mut current = String::new();
        for word in raw.split_whitespace() {
            if current.is_empty() {
                current.push_str(word);
            } else if current.chars().count() + 1 + word.chars().count() <= columns {
                current.push(' ');
                current.push_str(word);
            } else {
                out.push(std::mem::take(&mut current));
                current.push_str(word);
            }
            // Hard-break words longer than a whole line.
            while current.chars().count() > columns {
                let head: String = current.chars().take(columns).collect();
                current = current.chars().skip(columns).collect();
                out.push(head);
            }
        }
        out.push(current);
    }
    out
}

/// Locate and inflate one entry from a ZIP archive by walking local file
/// headers. Not a full central-directory parse; enough for the DOCX
/// packages word processors emit.
fn docx_entry(bytes: &[u8], entry_name: &[u8]) -> Result<Vec<u8>, ComposeError> {
    let mut i = 0usize;
    while i + 30 <= bytes.len() {
        if &bytes[i..i + 4] != b"PK\x03\x04" {
            break;
        }
        let flags = u16::from_le_bytes([bytes[i + 6], bytes[i + 7]]);
        let method = u16::from_le_bytes([bytes[i + 8], bytes[i + 9]]);
        let comp_size = u32::from_le_bytes([
            bytes[i + 18],
            bytes[i + 19],
            bytes[i + 20],
            bytes[i + 21],
        ]) as usize;
        let name_len =
            u16::from_le_bytes([bytes[i + 26], bytes[i + 27]]) as usize;
        let extra_len =
            u16::from_le_bytes([bytes[i + 28], bytes[i + 29]]) as usize;

        let name_start = i + 30;
        let data_start = name_start + name_len + extra_len;
        if data_start > bytes.len() {
            break;
        }
        // Streamed entries defer sizes to a trailing descriptor, which a
        // header-only walk cannot skip past.
        if flags & 0x0008 != 0 {
            return Err(ComposeError::ParseError(
                "ZIP entry uses a data descriptor".into(),
            ));
        }
        let data_end = data_start + comp_size;
        if data_end > bytes.len() {
            break;
        }

        if &bytes[name_start..name_start + name_len] == entry_name {
            let data = &bytes[data_start..data_end];
            return match method {
                0 => Ok(data.to_vec()),
                8 => {
                    let mut out = Vec::new();
                    DeflateDecoder::new(data).read_to_end(&mut out).map_err(|e| {
                        ComposeError::ParseError(format!("ZIP inflate failed: {}", e))
                    })?;
                    Ok(out)
                }
                other => Err(ComposeError::ParseError(format!(
                    "unsupported ZIP compression method {}",
                    other
                ))),
            };
        }
        i = data_end;
    }
    Err(ComposeError::ParseError(format!(
        "ZIP entry {} not found",
        String::from_utf8_lossy(entry_name)
    )))
}

/// Flatten WordprocessingML to plain text: one line per paragraph,
/// explicit breaks honored, everything else dropped.
fn docx_xml_to_text(xml: &[u8]) -> Result<String, ComposeError> {
    let xml = std::str::from_utf8(xml)
        .map_err(|e| ComposeError::ParseError(format!("document.xml is not UTF-8: {}", e)))?;
    let tree = roxmltree::Document::parse(xml)
        .map_err(|e| ComposeError::ParseError(format!("document.xml parse failed: {}", e)))?;

    let mut out = String::new();
    for node in tree.descendants() {
        match node.tag_name().name() {
            "p" => {
                if !out.is_empty() {
                    out.push('\n');
                }
            }
            "br" => out.push('\n'),
            "t" => {
                if let Some(text) = node.text() {
                    out.push_str(text);
                }
            }
            _ => {}
        }
    }
    Ok(out)
}
