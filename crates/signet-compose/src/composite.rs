//! Field compositing: draws one signer's submitted values into the
//! merged document's page content.
//!
//! Drawing is strictly additive. Every failure below the run level is a
//! logged skip: a field whose page was dropped during merge, whose
//! coordinates are degenerate, or whose signature image will not decode
//! never aborts the composition.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use lopdf::{Document, ObjectId};
use signet_types::{Field, FieldKind, FieldValue, Signer, SourceFile};
use tracing::{debug, warn};

use crate::coords::{resolve_box, ResolvedBox};
use crate::error::ComposeError;
use crate::image::decode_image;
use crate::merge::MergedDocument;
use crate::page::{
    add_image_xobject, append_page_content, ensure_font_resource, ensure_xobject_resource,
    escape_pdf_string, page_dimensions,
};
use crate::sniff::ImageFormat;

/// Font resource name used by all composited text. Registered
/// page-locally, so it cannot collide with inherited resources.
const FONT_RES: &str = "Fs1";

/// Draw all of `signer`'s field values into the merged document.
///
/// Fields are walked in file order; each draw is independent, so one bad
/// field never blocks the rest.
pub fn apply_signer_values(merged: &mut MergedDocument, files: &[SourceFile], signer: &Signer) {
    for (file_index, file) in files.iter().enumerate() {
        for field in &file.fields {
            let Some(value) = signer.field_values.get(&field.id) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            compose_field(merged, file_index, field, value);
        }
    }
}

fn compose_field(merged: &mut MergedDocument, file_index: usize, field: &Field, value: &FieldValue) {
    let Some(page_id) = merged.page_object_id(file_index, field.page_number) else {
        warn!(
            field_id = %field.id,
            file_index,
            page = field.page_number,
            "field page not present in merged document, skipping"
        );
        return;
    };
    let (page_w, page_h) = page_dimensions(&merged.doc, page_id);
    let bbox = match resolve_box(&field.position, page_w, page_h) {
        Ok(b) => b,
        Err(e) => {
            warn!(field_id = %field.id, error = %e, "unresolvable field coordinates, skipping");
            return;
        }
    };

    let result = match field.kind {
        FieldKind::Checkbox => {
            if value.is_truthy() {
                draw_checkbox(&mut merged.doc, page_id, &bbox)
            } else {
                Ok(())
            }
        }
        FieldKind::Signature | FieldKind::Initial => {
            draw_signature(&mut merged.doc, page_id, &bbox, field.kind, value)
        }
        _ => draw_text(
            &mut merged.doc,
            page_id,
            &bbox,
            value.as_text().unwrap_or_default(),
        ),
    };

    match result {
        Ok(()) => debug!(field_id = %field.id, kind = ?field.kind, "drew field value"),
        Err(e) => warn!(field_id = %field.id, error = %e, "failed to draw field, skipping"),
    }
}

/// Single-line text at the vertical center of the box, 2pt left inset,
/// truncated to the box width.
fn draw_text(
    doc: &mut Document,
    page_id: ObjectId,
    bbox: &ResolvedBox,
    text: &str,
) -> Result<(), ComposeError> {
    if text.is_empty() {
        return Ok(());
    }
    ensure_font_resource(doc, page_id, FONT_RES)?;

    let font_size = (bbox.height * 0.6).clamp(8.0, 14.0);
    // Helvetica averages about half an em per glyph.
    let max_chars = (((bbox.width - 4.0) / (font_size * 0.5)).floor() as usize).max(1);
    let shown: String = text.chars().take(max_chars).collect();

    let x = bbox.x + 2.0;
    let y = bbox.y + (bbox.height - font_size) / 2.0;
    let ops = format!(
        "q\nBT\n/{font} {fs:.2} Tf\n0 0 0 rg\n{x:.2} {y:.2} Td\n({text}) Tj\nET\nQ",
        font = FONT_RES,
        fs = font_size,
        x = x,
        y = y,
        text = escape_pdf_string(&shown),
    );
    append_page_content(doc, page_id, ops)
}

/// A centered "X" mark sized to 80% of the box's smaller dimension.
/// WinAnsi-safe; no symbol fonts involved.
fn draw_checkbox(
    doc: &mut Document,
    page_id: ObjectId,
    bbox: &ResolvedBox,
) -> Result<(), ComposeError> {
    ensure_font_resource(doc, page_id, FONT_RES)?;

    let mark = 0.8 * bbox.width.min(bbox.height);
    let font_size = mark.max(4.0);
    // Helvetica "X": advance 0.667em, cap height 0.717em.
    let x = bbox.x + (bbox.width - font_size * 0.667) / 2.0;
    let y = bbox.y + (bbox.height - font_size * 0.717) / 2.0;
    let ops = format!(
        "q\nBT\n/{font} {fs:.2} Tf\n0 0 0 rg\n{x:.2} {y:.2} Td\n(X) Tj\nET\nQ",
        font = FONT_RES,
        fs = font_size,
        x = x,
        y = y,
    );
    append_page_content(doc, page_id, ops)
}

/// A signature or initial value: a data-URI image stretched to fill the
/// box, or plain text drawn like a text field. Image failures fall back
/// to a literal "Signed"/"Initialed" marker.
fn draw_signature(
    doc: &mut Document,
    page_id: ObjectId,
    bbox: &ResolvedBox,
    kind: FieldKind,
    value: &FieldValue,
) -> Result<(), ComposeError> {
    let text = value.as_text().unwrap_or_default();
    if let Some((format, payload)) = parse_data_uri(text) {
        match draw_image(doc, page_id, bbox, format, payload) {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(error = %e, "signature image failed to embed, falling back to text");
            }
        }
        let fallback = if kind == FieldKind::Initial {
            "Initialed"
        } else {
            "Signed"
        };
        return draw_text(doc, page_id, bbox, fallback);
    }
    draw_text(doc, page_id, bbox, text)
}

fn draw_image(
    doc: &mut Document,
    page_id: ObjectId,
    bbox: &ResolvedBox,
    format: ImageFormat,
    payload: &str,
) -> Result<(), ComposeError> {
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| ComposeError::RasterError(format!("invalid base64 payload: {}", e)))?;
    let image = decode_image(&bytes, format, None)?;
    let xobject_id = add_image_xobject(doc, image);

    // Name the resource after its object number, which is unique for
    // the whole document. A per-pass counter would collide across
    // signers drawing on the same page.
    let res_name = format!("Sg{}", xobject_id.0);
    ensure_xobject_resource(doc, page_id, &res_name, xobject_id)?;

    let ops = format!(
        "q\n{w:.2} 0 0 {h:.2} {x:.2} {y:.2} cm\n/{name} Do\nQ",
        w = bbox.width,
        h = bbox.height,
        x = bbox.x,
        y = bbox.y,
        name = res_name,
    );
    append_page_content(doc, page_id, ops)
}

/// Split a `data:image/...;base64,` URI into its format and payload.
/// Returns `None` for plain-text values and unrecognized image types.
fn parse_data_uri(value: &str) -> Option<(ImageFormat, &str)> {
    let rest = value.strip_prefix("data:image/")?;
    let (mime, payload) = rest.split_once(";base64,")?;
    let format = match mime {
        "png" => ImageFormat::Png,
        "jpeg" | "jpg" => ImageFormat::Jpeg,
        _ => return None,
    };
    Some((format, payload))
}
