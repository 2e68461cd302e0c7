//! Coordinate resolution: a field's stored position (top-left origin,
//! percentage or legacy pixel form) becomes a box in the target page's
//! bottom-left-origin point space.

use signet_types::FieldPosition;

use crate::error::ComposeError;

/// A resolved field box in PDF points, bottom-left origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Resolve a field position against a page of `page_width` x
/// `page_height` points.
///
/// Out-of-bounds boxes are clamped, never rejected; only degenerate
/// coordinate data (non-finite values, non-positive authoring
/// dimensions) fails.
pub fn resolve_box(
    position: &FieldPosition,
    page_width: f64,
    page_height: f64,
) -> Result<ResolvedBox, ComposeError> {
    let raw = match *position {
        FieldPosition::Percent {
            left_percent,
            top_percent,
            width_percent,
            height_percent,
        } => {
            ensure_finite(&[left_percent, top_percent, width_percent, height_percent])?;
            let width = width_percent / 100.0 * page_width;
            let height = height_percent / 100.0 * page_height;
            let x = left_percent / 100.0 * page_width;
            let top_y = top_percent / 100.0 * page_height;
            ResolvedBox {
                x,
                // Flip top-left to bottom-left origin.
                y: page_height - top_y - height,
                width,
                height,
            }
        }
        FieldPosition::Pixels {
            x,
            y,
            width,
            height,
            original_width,
            original_height,
        } => {
            ensure_finite(&[x, y, width, height])?;
            // Absent authoring dimensions default to the page's own,
            // which disables scaling. Known hazard for fields authored
            // against a different-sized original; preserved for
            // compatibility with existing stored fields.
            let original_width = original_width.unwrap_or(page_width);
            let original_height = original_height.unwrap_or(page_height);
            if !(original_width > 0.0) || !(original_height > 0.0) {
                return Err(ComposeError::NoValidCoordinates(
                    "non-positive original page dimensions".into(),
                ));
            }
            let scale_x = page_width / original_width;
            let scale_y = page_height / original_height;
            ResolvedBox {
                x: x * scale_x,
                y: page_height - y * scale_y - height * scale_y,
                width: width * scale_x,
                height: height * scale_y,
            }
        }
    };

    Ok(clamp_box(raw, page_width, page_height))
}

fn ensure_finite(values: &[f64]) -> Result<(), ComposeError> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(ComposeError::NoValidCoordinates(
            "non-finite coordinate value".into(),
        ))
    }
}

/// Clamp the origin into the page, then shrink the box so it fits
/// entirely. Boxes already in bounds come back unchanged.
fn clamp_box(b: ResolvedBox, page_width: f64, page_height: f64) -> ResolvedBox {
    let x = b.x.clamp(0.0, page_width);
    let y = b.y.clamp(0.0, page_height);
    ResolvedBox {
        x,
        y,
        width: b.width.max(0.0).min(page_width - x),
        height: b.height.max(0.0).min(page_height - y),
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn dimension() -> impl Strategy<Value = f64> {
        100.0f64..2000.0
    }

    fn pct() -> impl Strategy<Value = f64> {
        0.0f64..=100.0
    }

    proptest! {
        /// Percentage semantics round-trip: left edge, right edge, and
        /// top edge all land where the top-left-origin authoring put them.
        #[test]
        fn percent_round_trip(
            page_w in dimension(),
            page_h in dimension(),
            left in pct(),
            top in pct(),
            width in pct(),
            height in pct(),
        ) {
            let position = FieldPosition::Percent {
                left_percent: left,
                top_percent: top,
                width_percent: width,
                height_percent: height,
            };
            let b = resolve_box(&position, page_w, page_h).unwrap();

            let tolerance = 1e-6 * page_w.max(page_h);
            // When the authored box already fits, nothing moves.
            if left + width <= 100.0 && top + height <= 100.0 {
                prop_assert!((b.x - left / 100.0 * page_w).abs() < tolerance);
                prop_assert!((b.x + b.width - (left + width) / 100.0 * page_w).abs() < tolerance);
                let top_edge = page_h - b.y - b.height;
                prop_assert!((top_edge - top / 100.0 * page_h).abs() < tolerance);
            }
        }

        /// The resolved box always lies entirely within the page.
        #[test]
        fn resolved_box_always_in_bounds(
            page_w in dimension(),
            page_h in dimension(),
            x in -3000.0f64..3000.0,
            y in -3000.0f64..3000.0,
            width in 0.0f64..3000.0,
            height in 0.0f64..3000.0,
        ) {
            let position = FieldPosition::Pixels {
                x,
                y,
                width,
                height,
                original_width: None,
                original_height: None,
            };
            let b = resolve_box(&position, page_w, page_h).unwrap();
            prop_assert!(b.x >= 0.0 && b.y >= 0.0);
            prop_assert!(b.width >= 0.0 && b.height >= 0.0);
            prop_assert!(b.x + b.width <= page_w + 1e-9);
            prop_assert!(b.y + b.height <= page_h + 1e-9);
        }

        /// Clamping is idempotent.
        #[test]
        fn clamping_idempotent(
            page_w in dimension(),
            page_h in dimension(),
            left in pct(),
            top in pct(),
            width in pct(),
            height in pct(),
        ) {
            let position = FieldPosition::Percent {
                left_percent: left,
                top_percent: top,
                width_percent: width,
                height_percent: height,
            };
            let once = resolve_box(&position, page_w, page_h).unwrap();
            let twice = clamp_box(once, page_w, page_h);
            prop_assert!((once.x - twice.x).abs() < 1e-9);
            prop_assert!((once.y - twice.y).abs() < 1e-9);
            prop_assert!((once.width - twice.width).abs() < 1e-9);
            prop_assert!((once.height - twice.height).abs() < 1e-9);
        }
    }
}
