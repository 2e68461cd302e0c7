//! Signet PDF composition engine.
//!
//! Takes a document's source files (mixed formats), its positioned form
//! fields, and each signer's submitted values, and produces one merged,
//! flattened PDF with every value drawn permanently into the page
//! content. The engine is a library: byte storage, delivery, and HTTP
//! concerns belong to the host, which supplies the two capabilities
//! below.
//!
//! Pipeline: raw bytes -> classified -> normalized to PDF -> merged ->
//! field-composited -> finalized. Each run owns its own mutable
//! document; nothing is shared across runs.

pub mod composite;
pub mod convert;
pub mod coords;
pub mod error;
pub mod image;
pub mod merge;
pub mod orchestrate;
pub mod page;
pub mod sniff;

pub use composite::apply_signer_values;
pub use convert::doc_to_pdf;
pub use coords::{resolve_box, ResolvedBox};
pub use error::ComposeError;
pub use image::image_to_pdf;
pub use merge::{merge_files, MergedDocument, PageMap};
pub use orchestrate::Composer;
pub use sniff::{classify, FileKind, ImageFormat};

/// Resolves a `SourceFile`'s opaque storage reference to raw bytes.
pub trait FetchBytes {
    fn fetch(&self, storage_ref: &str) -> Result<Vec<u8>, ComposeError>;
}

/// Optional host raster capability.
///
/// Covers the two operations the engine cannot do natively: transcoding
/// non-embeddable image formats to PNG, and rasterizing HTML to a PNG
/// page image. When absent, the engine degrades per tier instead of
/// failing the run.
pub trait Rasterizer {
    fn transcode_to_png(
        &self,
        bytes: &[u8],
        format: ImageFormat,
    ) -> Result<Vec<u8>, ComposeError>;

    fn render_html_to_png(
        &self,
        html: &str,
        width_px: u32,
        height_px: u32,
    ) -> Result<Vec<u8>, ComposeError>;
}
