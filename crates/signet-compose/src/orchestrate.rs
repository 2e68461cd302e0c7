//! Completion orchestration: the top-level entry point that turns a
//! document's source files and its signed signers into one final PDF.

use chrono::{DateTime, Utc};
use lopdf::{Dictionary, Document, Object};
use signet_types::{ComposedDocument, DocumentSpec, Signer};
use tracing::{info, warn};

use crate::composite::apply_signer_values;
use crate::convert::doc_to_pdf;
use crate::error::ComposeError;
use crate::image::image_to_pdf;
use crate::merge::merge_files;
use crate::sniff::{classify, FileKind};
use crate::{FetchBytes, Rasterizer};

const PRODUCT_NAME: &str = "Signet";
const PRODUCER_NAME: &str = "Signet Composition Engine";

/// Drives a full composition run against host-provided capabilities.
///
/// The byte fetcher is mandatory; the raster capability is optional and
/// its absence only narrows which formats convert cleanly.
pub struct Composer<'a> {
    fetcher: &'a dyn FetchBytes,
    rasterizer: Option<&'a dyn Rasterizer>,
}

impl<'a> Composer<'a> {
    pub fn new(fetcher: &'a dyn FetchBytes) -> Self {
        Self {
            fetcher,
            rasterizer: None,
        }
    }

    pub fn with_rasterizer(mut self, rasterizer: &'a dyn Rasterizer) -> Self {
        self.rasterizer = Some(rasterizer);
        self
    }

    /// Compose the final signed PDF for a completed document.
    ///
    /// Fails with [`ComposeError::NoSignedData`] when no signer has
    /// signed and [`ComposeError::NoPagesProduced`] when no source file
    /// yields a single page; every lesser failure is logged and skipped.
    pub fn compose_signed_document(
        &self,
        document: &DocumentSpec,
        signers: &[Signer],
    ) -> Result<ComposedDocument, ComposeError> {
        let signed: Vec<&Signer> = signers.iter().filter(|s| s.signed).collect();
        if signed.is_empty() {
            return Err(ComposeError::NoSignedData);
        }

        // Fetch and normalize in file order; indices are preserved so
        // skipped files leave their fields unresolvable rather than
        // shifting later files' pages.
        let mut normalized: Vec<(usize, Vec<u8>)> = Vec::with_capacity(document.files.len());
        for (file_index, file) in document.files.iter().enumerate() {
            let bytes = match self.fetcher.fetch(&file.storage_ref) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(
                        file_id = %file.file_id,
                        error = %e,
                        "failed to fetch file bytes, skipping"
                    );
                    continue;
                }
            };
            match self.normalize(&bytes, &file.original_name) {
                Ok(pdf) => normalized.push((file_index, pdf)),
                Err(e) => {
                    warn!(
                        file_id = %file.file_id,
                        error = %e,
                        "failed to normalize file to PDF, skipping"
                    );
                }
            }
        }

        let mut merged = merge_files(normalized)?;

        for signer in &signed {
            apply_signer_values(&mut merged, &document.files, signer);
        }

        let title = self.title_for(document);
        stamp_metadata(&mut merged.doc, &title, Utc::now());

        let bytes = merged.into_bytes()?;
        info!(
            document_id = %document.id,
            signers = signed.len(),
            size = bytes.len(),
            "composed signed document"
        );
        Ok(ComposedDocument {
            bytes,
            filename: format!("{}-signed.pdf", title),
        })
    }

    /// Classify and convert one file's bytes to PDF.
    fn normalize(&self, bytes: &[u8], filename: &str) -> Result<Vec<u8>, ComposeError> {
        match classify(bytes, Some(filename)) {
            FileKind::Pdf => Ok(bytes.to_vec()),
            FileKind::Image(format) => image_to_pdf(bytes, format, self.rasterizer),
            FileKind::WordDoc => doc_to_pdf(bytes, self.rasterizer),
            FileKind::Unknown => Err(ComposeError::UnsupportedFormat(format!(
                "unrecognized file format for {}",
                filename
            ))),
        }
    }

    /// Document title, falling back to the first file's name stem.
    fn title_for(&self, document: &DocumentSpec) -> String {
        if let Some(title) = document.title.as_deref() {
            let title = title.trim();
            if !title.is_empty() {
                return title.to_string();
            }
        }
        document
            .files
            .first()
            .map(|f| {
                f.original_name
                    .rsplit_once('.')
                    .map(|(stem, _)| stem)
                    .unwrap_or(&f.original_name)
                    .to_string()
            })
            .unwrap_or_else(|| "document".to_string())
    }
}

/// Write the Info dictionary: title, product names, and timestamps.
fn stamp_metadata(doc: &mut Document, title: &str, now: DateTime<Utc>) {
    let date = now.format("D:%Y%m%d%H%M%SZ").to_string();
    let mut info = Dictionary::new();
    info.set("Title", Object::string_literal(title));
    info.set("Creator", Object::string_literal(PRODUCT_NAME));
    info.set("Producer", Object::string_literal(PRODUCER_NAME));
    info.set("CreationDate", Object::string_literal(date.clone()));
    info.set("ModDate", Object::string_literal(date));
    let info_id = doc.add_object(Object::Dictionary(info));
    doc.trailer.set("Info", Object::Reference(info_id));
}
