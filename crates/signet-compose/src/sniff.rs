//! Binary format detection for uploaded files.
//!
//! Classification is an ordered walk over magic-byte signatures, falling
//! through to an extension-based guess when no signature matches. Pure
//! function, no side effects.

/// Raster image sub-formats the engine knows about.
///
/// JPEG and PNG embed natively into PDF; the rest require transcoding
/// through the host's raster capability first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
    Bmp,
    Tiff,
}

impl ImageFormat {
    pub fn needs_transcode(self) -> bool {
        !matches!(self, ImageFormat::Jpeg | ImageFormat::Png)
    }

    pub fn name(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
            ImageFormat::Webp => "webp",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Tiff => "tiff",
        }
    }

    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "png" => Some(ImageFormat::Png),
            "gif" => Some(ImageFormat::Gif),
            "webp" => Some(ImageFormat::Webp),
            "bmp" => Some(ImageFormat::Bmp),
            "tif" | "tiff" => Some(ImageFormat::Tiff),
            _ => None,
        }
    }
}

/// Result of classifying a byte buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Image(ImageFormat),
    WordDoc,
    Unknown,
}

const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
const OLE2_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// Ordered image signature table, evaluated top to bottom.
/// WebP and TIFF need extra checks beyond a prefix and are handled below.
const IMAGE_SIGNATURES: &[(&[u8], ImageFormat)] = &[
    (&[0xFF, 0xD8], ImageFormat::Jpeg),
    (&PNG_MAGIC, ImageFormat::Png),
    (b"GIF87a", ImageFormat::Gif),
    (b"GIF89a", ImageFormat::Gif),
    (b"BM", ImageFormat::Bmp),
];

/// Classify a byte buffer, optionally assisted by its original filename.
pub fn classify(bytes: &[u8], filename: Option<&str>) -> FileKind {
    if bytes.starts_with(b"%PDF") {
        return FileKind::Pdf;
    }

    if let Some(format) = sniff_image(bytes) {
        return FileKind::Image(format);
    }

    if bytes.starts_with(&OLE2_MAGIC) {
        return FileKind::WordDoc;
    }
    if bytes.starts_with(&ZIP_MAGIC) && zip_looks_like_word_doc(bytes) {
        return FileKind::WordDoc;
    }

    // No signature matched; fall back to the filename extension.
    if let Some(format) = filename
        .and_then(|name| name.rsplit_once('.').map(|(_, ext)| ext.to_lowercase()))
        .and_then(|ext| ImageFormat::from_extension(&ext))
    {
        return FileKind::Image(format);
    }

    FileKind::Unknown
}

fn sniff_image(bytes: &[u8]) -> Option<ImageFormat> {
    for (magic, format) in IMAGE_SIGNATURES {
        if bytes.starts_with(magic) {
            return Some(*format);
        }
    }
    // RIFF container whose form type is WEBP
    if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
        return Some(ImageFormat::Webp);
    }
    // TIFF, little- or big-endian byte order mark
    if bytes.starts_with(&[0x49, 0x49, 0x2A, 0x00]) || bytes.starts_with(&[0x4D, 0x4D, 0x00, 0x2A])
    {
        return Some(ImageFormat::Tiff);
    }
    None
}

/// Heuristic DOCX detection: a ZIP whose leading bytes mention the Word
/// package layout. Not a full central-directory parse.
fn zip_looks_like_word_doc(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(1000)];
    contains(window, b"word/") || contains(window, b"[Content_Types].xml")
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack
        .windows(needle.len())
        .any(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_pdf() {
        assert_eq!(classify(b"%PDF-1.7 rest", None), FileKind::Pdf);
    }

    #[test]
    fn classifies_jpeg_and_png() {
        assert_eq!(
            classify(&[0xFF, 0xD8, 0xFF, 0xE0], None),
            FileKind::Image(ImageFormat::Jpeg)
        );
        let mut png = PNG_MAGIC.to_vec();
        png.extend_from_slice(&[0, 0, 0, 13]);
        assert_eq!(classify(&png, None), FileKind::Image(ImageFormat::Png));
    }

    #[test]
    fn classifies_gif_webp_bmp_tiff() {
        assert_eq!(classify(b"GIF89a....", None), FileKind::Image(ImageFormat::Gif));
        let mut webp = b"RIFF".to_vec();
        webp.extend_from_slice(&[0x10, 0, 0, 0]);
        webp.extend_from_slice(b"WEBPVP8 ");
        assert_eq!(classify(&webp, None), FileKind::Image(ImageFormat::Webp));
        assert_eq!(classify(b"BM\x00\x00", None), FileKind::Image(ImageFormat::Bmp));
        assert_eq!(
            classify(&[0x49, 0x49, 0x2A, 0x00], None),
            FileKind::Image(ImageFormat::Tiff)
        );
        assert_eq!(
            classify(&[0x4D, 0x4D, 0x00, 0x2A], None),
            FileKind::Image(ImageFormat::Tiff)
        );
    }

    #[test]
    fn classifies_legacy_doc_via_ole2() {
        let mut doc = OLE2_MAGIC.to_vec();
        doc.extend_from_slice(&[0u8; 32]);
        assert_eq!(classify(&doc, None), FileKind::WordDoc);
    }

    #[test]
    fn classifies_docx_via_zip_heuristic() {
        let mut docx = ZIP_MAGIC.to_vec();
        docx.extend_from_slice(&[0u8; 26]);
        docx.extend_from_slice(b"[Content_Types].xml");
        assert_eq!(classify(&docx, None), FileKind::WordDoc);

        let mut docx2 = ZIP_MAGIC.to_vec();
        docx2.extend_from_slice(&[0u8; 26]);
        docx2.extend_from_slice(b"word/document.xml");
        assert_eq!(classify(&docx2, None), FileKind::WordDoc);
    }

    #[test]
    fn plain_zip_is_unknown() {
        let mut zip = ZIP_MAGIC.to_vec();
        zip.extend_from_slice(&[0u8; 26]);
        zip.extend_from_slice(b"some/other/file.txt");
        assert_eq!(classify(&zip, None), FileKind::Unknown);
    }

    #[test]
    fn extension_fallback_when_magic_unrecognized() {
        assert_eq!(
            classify(b"not a known magic", Some("scan.JPG")),
            FileKind::Image(ImageFormat::Jpeg)
        );
        assert_eq!(
            classify(b"not a known magic", Some("photo.png")),
            FileKind::Image(ImageFormat::Png)
        );
        assert_eq!(
            classify(b"not a known magic", Some("page.tiff")),
            FileKind::Image(ImageFormat::Tiff)
        );
    }

    #[test]
    fn unknown_without_signature_or_extension() {
        assert_eq!(classify(b"garbage bytes", None), FileKind::Unknown);
        assert_eq!(classify(b"garbage bytes", Some("notes.txt")), FileKind::Unknown);
        assert_eq!(classify(&[], None), FileKind::Unknown);
    }

    #[test]
    fn only_jpeg_and_png_embed_natively() {
        assert!(!ImageFormat::Jpeg.needs_transcode());
        assert!(!ImageFormat::Png.needs_transcode());
        for format in [
            ImageFormat::Gif,
            ImageFormat::Webp,
            ImageFormat::Bmp,
            ImageFormat::Tiff,
        ] {
            assert!(format.needs_transcode(), "{} must transcode", format.name());
        }
    }

    #[test]
    fn magic_wins_over_extension() {
        // A real PDF misnamed as .png is still a PDF.
        assert_eq!(classify(b"%PDF-1.4", Some("x.png")), FileKind::Pdf);
    }
}
