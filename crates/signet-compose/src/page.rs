//! Low-level lopdf plumbing shared by the normalizers and the compositor:
//! building fresh documents, reading page geometry, appending content
//! streams, and managing page resources.

use crate::error::ComposeError;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

/// US Letter fallback when a page carries no resolvable MediaBox.
pub const DEFAULT_PAGE_SIZE: (f64, f64) = (612.0, 792.0);

/// Escape special characters for PDF string literals.
///
/// Latin-1 code points survive as octal escapes; the fonts registered
/// here declare WinAnsiEncoding, which agrees with Latin-1 over that
/// range. Anything further out of range becomes `?`.
pub fn escape_pdf_string(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '(' => "\\(".to_string(),
            ')' => "\\)".to_string(),
            '\\' => "\\\\".to_string(),
            _ if c.is_ascii() => c.to_string(),
            _ if (0xA0..=0xFF).contains(&(c as u32)) => format!("\\{:03o}", c as u32),
            _ => "?".to_string(),
        })
        .collect()
}

/// A decoded raster image ready to become a PDF image XObject.
///
/// `dct == true` means `data` is an intact JPEG stream (DCTDecode);
/// otherwise `data` holds zlib-compressed 8-bit samples (FlateDecode).
#[derive(Debug, Clone)]
pub struct PdfImage {
    pub width: u32,
    pub height: u32,
    pub gray: bool,
    pub dct: bool,
    pub data: Vec<u8>,
}

impl PdfImage {
    fn into_stream(self) -> Stream {
        let mut dict = Dictionary::new();
        dict.set("Type", Object::Name(b"XObject".to_vec()));
        dict.set("Subtype", Object::Name(b"Image".to_vec()));
        dict.set("Width", Object::Integer(self.width as i64));
        dict.set("Height", Object::Integer(self.height as i64));
        let cs: &[u8] = if self.gray { b"DeviceGray" } else { b"DeviceRGB" };
        dict.set("ColorSpace", Object::Name(cs.to_vec()));
        dict.set("BitsPerComponent", Object::Integer(8));
        let filter: &[u8] = if self.dct { b"DCTDecode" } else { b"FlateDecode" };
        dict.set("Filter", Object::Name(filter.to_vec()));
        Stream::new(dict, self.data)
    }
}

/// Register an image XObject in the document and return its id.
pub fn add_image_xobject(doc: &mut Document, image: PdfImage) -> ObjectId {
    doc.add_object(Object::Stream(image.into_stream()))
}

/// Builds a fresh PDF document page by page.
///
/// Every page gets an explicit MediaBox; text pages get a Type1 font
/// resource under `/F1`, image pages an XObject under `/Im1`.
pub struct PdfBuilder {
    doc: Document,
    pages_id: ObjectId,
    page_ids: Vec<Object>,
}

impl PdfBuilder {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            page_ids: Vec::new(),
        }
    }

    /// Add a page whose content is a raw operator string using `/F1` as
    /// its font resource.
    pub fn add_text_page(&mut self, width: f64, height: f64, base_font: &str, content: String) {
        let content_id = self.doc.add_object(Object::Stream(Stream::new(
            Dictionary::new(),
            content.into_bytes(),
        )));

        let mut f1 = Dictionary::new();
        f1.set("Type", Object::Name(b"Font".to_vec()));
        f1.set("Subtype", Object::Name(b"Type1".to_vec()));
        f1.set("BaseFont", Object::Name(base_font.as_bytes().to_vec()));
        f1.set("Encoding", Object::Name(b"WinAnsiEncoding".to_vec()));
        let mut fonts = Dictionary::new();
        fonts.set("F1", Object::Dictionary(f1));
        let mut resources = Dictionary::new();
        resources.set("Font", Object::Dictionary(fonts));

        self.push_page(width, height, content_id, resources);
    }

    /// Add a page that draws `image` stretched to the full page box.
    pub fn add_image_page(&mut self, width: f64, height: f64, image: PdfImage) {
        let xobject_id = add_image_xobject(&mut self.doc, image);

        let content = format!("q\n{w} 0 0 {h} 0 0 cm\n/Im1 Do\nQ", w = width, h = height);
        let content_id = self.doc.add_object(Object::Stream(Stream::new(
            Dictionary::new(),
            content.into_bytes(),
        )));

        let mut xobjects = Dictionary::new();
        xobjects.set("Im1", Object::Reference(xobject_id));
        let mut resources = Dictionary::new();
        resources.set("XObject", Object::Dictionary(xobjects));

        self.push_page(width, height, content_id, resources);
    }

    fn push_page(
        &mut self,
        width: f64,
        height: f64,
        content_id: ObjectId,
        resources: Dictionary,
    ) {
        let mut page = Dictionary::new();
        page.set("Type", Object::Name(b"Page".to_vec()));
        page.set("Parent", Object::Reference(self.pages_id));
        page.set("Contents", Object::Reference(content_id));
        page.set(
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(width as f32),
                Object::Real(height as f32),
            ]),
        );
        page.set("Resources", Object::Dictionary(resources));

        let page_id = self.doc.add_object(Object::Dictionary(page));
        self.page_ids.push(Object::Reference(page_id));
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Finalize the page tree and serialize.
    pub fn finish(mut self) -> Result<Vec<u8>, ComposeError> {
        let mut pages = Dictionary::new();
        pages.set("Type", Object::Name(b"Pages".to_vec()));
        pages.set("Count", Object::Integer(self.page_ids.len() as i64));
        pages.set("Kids", Object::Array(self.page_ids));
        self.doc
            .objects
            .insert(self.pages_id, Object::Dictionary(pages));

        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog.set("Pages", Object::Reference(self.pages_id));
        let catalog_id = self.doc.add_object(Object::Dictionary(catalog));
        self.doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut buffer = Vec::new();
        self.doc
            .save_to(&mut buffer)
            .map_err(|e| ComposeError::OperationError(format!("Failed to save PDF: {}", e)))?;
        Ok(buffer)
    }
}

impl Default for PdfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve<'a>(doc: &'a Document, mut obj: &'a Object) -> &'a Object {
    // Follow reference chains a bounded number of times.
    for _ in 0..8 {
        match obj {
            Object::Reference(id) => match doc.get_object(*id) {
                Ok(inner) => obj = inner,
                Err(_) => break,
            },
            _ => break,
        }
    }
    obj
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(v) => Some(*v as f64),
        Object::Real(v) => Some(*v as f64),
        _ => None,
    }
}

/// Width and height of a page in points, honoring MediaBox inheritance
/// through the Parent chain. Falls back to US Letter.
pub fn page_dimensions(doc: &Document, page_id: ObjectId) -> (f64, f64) {
    let mut current = page_id;
    for _ in 0..16 {
        let Ok(dict) = doc.get_object(current).and_then(|o| o.as_dict()) else {
            break;
        };
        if let Ok(mb) = dict.get(b"MediaBox") {
            if let Ok(arr) = resolve(doc, mb).as_array() {
                if arr.len() == 4 {
                    let vals: Vec<f64> = arr.iter().filter_map(number).collect();
                    if vals.len() == 4 {
                        return ((vals[2] - vals[0]).abs(), (vals[3] - vals[1]).abs());
                    }
                }
            }
        }
        match dict.get(b"Parent").and_then(|p| p.as_reference()) {
            Ok(parent) => current = parent,
            Err(_) => break,
        }
    }
    DEFAULT_PAGE_SIZE
}

/// Append a new content stream after the page's existing content.
///
/// Drawing is strictly additive: existing streams are left untouched and
/// the new stream is pushed onto the Contents array.
pub fn append_page_content(
    doc: &mut Document,
    page_id: ObjectId,
    operators: String,
) -> Result<(), ComposeError> {
    let stream_id = doc.add_object(Object::Stream(Stream::new(
        Dictionary::new(),
        operators.into_bytes(),
    )));

    let existing = doc
        .get_object(page_id)
        .and_then(|o| o.as_dict())
        .map_err(|e| ComposeError::OperationError(format!("Failed to get page: {}", e)))?
        .get(b"Contents")
        .ok()
        .cloned();

    let contents = match existing {
        Some(Object::Array(mut arr)) => {
            arr.push(Object::Reference(stream_id));
            Object::Array(arr)
        }
        Some(Object::Reference(id)) => {
            // Contents may reference an array object rather than a stream.
            match doc.get_object(id) {
                Ok(Object::Array(arr)) => {
                    let mut arr = arr.clone();
                    arr.push(Object::Reference(stream_id));
                    Object::Array(arr)
                }
                _ => Object::Array(vec![
                    Object::Reference(id),
                    Object::Reference(stream_id),
                ]),
            }
        }
        _ => Object::Array(vec![Object::Reference(stream_id)]),
    };

    let page = doc
        .get_object_mut(page_id)
        .map_err(|e| ComposeError::OperationError(format!("Failed to get page: {}", e)))?
        .as_dict_mut()
        .map_err(|_| ComposeError::OperationError("Page is not a dictionary".into()))?;
    page.set("Contents", contents);
    Ok(())
}

/// The page's effective Resources dictionary: its own if present,
/// otherwise the nearest inherited one, cloned for page-local mutation.
fn effective_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    let mut current = page_id;
    for _ in 0..16 {
        let Ok(dict) = doc.get_object(current).and_then(|o| o.as_dict()) else {
            break;
        };
        if let Ok(res) = dict.get(b"Resources") {
            if let Ok(res_dict) = resolve(doc, res).as_dict() {
                return res_dict.clone();
            }
        }
        match dict.get(b"Parent").and_then(|p| p.as_reference()) {
            Ok(parent) => current = parent,
            Err(_) => break,
        }
    }
    Dictionary::new()
}

fn sub_dictionary(doc: &Document, resources: &Dictionary, key: &[u8]) -> Dictionary {
    resources
        .get(key)
        .ok()
        .map(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_dict().ok())
        .cloned()
        .unwrap_or_default()
}

/// Ensure a Helvetica Type1 font resource named `font_name` is reachable
/// from the page. The effective resources are cloned onto the page so
/// inherited entries keep working for the original content.
pub fn ensure_font_resource(
    doc: &mut Document,
    page_id: ObjectId,
    font_name: &str,
) -> Result<(), ComposeError> {
    let mut resources = effective_resources(doc, page_id);
    let mut fonts = sub_dictionary(doc, &resources, b"Font");
    if fonts.get(font_name.as_bytes()).is_err() {
        let mut font = Dictionary::new();
        font.set("Type", Object::Name(b"Font".to_vec()));
        font.set("Subtype", Object::Name(b"Type1".to_vec()));
        font.set("BaseFont", Object::Name(b"Helvetica".to_vec()));
        font.set("Encoding", Object::Name(b"WinAnsiEncoding".to_vec()));
        fonts.set(font_name, Object::Dictionary(font));
    }
    resources.set("Font", Object::Dictionary(fonts));
    set_page_resources(doc, page_id, resources)
}

/// Ensure an image XObject resource named `res_name` pointing at
/// `xobject_id` is reachable from the page.
pub fn ensure_xobject_resource(
    doc: &mut Document,
    page_id: ObjectId,
    res_name: &str,
    xobject_id: ObjectId,
) -> Result<(), ComposeError> {
    let mut resources = effective_resources(doc, page_id);
    let mut xobjects = sub_dictionary(doc, &resources, b"XObject");
    xobjects.set(res_name, Object::Reference(xobject_id));
    resources.set("XObject", Object::Dictionary(xobjects));
    set_page_resources(doc, page_id, resources)
}

fn set_page_resources(
    doc: &mut Document,
    page_id: ObjectId,
    resources: Dictionary,
) -> Result<(), ComposeError> {
    let page = doc
        .get_object_mut(page_id)
        .map_err(|e| ComposeError::OperationError(format!("Failed to get page: {}", e)))?
        .as_dict_mut()
        .map_err(|_| ComposeError::OperationError("Page is not a dictionary".into()))?;
    page.set("Resources", Object::Dictionary(resources));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_produces_loadable_pdf_with_dimensions() {
        let mut builder = PdfBuilder::new();
        builder.add_text_page(
            595.0,
            842.0,
            "Helvetica",
            "BT /F1 12 Tf 50 700 Td (hello) Tj ET".to_string(),
        );
        builder.add_text_page(
            400.0,
            300.0,
            "Courier",
            "BT /F1 10 Tf 10 100 Td (second) Tj ET".to_string(),
        );
        let bytes = builder.finish().unwrap();
        assert!(bytes.starts_with(b"%PDF-"));

        let doc = Document::load_mem(&bytes).unwrap();
        let pages: Vec<_> = doc.get_pages().into_values().collect();
        assert_eq!(pages.len(), 2);
        let (w, h) = page_dimensions(&doc, pages[0]);
        assert!((w - 595.0).abs() < 0.01 && (h - 842.0).abs() < 0.01);
        let (w2, h2) = page_dimensions(&doc, pages[1]);
        assert!((w2 - 400.0).abs() < 0.01 && (h2 - 300.0).abs() < 0.01);
    }

    #[test]
    fn media_box_inherited_from_parent() {
        // Page without its own MediaBox inherits the Pages node's box.
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut page = Dictionary::new();
        page.set("Type", Object::Name(b"Page".to_vec()));
        page.set("Parent", Object::Reference(pages_id));
        let page_id = doc.add_object(Object::Dictionary(page));

        let mut pages = Dictionary::new();
        pages.set("Type", Object::Name(b"Pages".to_vec()));
        pages.set("Kids", Object::Array(vec![Object::Reference(page_id)]));
        pages.set("Count", Object::Integer(1));
        pages.set(
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(500),
                Object::Integer(700),
            ]),
        );
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let (w, h) = page_dimensions(&doc, page_id);
        assert_eq!((w, h), (500.0, 700.0));
    }

    #[test]
    fn missing_media_box_falls_back_to_letter() {
        let mut doc = Document::with_version("1.5");
        let page_id = doc.add_object(Object::Dictionary(Dictionary::new()));
        assert_eq!(page_dimensions(&doc, page_id), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn append_content_preserves_existing_stream() {
        let mut builder = PdfBuilder::new();
        builder.add_text_page(
            612.0,
            792.0,
            "Helvetica",
            "BT /F1 12 Tf 50 700 Td (original) Tj ET".to_string(),
        );
        let bytes = builder.finish().unwrap();
        let mut doc = Document::load_mem(&bytes).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();

        append_page_content(&mut doc, page_id, "q BT /F1 9 Tf 1 1 Td (added) Tj ET Q".into())
            .unwrap();

        let contents = doc
            .get_object(page_id)
            .unwrap()
            .as_dict()
            .unwrap()
            .get(b"Contents")
            .unwrap()
            .clone();
        match contents {
            Object::Array(arr) => assert_eq!(arr.len(), 2),
            other => panic!("expected Contents array, got {:?}", other),
        }
    }

    #[test]
    fn font_resource_added_without_clobbering_existing() {
        let mut builder = PdfBuilder::new();
        builder.add_text_page(612.0, 792.0, "Courier", "BT ET".to_string());
        let bytes = builder.finish().unwrap();
        let mut doc = Document::load_mem(&bytes).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();

        ensure_font_resource(&mut doc, page_id, "Fs1").unwrap();

        let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        let fonts = resources.get(b"Font").unwrap().as_dict().unwrap();
        assert!(fonts.get(b"F1").is_ok(), "existing font must survive");
        assert!(fonts.get(b"Fs1").is_ok(), "new font must be present");
    }

    #[test]
    fn escape_pdf_string_basic() {
        assert_eq!(escape_pdf_string("Hello"), "Hello");
        assert_eq!(escape_pdf_string("(test)"), "\\(test\\)");
        assert_eq!(escape_pdf_string("back\\slash"), "back\\\\slash");
    }

    #[test]
    fn escape_pdf_string_latin1_as_octal() {
        // é is U+00E9, octal 351, representable under WinAnsiEncoding.
        assert_eq!(escape_pdf_string("Émile"), "\\311mile");
        assert_eq!(escape_pdf_string("café"), "caf\\351");
        // Outside Latin-1 still degrades to ?.
        assert_eq!(escape_pdf_string("日本"), "??");
    }
}
