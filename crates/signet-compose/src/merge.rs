//! Page merging: normalized per-file PDFs become one in-memory document
//! plus a page map recording where every source page landed.
//!
//! The algorithm is object-ID-offset remapping: each appended document's
//! objects are shifted past the destination's `max_id`, internal
//! references are rewritten recursively, and the appended pages are
//! pushed onto the destination's page tree.

use std::collections::BTreeMap;

use lopdf::{Document, Object, ObjectId};
use tracing::{debug, warn};

use crate::error::ComposeError;

/// Maps `(file_index, page_number_within_file)` to the page's 1-based
/// position in the merged document. Both page numberings are 1-based.
#[derive(Debug, Default, Clone)]
pub struct PageMap {
    map: BTreeMap<(usize, u32), u32>,
}

impl PageMap {
    fn insert(&mut self, file_index: usize, page_in_file: u32, global_page: u32) {
        self.map.insert((file_index, page_in_file), global_page);
    }

    /// The merged-document page number a source page landed on, if its
    /// file survived merging.
    pub fn global_page(&self, file_index: usize, page_in_file: u32) -> Option<u32> {
        self.map.get(&(file_index, page_in_file)).copied()
    }

    /// Number of pages a given file contributed.
    pub fn pages_for_file(&self, file_index: usize) -> u32 {
        self.map
            .range((file_index, 0)..(file_index, u32::MAX))
            .count() as u32
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// The merged document, held in memory so field compositing can draw
/// into it before the single final serialization.
#[derive(Debug)]
pub struct MergedDocument {
    pub doc: Document,
    pub page_map: PageMap,
}

impl MergedDocument {
    /// Object id of the merged page a source page landed on.
    pub fn page_object_id(&self, file_index: usize, page_in_file: u32) -> Option<ObjectId> {
        let global = self.page_map.global_page(file_index, page_in_file)?;
        self.doc.get_pages().get(&global).copied()
    }

    /// Compress and serialize the merged document.
    pub fn into_bytes(mut self) -> Result<Vec<u8>, ComposeError> {
        self.doc.compress();
        let mut buffer = Vec::new();
        self.doc
            .save_to(&mut buffer)
            .map_err(|e| ComposeError::OperationError(format!("Failed to save merged PDF: {}", e)))?;
        Ok(buffer)
    }
}

/// Merge normalized PDFs into one document.
///
/// Each entry carries the original file index so skipped uploads keep
/// their numbering. A file whose bytes fail to parse is logged and
/// dropped; the run only fails when no file contributes any pages.
pub fn merge_files(files: Vec<(usize, Vec<u8>)>) -> Result<MergedDocument, ComposeError> {
    let mut page_map = PageMap::default();
    let mut dest: Option<Document> = None;
    let mut dest_max_id = 0u32;
    let mut dest_page_refs: Vec<ObjectId> = Vec::new();
    let mut global_page = 0u32;

    for (file_index, bytes) in files {
        let source = match Document::load_mem(&bytes) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(file_index, error = %e, "skipping unparseable PDF during merge");
                continue;
            }
        };
        let source_pages: Vec<ObjectId> = source.get_pages().into_values().collect();
        if source_pages.is_empty() {
            warn!(file_index, "skipping PDF with no pages during merge");
            continue;
        }

        match dest.take() {
            None => {
                // First parseable file becomes the merge base.
                dest_max_id = source.max_id;
                for (page_in_file, &page_ref) in source_pages.iter().enumerate() {
                    global_page += 1;
                    page_map.insert(file_index, page_in_file as u32 + 1, global_page);
                    dest_page_refs.push(page_ref);
                }
                dest = Some(source);
            }
            Some(mut base) => {
                // Shift the source's object ids past everything the
                // destination already holds.
                let id_offset = dest_max_id;
                for (old_id, object) in source.objects.into_iter() {
                    let new_id = (old_id.0 + id_offset, old_id.1);
                    base.objects.insert(new_id, remap_object_refs(object, id_offset));
                }
                for (page_in_file, &old_page_ref) in source_pages.iter().enumerate() {
                    global_page += 1;
                    page_map.insert(file_index, page_in_file as u32 + 1, global_page);
                    dest_page_refs.push((old_page_ref.0 + id_offset, old_page_ref.1));
                }
                dest_max_id = (source.max_id + id_offset).max(dest_max_id);
                dest = Some(base);
            }
        }
        debug!(file_index, pages = source_pages.len(), "merged file pages");
    }

    let mut dest = dest.ok_or(ComposeError::NoPagesProduced)?;
    update_page_tree(&mut dest, &dest_page_refs)?;
    dest.max_id = dest_max_id;

    Ok(MergedDocument { doc: dest, page_map })
}

/// Recursively remap object references in an object.
fn remap_object_refs(obj: Object, offset: u32) -> Object {
    match obj {
        Object::Reference(id) => Object::Reference((id.0 + offset, id.1)),
        Object::Array(arr) => Object::Array(
            arr.into_iter()
                .map(|o| remap_object_refs(o, offset))
                .collect(),
        ),
        Object::Dictionary(mut dict) => {
            for (_, value) in dict.iter_mut() {
                *value = remap_object_refs(value.clone(), offset);
            }
            Object::Dictionary(dict)
        }
        Object::Stream(mut stream) => {
            for (_, value) in stream.dict.iter_mut() {
                *value = remap_object_refs(value.clone(), offset);
            }
            Object::Stream(stream)
        }
        other => other,
    }
}

/// Rewrite the destination's page tree with the full merged page list,
/// reparenting every page onto the root Pages node.
fn update_page_tree(doc: &mut Document, page_refs: &[ObjectId]) -> Result<(), ComposeError> {
    let catalog_id = doc
        .trailer
        .get(b"Root")
        .map_err(|_| ComposeError::OperationError("No Root in trailer".into()))?
        .as_reference()
        .map_err(|_| ComposeError::OperationError("Root is not a reference".into()))?;

    let pages_id = doc
        .objects
        .get(&catalog_id)
        .ok_or_else(|| ComposeError::OperationError("Catalog not found".into()))?
        .as_dict()
        .map_err(|_| ComposeError::OperationError("Invalid catalog".into()))?
        .get(b"Pages")
        .map_err(|_| ComposeError::OperationError("No Pages in catalog".into()))?
        .as_reference()
        .map_err(|_| ComposeError::OperationError("Pages is not a reference".into()))?;

    // Appended pages still point at their old parent node; the flat
    // Kids array only works if every page's Parent is the root node.
    for &page_ref in page_refs {
        if let Some(Object::Dictionary(page)) = doc.objects.get_mut(&page_ref) {
            page.set("Parent", Object::Reference(pages_id));
        }
    }

    if let Some(Object::Dictionary(pages_dict)) = doc.objects.get_mut(&pages_id) {
        let kids = page_refs
            .iter()
            .map(|&id| Object::Reference(id))
            .collect::<Vec<_>>();
        pages_dict.set("Kids", Object::Array(kids));
        pages_dict.set("Count", Object::Integer(page_refs.len() as i64));
        Ok(())
    } else {
        Err(ComposeError::OperationError(
            "Invalid pages dictionary".into(),
        ))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::page::PdfBuilder;

    /// A simple PDF with `num_pages` pages of identifiable text.
    pub(crate) fn create_test_pdf(num_pages: u32, content_prefix: &str) -> Vec<u8> {
        let mut builder = PdfBuilder::new();
        for page_num in 0..num_pages {
            builder.add_text_page(
                612.0,
                792.0,
                "Helvetica",
                format!(
                    "BT /F1 12 Tf 50 700 Td ({}-Page-{}) Tj ET",
                    content_prefix,
                    page_num + 1
                ),
            );
        }
        builder.finish().unwrap()
    }

    #[test]
    fn merge_empty_fails_with_no_pages() {
        let err = merge_files(vec![]).unwrap_err();
        assert!(matches!(err, ComposeError::NoPagesProduced));
    }

    #[test]
    fn merge_single_file_maps_all_pages() {
        let pdf = create_test_pdf(3, "Single");
        let merged = merge_files(vec![(0, pdf)]).unwrap();

        assert_eq!(merged.doc.get_pages().len(), 3);
        assert_eq!(merged.page_map.len(), 3);
        for page in 1..=3 {
            assert_eq!(merged.page_map.global_page(0, page), Some(page));
        }
    }

    #[test]
    fn merge_two_files_combines_pages_in_order() {
        let doc_a = create_test_pdf(2, "DocA");
        let doc_b = create_test_pdf(3, "DocB");

        let merged = merge_files(vec![(0, doc_a), (1, doc_b)]).unwrap();

        assert_eq!(merged.doc.get_pages().len(), 5);
        assert_eq!(merged.page_map.global_page(0, 1), Some(1));
        assert_eq!(merged.page_map.global_page(0, 2), Some(2));
        assert_eq!(merged.page_map.global_page(1, 1), Some(3));
        assert_eq!(merged.page_map.global_page(1, 3), Some(5));
    }

    #[test]
    fn merged_output_is_valid_pdf() {
        let doc_a = create_test_pdf(2, "Valid1");
        let doc_b = create_test_pdf(2, "Valid2");

        let merged = merge_files(vec![(0, doc_a), (1, doc_b)]).unwrap();
        let bytes = merged.into_bytes().unwrap();

        let reloaded = Document::load_mem(&bytes).unwrap();
        assert_eq!(reloaded.get_pages().len(), 4);
    }

    #[test]
    fn corrupt_file_is_skipped_not_fatal() {
        let good = create_test_pdf(2, "Good");
        let merged = merge_files(vec![
            (0, b"not a pdf at all".to_vec()),
            (1, good),
        ])
        .unwrap();

        assert_eq!(merged.doc.get_pages().len(), 2);
        // The corrupt file contributes no map entries; indices of the
        // surviving file are unchanged.
        assert_eq!(merged.page_map.global_page(0, 1), None);
        assert_eq!(merged.page_map.global_page(1, 1), Some(1));
        assert_eq!(merged.page_map.global_page(1, 2), Some(2));
    }

    #[test]
    fn all_corrupt_files_fail_with_no_pages() {
        let err = merge_files(vec![
            (0, b"garbage".to_vec()),
            (1, b"more garbage".to_vec()),
        ])
        .unwrap_err();
        assert!(matches!(err, ComposeError::NoPagesProduced));
    }

    #[test]
    fn page_object_ids_resolve_to_real_pages() {
        let doc_a = create_test_pdf(1, "A");
        let doc_b = create_test_pdf(2, "B");
        let merged = merge_files(vec![(0, doc_a), (1, doc_b)]).unwrap();

        for (file_index, page) in [(0usize, 1u32), (1, 1), (1, 2)] {
            let id = merged.page_object_id(file_index, page).unwrap();
            let obj = merged.doc.get_object(id).unwrap().as_dict().unwrap();
            assert_eq!(obj.get(b"Type").unwrap().as_name().unwrap(), b"Page");
        }
    }

    #[test]
    fn merge_many_files_keeps_counts() {
        let files: Vec<(usize, Vec<u8>)> = (0..5)
            .map(|i| (i, create_test_pdf(i as u32 % 3 + 1, &format!("Doc{}", i))))
            .collect();
        let expected: u32 = (0..5u32).map(|i| i % 3 + 1).sum();

        let merged = merge_files(files).unwrap();
        assert_eq!(merged.doc.get_pages().len() as u32, expected);
        for i in 0..5usize {
            assert_eq!(merged.page_map.pages_for_file(i), i as u32 % 3 + 1);
        }
    }
}

#[cfg(test)]
mod proptests {
    use super::tests::create_test_pdf;
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        /// The page map is injective and covers 1..=total contiguously,
        /// in file order.
        #[test]
        fn page_map_is_injective_and_contiguous(page_counts in prop::collection::vec(1u32..4, 1..5)) {
            let files: Vec<(usize, Vec<u8>)> = page_counts
                .iter()
                .enumerate()
                .map(|(i, &n)| (i, create_test_pdf(n, &format!("F{}", i))))
                .collect();
            let total: u32 = page_counts.iter().sum();

            let merged = merge_files(files).unwrap();

            let mut seen = BTreeSet::new();
            let mut expected_global = 0u32;
            for (file_index, &n) in page_counts.iter().enumerate() {
                for page in 1..=n {
                    expected_global += 1;
                    let global = merged.page_map.global_page(file_index, page).unwrap();
                    prop_assert_eq!(global, expected_global);
                    prop_assert!(seen.insert(global), "duplicate global page {}", global);
                }
            }
            prop_assert_eq!(seen.len() as u32, total);
            prop_assert_eq!(merged.doc.get_pages().len() as u32, total);
        }
    }
}
