//! Read-back helpers for finished documents.

use lopdf::{Document, Object};

use crate::error::{Error, Result};
use crate::layout::PageGeometry;

/// Media box size of every page, in page order.
pub fn page_sizes(pdf_bytes: &[u8]) -> Result<Vec<PageGeometry>> {
    let doc = Document::load_mem(pdf_bytes)
        .map_err(|e| Error::Encoder(format!("Failed to load PDF: {e}")))?;

    doc.get_pages()
        .values()
        .map(|&page_id| {
            let page = doc
                .get_object(page_id)
                .map_err(|e| Error::Encoder(format!("Failed to get page object: {e}")))?;
            let [x0, y0, x1, y1] = get_media_box(&doc, page)?;
            Ok(PageGeometry {
                width: x1 - x0,
                height: y1 - y0,
            })
        })
        .collect()
}

/// Number of pages in a PDF.
pub fn page_count(pdf_bytes: &[u8]) -> Result<usize> {
    let doc = Document::load_mem(pdf_bytes)
        .map_err(|e| Error::Encoder(format!("Failed to load PDF: {e}")))?;
    Ok(doc.get_pages().len())
}

/// Get media box from page object, following `/Parent` inheritance.
fn get_media_box(doc: &Document, page_obj: &Object) -> Result<[f32; 4]> {
    if let Object::Dictionary(dict) = page_obj {
        if let Ok(Object::Array(arr)) = dict.get(b"MediaBox")
            && arr.len() == 4
        {
            let values: Vec<f32> = arr.iter().filter_map(|o| o.as_float().ok()).collect();

            if let [x0, y0, x1, y1] = values[..] {
                return Ok([x0, y0, x1, y1]);
            }
        }

        if let Ok(Object::Reference(parent_id)) = dict.get(b"Parent")
            && let Ok(parent) = doc.get_object(*parent_id)
        {
            return get_media_box(doc, parent);
        }
    }

    Err(Error::Encoder("page has no MediaBox".to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_is_error() {
        assert!(page_sizes(b"not a pdf").is_err());
        assert!(page_count(&[]).is_err());
    }

    #[test]
    fn test_inherited_media_box() {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(lopdf::Dictionary::from_iter([
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
        ]));
        doc.objects.insert(
            pages_id,
            Object::Dictionary(lopdf::Dictionary::from_iter([
                ("Type", Object::Name(b"Pages".to_vec())),
                ("Kids", Object::Array(vec![Object::Reference(page_id)])),
                ("Count", Object::Integer(1)),
                (
                    "MediaBox",
                    Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()]),
                ),
            ])),
        );
        let catalog_id = doc.add_object(lopdf::Dictionary::from_iter([
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]));
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();

        let sizes = page_sizes(&bytes).unwrap();
        assert_eq!(sizes.len(), 1);
        assert!((sizes[0].width - 612.0).abs() < f32::EPSILON);
        assert!((sizes[0].height - 792.0).abs() < f32::EPSILON);
        assert_eq!(page_count(&bytes).unwrap(), 1);
    }
}
