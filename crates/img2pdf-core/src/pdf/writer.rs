//! [`DocumentEncoder`] implementation on top of lopdf.
//!
//! Pages are buffered as operation lists and written, together with the page
//! tree and catalog, when the document is serialized.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

use super::xobject;
use crate::asset::ImageAsset;
use crate::encoder::{DocumentEncoder, PageHandle};
use crate::error::{Error, Result};
use crate::layout::{PageGeometry, Placement};

/// PDF version written into the header.
const PDF_VERSION: &str = "1.5";

/// An image XObject already added to the document.
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedImage {
    id: ObjectId,
}

struct PendingPage {
    geometry: PageGeometry,
    operations: Vec<Operation>,
    xobjects: Dictionary,
}

/// PDF encoder using lopdf.
pub struct PdfEncoder {
    doc: Document,
    pages_id: ObjectId,
    pages: Vec<PendingPage>,
}

impl PdfEncoder {
    pub fn new() -> Self {
        let mut doc = Document::with_version(PDF_VERSION);
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            pages: Vec::new(),
        }
    }
}

impl Default for PdfEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentEncoder for PdfEncoder {
    type Image = EmbeddedImage;

    fn embed_image(&mut self, asset: &ImageAsset) -> Result<EmbeddedImage> {
        let id = xobject::embed_image(&mut self.doc, asset)?;
        debug!("Embedded {} as object {:?}", asset.label(), id);
        Ok(EmbeddedImage { id })
    }

    fn create_page(&mut self, geometry: PageGeometry) -> Result<PageHandle> {
        self.pages.push(PendingPage {
            geometry,
            operations: Vec::new(),
            xobjects: Dictionary::new(),
        });
        Ok(PageHandle::new(self.pages.len() - 1))
    }

    fn draw_image(
        &mut self,
        page: PageHandle,
        image: &EmbeddedImage,
        placement: Placement,
    ) -> Result<()> {
        let total = self.pages.len();
        let pending = self.pages.get_mut(page.index()).ok_or_else(|| {
            Error::Encoder(format!("invalid page {} (document has {total} pages)", page.index()))
        })?;

        let name = format!("Im{}", pending.xobjects.len() + 1);
        pending
            .xobjects
            .set(name.as_bytes().to_vec(), Object::Reference(image.id));

        pending.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Real(placement.width),
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(placement.height),
                    Object::Real(placement.x),
                    Object::Real(placement.y),
                ],
            ),
            Operation::new("Do", vec![Object::Name(name.into_bytes())]),
            Operation::new("Q", vec![]),
        ]);

        Ok(())
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn serialize(mut self) -> Result<Vec<u8>> {
        let mut kids = Vec::with_capacity(self.pages.len());

        for pending in std::mem::take(&mut self.pages) {
            let content = Content {
                operations: pending.operations,
            };
            let content_bytes = content
                .encode()
                .map_err(|e| Error::Encoder(format!("Failed to encode content stream: {e}")))?;
            let content_id = self
                .doc
                .add_object(Stream::new(Dictionary::new(), content_bytes));

            let resources = Dictionary::from_iter([("XObject", Object::Dictionary(pending.xobjects))]);

            let page_id = self.doc.add_object(Dictionary::from_iter([
                ("Type", Object::Name(b"Page".to_vec())),
                ("Parent", Object::Reference(self.pages_id)),
                ("Contents", Object::Reference(content_id)),
                ("Resources", Object::Dictionary(resources)),
                (
                    "MediaBox",
                    Object::Array(vec![
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Real(pending.geometry.width),
                        Object::Real(pending.geometry.height),
                    ]),
                ),
            ]));
            kids.push(Object::Reference(page_id));
        }

        let count = i64::try_from(kids.len())
            .map_err(|_| Error::Encoder("too many pages".to_string()))?;

        let pages_dict = Dictionary::from_iter([
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Kids", Object::Array(kids)),
            ("Count", Object::Integer(count)),
        ]);
        self.doc
            .objects
            .insert(self.pages_id, Object::Dictionary(pages_dict));

        let catalog_id = self.doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(self.pages_id)),
        ]));
        self.doc.trailer.set("Root", Object::Reference(catalog_id));

        self.doc.compress();

        let mut output = Vec::new();
        self.doc
            .save_to(&mut output)
            .map_err(|e| Error::Encoder(format!("Failed to save PDF: {e}")))?;

        Ok(output)
    }
}
