use crate::asset::ImageAsset;
use crate::error::Result;
use crate::layout::{PageGeometry, Placement};

/// Opaque handle to a page created by a [`DocumentEncoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageHandle(pub(crate) usize);

impl PageHandle {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Zero-based position of the page in the document.
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Capability interface for the binary document writer.
///
/// The assembler embeds an image first and only then creates its page, so an
/// image that fails to decode never leaves a blank page behind.
pub trait DocumentEncoder {
    /// Encoder-specific reference to an embedded image
    type Image;

    /// Decode and embed an image. Errors here are decode failures.
    fn embed_image(&mut self, asset: &ImageAsset) -> Result<Self::Image>;

    /// Append a new empty page.
    fn create_page(&mut self, geometry: PageGeometry) -> Result<PageHandle>;

    /// Draw an embedded image into the given rectangle of a page.
    fn draw_image(&mut self, page: PageHandle, image: &Self::Image, placement: Placement)
        -> Result<()>;

    fn page_count(&self) -> usize;

    /// Finish the document and return its bytes.
    fn serialize(self) -> Result<Vec<u8>>;
}
