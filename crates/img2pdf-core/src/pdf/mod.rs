mod inspect;
mod writer;
mod xobject;

pub use inspect::{page_count, page_sizes};
pub use writer::{EmbeddedImage, PdfEncoder};
