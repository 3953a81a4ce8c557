//! img2pdf Core Library
//!
//! This library provides the core functionality for turning images into PDFs:
//! - Extension-based image filtering
//! - A4 page layout (orientation, scaling, centering)
//! - PDF assembly, one page per image, via lopdf
//! - Request orchestration with size caps, staging and guaranteed cleanup

pub mod assemble;
pub mod asset;
pub mod config;
pub mod encoder;
pub mod error;
pub mod input;
pub mod layout;
pub mod orchestrator;
pub mod pdf;
pub mod staging;
pub mod util;
pub mod validate;

pub use assemble::{AssembledDocument, DocumentAssembler, ImageSource, ProgressCallback};
pub use asset::ImageAsset;
pub use config::{
    AppConfig, DecodePolicy, LimitsConfig, StagingBackend, DEFAULT_MAX_ITEM_BYTES,
    DEFAULT_MAX_REQUEST_BYTES, DEFAULT_MEMORY_THRESHOLD_BYTES,
};
pub use encoder::{DocumentEncoder, PageHandle};
pub use error::{Error, ErrorKind, Result};
pub use input::{InputItem, UploadSpooler};
pub use layout::{Orientation, PageGeometry, Placement};
pub use orchestrator::{
    ConversionOrchestrator, ConversionRequest, ConversionState, ConvertedDocument, Delivery,
    SharedProgress, PDF_CONTENT_TYPE,
};
pub use pdf::PdfEncoder;
pub use staging::{DiskStore, MemoryStore, StagingArea, StagingStore};
pub use validate::is_supported;

/// Convenience function to convert image files on disk into one PDF.
///
/// Runs the full orchestrated pipeline with in-memory staging, so the
/// configured size caps and decode policy apply.
pub fn convert_files(paths: &[std::path::PathBuf], config: &AppConfig) -> Result<ConvertedDocument> {
    let items = paths.iter().map(InputItem::from_path).collect::<Result<Vec<_>>>()?;
    ConversionOrchestrator::new(std::sync::Arc::new(MemoryStore::new()), config)
        .convert(ConversionRequest::new(items))
}
