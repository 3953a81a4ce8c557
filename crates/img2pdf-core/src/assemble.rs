//! Turns an ordered list of images into a document, one page per image.

use tracing::{debug, info, warn};

use crate::asset::ImageAsset;
use crate::config::DecodePolicy;
use crate::encoder::DocumentEncoder;
use crate::error::{Error, Result};
use crate::layout;

/// Where the assembler reads an image from.
#[derive(Debug, Clone)]
pub enum ImageSource {
    Path(std::path::PathBuf),
    Bytes { label: String, data: bytes::Bytes },
}

impl ImageSource {
    pub fn label(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Bytes { label, .. } => label.clone(),
        }
    }

    fn probe(&self) -> Result<ImageAsset> {
        match self {
            Self::Path(path) => ImageAsset::from_file(path),
            Self::Bytes { label, data } => ImageAsset::from_bytes(label.clone(), data.clone()),
        }
    }
}

/// Progress callback: `(processed, total)`.
pub type ProgressCallback = Box<dyn Fn(usize, usize) + Send>;

/// Result of a successful assembly.
#[derive(Debug, Clone)]
pub struct AssembledDocument {
    pub bytes: Vec<u8>,
    pub page_count: usize,
    /// Labels of images dropped under [`DecodePolicy::SkipInvalid`]
    pub skipped: Vec<String>,
}

/// Drives a [`DocumentEncoder`] over a batch of images.
pub struct DocumentAssembler<E: DocumentEncoder> {
    encoder: E,
    policy: DecodePolicy,
    progress: Option<ProgressCallback>,
}

impl<E: DocumentEncoder> DocumentAssembler<E> {
    pub fn new(encoder: E) -> Self {
        Self {
            encoder,
            policy: DecodePolicy::default(),
            progress: None,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: DecodePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Add one page per decodable image, in input order, and serialize.
    ///
    /// Under [`DecodePolicy::FailFast`] the first undecodable image aborts the
    /// batch. Encoder failures abort regardless of policy.
    pub fn assemble(mut self, sources: &[ImageSource]) -> Result<AssembledDocument> {
        let total = sources.len();
        let mut skipped = Vec::new();

        for (index, source) in sources.iter().enumerate() {
            match self.add_page(source) {
                Ok(()) => {}
                Err(e @ Error::Decode { .. }) if self.policy == DecodePolicy::SkipInvalid => {
                    warn!("Skipping {}: {}", source.label(), e);
                    skipped.push(source.label());
                }
                Err(e) => {
                    warn!("Failed to process image: {}", source.label());
                    return Err(e);
                }
            }

            if let Some(ref callback) = self.progress {
                callback(index + 1, total);
            }
        }

        let page_count = self.encoder.page_count();
        if page_count == 0 {
            return Err(Error::NoValidPages);
        }

        let bytes = self.encoder.serialize()?;
        info!(
            "Assembled {} page(s) from {} image(s), {} bytes",
            page_count,
            total,
            bytes.len()
        );

        Ok(AssembledDocument {
            bytes,
            page_count,
            skipped,
        })
    }

    fn add_page(&mut self, source: &ImageSource) -> Result<()> {
        let asset = source.probe()?;
        let image = self.encoder.embed_image(&asset)?;

        let (geometry, placement) = layout::layout(asset.width(), asset.height());
        let page = self.encoder.create_page(geometry)?;
        self.encoder.draw_image(page, &image, placement)?;

        debug!(
            "Added image: {} ({}x{}, {:?})",
            asset.label(),
            asset.width(),
            asset.height(),
            geometry.orientation()
        );
        Ok(())
    }
}
