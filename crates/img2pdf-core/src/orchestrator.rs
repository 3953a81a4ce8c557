//! End-to-end conversion of an upload into a deliverable PDF.
//!
//! A request moves through
//! `Received -> Validating -> Staged -> Converting -> Delivering -> CleanedUp`,
//! or to `Failed` from any non-terminal state. Whatever happens, every file
//! staged for the request is removed before the request is done with.

use std::io::Read;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::assemble::{DocumentAssembler, ImageSource};
use crate::config::{AppConfig, DecodePolicy, LimitsConfig, StagingBackend};
use crate::error::{Error, Result};
use crate::input::InputItem;
use crate::pdf::PdfEncoder;
use crate::staging::{DiskStore, MemoryStore, StagedFile, StagingArea, StagingStore};
use crate::util::with_pdf_extension;
use crate::validate::{base_name, extension_of, is_supported};

/// MIME type of every delivered document.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Bytes handed out per [`Delivery::next_chunk`] call.
pub const DELIVERY_CHUNK_SIZE: usize = 64 * 1024;

// =============================================================================
// Request / Result
// =============================================================================

/// An ordered batch of uploaded items plus an optional download name.
#[derive(Debug, Default)]
pub struct ConversionRequest {
    items: Vec<InputItem>,
    output_name: Option<String>,
}

impl ConversionRequest {
    pub fn new(items: Vec<InputItem>) -> Self {
        Self {
            items,
            output_name: None,
        }
    }

    /// Name the caller would like the download to have.
    #[must_use]
    pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = Some(name.into());
        self
    }

    pub fn items(&self) -> &[InputItem] {
        &self.items
    }

    pub fn total_bytes(&self) -> u64 {
        self.items.iter().map(InputItem::size).sum()
    }
}

/// A fully buffered conversion result.
#[derive(Debug, Clone)]
pub struct ConvertedDocument {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: &'static str,
    pub page_count: usize,
    /// Labels of items dropped under [`DecodePolicy::SkipInvalid`]
    pub skipped: Vec<String>,
}

// =============================================================================
// Lifecycle
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionState {
    Received,
    Validating,
    Staged,
    Converting,
    Delivering,
    CleanedUp,
    Failed,
}

impl ConversionState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::CleanedUp | Self::Failed)
    }

    pub const fn can_advance_to(self, next: Self) -> bool {
        match (self, next) {
            (from, Self::Failed) => !from.is_terminal(),
            (Self::Received, Self::Validating)
            | (Self::Validating, Self::Staged)
            | (Self::Staged, Self::Converting)
            | (Self::Converting, Self::Delivering)
            | (Self::Delivering, Self::CleanedUp) => true,
            _ => false,
        }
    }
}

struct Lifecycle {
    request: String,
    state: ConversionState,
}

impl Lifecycle {
    fn new(request: &str) -> Self {
        Self {
            request: request.to_string(),
            state: ConversionState::Received,
        }
    }

    fn advance(&mut self, next: ConversionState) {
        if !self.state.can_advance_to(next) {
            warn!(
                request = %self.request,
                "Ignoring invalid transition {:?} -> {:?}",
                self.state,
                next
            );
            return;
        }
        debug!(request = %self.request, "{:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn fail(&mut self, error: &Error) {
        warn!(request = %self.request, kind = %error.kind(), "Conversion failed: {}", error);
        self.advance(ConversionState::Failed);
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Drives validation, staging, assembly and delivery for each request.
///
/// Cheap to clone; clones share the staging store.
#[derive(Clone)]
pub struct ConversionOrchestrator {
    store: Arc<dyn StagingStore>,
    limits: LimitsConfig,
    policy: DecodePolicy,
    progress: Option<SharedProgress>,
}

/// Page progress `(processed, total)`, shared between clones.
pub type SharedProgress = Arc<dyn Fn(usize, usize) + Send + Sync>;

impl ConversionOrchestrator {
    pub fn new(store: Arc<dyn StagingStore>, config: &AppConfig) -> Self {
        Self {
            store,
            limits: config.limits.clone(),
            policy: config.conversion.decode_policy,
            progress: None,
        }
    }

    /// Report page progress while assembling.
    #[must_use]
    pub fn with_progress(mut self, callback: SharedProgress) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Build an orchestrator with the staging backend named in `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let store: Arc<dyn StagingStore> = match config.staging.backend {
            StagingBackend::Disk => Arc::new(DiskStore::new(config.staging.resolved_dir())?),
            StagingBackend::Memory => Arc::new(MemoryStore::new()),
        };
        info!("Staging files in {}", store.describe());
        Ok(Self::new(store, config))
    }

    pub fn store(&self) -> &Arc<dyn StagingStore> {
        &self.store
    }

    pub const fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    pub const fn decode_policy(&self) -> DecodePolicy {
        self.policy
    }

    /// Convert and buffer the whole document.
    pub fn convert(&self, request: ConversionRequest) -> Result<ConvertedDocument> {
        self.convert_staged(request)?.into_document()
    }

    /// Convert on a blocking worker so async callers don't stall the runtime.
    pub async fn convert_async(&self, request: ConversionRequest) -> Result<Delivery> {
        let orchestrator = self.clone();
        tokio::task::spawn_blocking(move || orchestrator.convert_staged(request))
            .await
            .map_err(|e| Error::Worker(e.to_string()))?
    }

    /// Convert a request into a [`Delivery`] streaming from the staging store.
    ///
    /// Size caps are checked before anything else, then unsupported items
    /// are dropped. If nothing remains, [`Error::NoValidImages`] is returned
    /// without staging anything.
    pub fn convert_staged(&self, request: ConversionRequest) -> Result<Delivery> {
        let mut area = StagingArea::new(Arc::clone(&self.store));
        let mut lifecycle = Lifecycle::new(area.token());
        lifecycle.advance(ConversionState::Validating);

        debug!(
            request = %area.token(),
            "Received {} item(s), {} bytes",
            request.items().len(),
            request.total_bytes()
        );
        let ConversionRequest { items, output_name } = request;

        let accepted = match self.validate(items) {
            Ok(accepted) => accepted,
            Err(e) => {
                lifecycle.fail(&e);
                return Err(e);
            }
        };

        match self.run(&mut area, &mut lifecycle, accepted) {
            Ok((output, page_count, skipped)) => {
                let reader = match area.open(&output) {
                    Ok(reader) => reader,
                    Err(e) => {
                        area.cleanup();
                        lifecycle.fail(&e);
                        return Err(e);
                    }
                };
                lifecycle.advance(ConversionState::Delivering);

                let filename = suggested_filename(output_name.as_deref(), &area.output_name());
                Ok(Delivery {
                    area,
                    lifecycle,
                    reader: Some(reader),
                    filename,
                    size: output.size,
                    page_count,
                    skipped,
                })
            }
            Err(e) => {
                area.cleanup();
                lifecycle.fail(&e);
                Err(e)
            }
        }
    }

    fn validate(&self, items: Vec<InputItem>) -> Result<Vec<InputItem>> {
        let mut total: u64 = 0;
        for item in &items {
            if item.size() > self.limits.max_item_bytes {
                return Err(Error::ItemTooLarge {
                    filename: item.filename().to_string(),
                    size: item.size(),
                    limit: self.limits.max_item_bytes,
                });
            }
            total = total.saturating_add(item.size());
        }
        if total > self.limits.max_request_bytes {
            return Err(Error::RequestTooLarge {
                size: total,
                limit: self.limits.max_request_bytes,
            });
        }

        let received = items.len();
        let accepted: Vec<InputItem> = items
            .into_iter()
            .filter(|item| {
                let supported = is_supported(item.filename());
                if !supported {
                    debug!("Skipping unsupported file: {}", item.filename());
                }
                supported
            })
            .collect();

        if accepted.is_empty() {
            return Err(Error::NoValidImages);
        }
        info!(
            "Accepted {} of {} item(s), {} bytes",
            accepted.len(),
            received,
            total
        );
        Ok(accepted)
    }

    fn run(
        &self,
        area: &mut StagingArea,
        lifecycle: &mut Lifecycle,
        items: Vec<InputItem>,
    ) -> Result<(StagedFile, usize, Vec<String>)> {
        let mut staged = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let label = base_name(item.filename()).to_string();
            let extension = extension_of(&label).unwrap_or_default();
            let mut reader = item
                .into_reader()
                .map_err(|e| Error::StagingIo(format!("Failed to read upload {label}: {e}")))?;
            let file = area.stage_input(index, &extension, &mut reader)?;
            staged.push((label, file));
        }
        lifecycle.advance(ConversionState::Staged);

        let sources = staged
            .iter()
            .map(|(label, file)| {
                Ok(ImageSource::Bytes {
                    label: label.clone(),
                    data: Bytes::from(area.read(file)?),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        lifecycle.advance(ConversionState::Converting);

        let mut assembler = DocumentAssembler::new(PdfEncoder::new()).with_policy(self.policy);
        if let Some(progress) = &self.progress {
            let progress = Arc::clone(progress);
            assembler = assembler.with_progress(Box::new(move |done, total| progress(done, total)));
        }
        let assembled = assembler.assemble(&sources)?;
        drop(sources);

        let output = area.stage_output(&assembled.bytes)?;
        Ok((output, assembled.page_count, assembled.skipped))
    }
}

impl std::fmt::Debug for ConversionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionOrchestrator")
            .field("store", &self.store.describe())
            .field("limits", &self.limits)
            .field("policy", &self.policy)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Download name: the caller's choice when it has a usable base name,
/// otherwise `fallback`. Always ends in `.pdf` and is safe to quote in a
/// `Content-Disposition` header.
fn suggested_filename(requested: Option<&str>, fallback: &str) -> String {
    let cleaned: Option<String> = requested.map(|name| {
        base_name(name.trim())
            .chars()
            .map(|c| if (c.is_ascii_graphic() && c != '"') || c == ' ' { c } else { '_' })
            .collect()
    });

    match cleaned {
        Some(name) if !name.trim_matches('.').is_empty() => with_pdf_extension(&name),
        _ => fallback.to_string(),
    }
}

// =============================================================================
// Delivery
// =============================================================================

/// A finished document being streamed out of the staging store.
///
/// Reading to the end, calling [`Delivery::finish`], or dropping the value
/// removes every staged file of the request.
pub struct Delivery {
    area: StagingArea,
    lifecycle: Lifecycle,
    reader: Option<Box<dyn Read + Send>>,
    filename: String,
    size: u64,
    page_count: usize,
    skipped: Vec<String>,
}

impl Delivery {
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub const fn content_type(&self) -> &'static str {
        PDF_CONTENT_TYPE
    }

    /// Document size in bytes
    pub const fn size(&self) -> u64 {
        self.size
    }

    pub const fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    pub fn state(&self) -> ConversionState {
        self.lifecycle.state
    }

    /// Next chunk of the document, or `None` once it has been fully read.
    pub fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        let mut buf = vec![0; DELIVERY_CHUNK_SIZE];
        let mut filled = 0;
        while filled < buf.len() {
            match reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    let error = Error::DeliveryIo(format!("Failed to read {}: {e}", self.filename));
                    self.lifecycle.fail(&error);
                    self.finish();
                    return Err(error);
                }
            }
        }

        if filled == 0 {
            self.finish();
            return Ok(None);
        }
        buf.truncate(filled);
        Ok(Some(Bytes::from(buf)))
    }

    /// Read the remainder of the document into memory.
    pub fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(usize::try_from(self.size).unwrap_or(0));
        while let Some(chunk) = self.next_chunk()? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    pub fn into_document(mut self) -> Result<ConvertedDocument> {
        let bytes = self.read_to_end()?;
        Ok(ConvertedDocument {
            bytes,
            filename: std::mem::take(&mut self.filename),
            content_type: PDF_CONTENT_TYPE,
            page_count: self.page_count,
            skipped: std::mem::take(&mut self.skipped),
        })
    }

    /// Stop delivering and remove the request's staged files. Idempotent.
    pub fn finish(&mut self) {
        // Close the output before removing it
        self.reader = None;
        if self.area.is_cleaned() {
            return;
        }
        self.area.cleanup();
        if self.lifecycle.state == ConversionState::Delivering {
            self.lifecycle.advance(ConversionState::CleanedUp);
        }
        info!(request = %self.lifecycle.request, "Delivery of {} finished", self.filename);
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if !self.area.is_cleaned() {
            warn!(request = %self.lifecycle.request, "Delivery abandoned before completion");
            self.finish();
        }
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("filename", &self.filename)
            .field("size", &self.size)
            .field("page_count", &self.page_count)
            .field("state", &self.lifecycle.state)
            .finish_non_exhaustive()
    }
}
