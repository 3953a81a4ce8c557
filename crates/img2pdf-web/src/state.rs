use anyhow::{Context, Result};
use img2pdf_core::{AppConfig, ConversionOrchestrator};

/// Global application state
pub struct AppState {
    pub orchestrator: ConversionOrchestrator,
    /// Effective configuration (limits shown on the upload page)
    pub config: AppConfig,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self> {
        let orchestrator = ConversionOrchestrator::from_config(&config)
            .context("Failed to open staging area")?;

        Ok(Self {
            orchestrator,
            config,
        })
    }

    /// Request body limit for the upload routes.
    ///
    /// The aggregate cap is enforced on file contents while they stream in;
    /// this outer limit only has to leave room for multipart framing.
    pub fn body_limit(&self) -> usize {
        const MULTIPART_SLACK: u64 = 1024 * 1024;
        usize::try_from(self.config.limits.max_request_bytes.saturating_add(MULTIPART_SLACK))
            .unwrap_or(usize::MAX)
    }
}
