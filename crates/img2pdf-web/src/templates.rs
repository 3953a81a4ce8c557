//! Askama templates.
//!
//! - `index.html` - Landing page with the upload form

use askama::Template;
use askama_web::WebTemplate;
use img2pdf_core::validate::SUPPORTED_EXTENSIONS;
use img2pdf_core::LimitsConfig;

/// Landing page with upload form.
#[derive(Template, WebTemplate)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub max_item_mib: u64,
    pub max_request_mib: u64,
    /// Value for the file input's `accept` attribute
    pub accept: String,
    pub extensions: &'static [&'static str],
}

impl IndexTemplate {
    pub fn new(limits: &LimitsConfig) -> Self {
        const MIB: u64 = 1024 * 1024;
        Self {
            max_item_mib: limits.max_item_bytes / MIB,
            max_request_mib: limits.max_request_bytes / MIB,
            accept: SUPPORTED_EXTENSIONS
                .iter()
                .map(|ext| format!(".{ext}"))
                .collect::<Vec<_>>()
                .join(","),
            extensions: SUPPORTED_EXTENSIONS,
        }
    }
}
