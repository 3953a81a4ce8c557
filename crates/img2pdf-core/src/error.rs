use thiserror::Error;

/// Unified error type for img2pdf-core
///
/// This enum encompasses all error cases that can occur in the library:
/// - Request validation (upload encoding, size caps, empty image sets)
/// - Image decoding and PDF assembly
/// - Staging area and delivery I/O
/// - Configuration operations (loading, validation)
#[derive(Error, Debug)]
pub enum Error {
    // ==========================================================================
    // Request Errors
    // ==========================================================================
    /// Request body was not a multipart upload
    #[error("Form must have enctype=multipart/form-data.")]
    NotMultipart,

    /// A single uploaded item exceeded the per-item byte cap
    #[error("file '{filename}' is too large ({size} bytes, limit {limit} bytes)")]
    ItemTooLarge {
        filename: String,
        size: u64,
        limit: u64,
    },

    /// The whole request exceeded the aggregate byte cap
    #[error("request is too large ({size} bytes, limit {limit} bytes)")]
    RequestTooLarge { size: u64, limit: u64 },

    /// Every item was filtered out by the extension check
    #[error("No valid image files were uploaded.")]
    NoValidImages,

    // ==========================================================================
    // Conversion Errors
    // ==========================================================================
    /// An image's bytes could not be interpreted as a raster image
    #[error("failed to decode image '{name}': {reason}")]
    Decode { name: String, reason: String },

    /// Assembly finished without placing a single page
    #[error("No valid images found to convert")]
    NoValidPages,

    /// The PDF encoder rejected an operation
    #[error("PDF encoder error: {0}")]
    Encoder(String),

    /// A blocking conversion task panicked or was cancelled
    #[error("conversion worker failed: {0}")]
    Worker(String),

    // ==========================================================================
    // Storage Errors
    // ==========================================================================
    /// Writing to or reading from the staging area failed
    #[error("staging I/O error: {0}")]
    StagingIo(String),

    /// Streaming the finished document to the caller failed
    #[error("delivery I/O error: {0}")]
    DeliveryIo(String),

    // ==========================================================================
    // Configuration Errors
    // ==========================================================================
    /// Failed to load configuration file
    #[error("failed to load config: {0}")]
    ConfigLoad(String),

    /// Invalid configuration value
    #[error("invalid config value for '{field}': {reason}")]
    ConfigInvalid { field: String, reason: String },

    // ==========================================================================
    // I/O Errors
    // ==========================================================================
    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of [`Error`], used by front ends to pick a status
/// code or exit message without matching on payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotMultipart,
    ItemTooLarge,
    RequestTooLarge,
    NoValidImages,
    DecodeFailure,
    NoValidPages,
    StagingIo,
    DeliveryIo,
    Processing,
    Config,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotMultipart => "not_multipart",
            Self::ItemTooLarge => "item_too_large",
            Self::RequestTooLarge => "request_too_large",
            Self::NoValidImages => "no_valid_images",
            Self::DecodeFailure => "decode_failure",
            Self::NoValidPages => "no_valid_pages",
            Self::StagingIo => "staging_io",
            Self::DeliveryIo => "delivery_io",
            Self::Processing => "processing_error",
            Self::Config => "config",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotMultipart => ErrorKind::NotMultipart,
            Self::ItemTooLarge { .. } => ErrorKind::ItemTooLarge,
            Self::RequestTooLarge { .. } => ErrorKind::RequestTooLarge,
            Self::NoValidImages => ErrorKind::NoValidImages,
            Self::Decode { .. } => ErrorKind::DecodeFailure,
            Self::NoValidPages => ErrorKind::NoValidPages,
            Self::StagingIo(_) => ErrorKind::StagingIo,
            Self::DeliveryIo(_) => ErrorKind::DeliveryIo,
            Self::Encoder(_) | Self::Worker(_) | Self::Io(_) => ErrorKind::Processing,
            Self::ConfigLoad(_) | Self::ConfigInvalid { .. } => ErrorKind::Config,
        }
    }

    pub(crate) fn decode(name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Decode {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(Error::NoValidImages.kind(), ErrorKind::NoValidImages);
        assert_eq!(Error::decode("a.png", "bad header").kind(), ErrorKind::DecodeFailure);
        assert_eq!(Error::Encoder("x".into()).kind(), ErrorKind::Processing);
        assert_eq!(
            Error::RequestTooLarge { size: 2, limit: 1 }.kind(),
            ErrorKind::RequestTooLarge
        );
    }

    #[test]
    fn test_messages_distinguish_cases() {
        assert!(Error::NotMultipart.to_string().contains("multipart/form-data"));
        assert!(Error::NoValidImages.to_string().contains("No valid image"));
        let decode = Error::decode("scan.png", "truncated");
        assert!(decode.to_string().contains("scan.png"));
        assert!(decode.to_string().contains("truncated"));
    }
}
