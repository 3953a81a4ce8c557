//! Helper types and traits for cleaner route handlers.
//!
//! Maps core conversion errors onto HTTP status codes so handlers can use `?`.

use axum::http::StatusCode;
use img2pdf_core::{Error, ErrorKind};
use tracing::error;

/// Standard result type for route handlers.
pub type RouteResult<T> = Result<T, (StatusCode, String)>;

/// Status code a conversion failure is reported with.
pub const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotMultipart => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        ErrorKind::ItemTooLarge | ErrorKind::RequestTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        ErrorKind::NoValidImages => StatusCode::BAD_REQUEST,
        ErrorKind::DecodeFailure | ErrorKind::NoValidPages => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::StagingIo | ErrorKind::DeliveryIo | ErrorKind::Processing | ErrorKind::Config => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Plain-text error response. Server-side failures are logged and their
/// details kept out of the body.
pub fn error_response(e: &Error) -> (StatusCode, String) {
    let status = status_for(e.kind());
    if status.is_server_error() {
        error!("Conversion failed ({}): {}", e.kind(), e);
        (status, "Error: Failed to convert images.".to_string())
    } else {
        (status, format!("Error: {e}"))
    }
}

/// Extension trait for converting `Result<T, E>` to `RouteResult<T>`.
pub trait ResultExt<T> {
    /// Converts the error to an HTTP error response.
    fn or_error_response(self) -> RouteResult<T>;
}

impl<T> ResultExt<T> for Result<T, Error> {
    fn or_error_response(self) -> RouteResult<T> {
        self.map_err(|e| error_response(&e))
    }
}

impl<T> ResultExt<T> for Result<T, axum::http::Error> {
    fn or_error_response(self) -> RouteResult<T> {
        self.map_err(|e| {
            error!("Failed to build response: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Error: Failed to build response.".to_string())
        })
    }
}
