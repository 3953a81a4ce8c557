//! Convert route - multipart image upload to streamed PDF download.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::Response,
};
use axum_extra::extract::multipart::{Field, MultipartError, MultipartRejection};
use axum_extra::extract::Multipart;
use img2pdf_core::{ConversionRequest, Delivery, Error, UploadSpooler};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::helpers::{error_response, ResultExt, RouteResult};
use crate::state::AppState;

/// Text field carrying the requested download name.
const OUTPUT_NAME_FIELD: &str = "output_name";

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| {
            v.trim_start()
                .to_ascii_lowercase()
                .starts_with("multipart/form-data")
        })
}

fn multipart_error(e: &MultipartError) -> (StatusCode, String) {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            "Error: Request body is too large.".to_string(),
        );
    }
    warn!("Malformed multipart upload: {}", e);
    (
        StatusCode::BAD_REQUEST,
        format!("Error: Malformed upload: {}", e.body_text()),
    )
}

async fn spool_field(
    spooler: &mut UploadSpooler,
    filename: String,
    field: &mut Field,
) -> RouteResult<()> {
    let mut item = spooler.start_item(filename);
    while let Some(chunk) = field.chunk().await.map_err(|e| multipart_error(&e))? {
        spooler.write_chunk(&mut item, &chunk).or_error_response()?;
    }
    debug!("Received {} ({} bytes)", item.filename(), item.size());
    spooler.finish_item(item);
    Ok(())
}

/// Read every uploaded file into a [`ConversionRequest`], enforcing the size
/// caps as bytes arrive.
async fn read_request(state: &AppState, mut multipart: Multipart) -> RouteResult<ConversionRequest> {
    let mut spooler = UploadSpooler::new(&state.config.limits);
    let mut output_name = None;

    while let Some(mut field) = multipart.next_field().await.map_err(|e| multipart_error(&e))? {
        if let Some(filename) = field.file_name().map(str::to_string) {
            spool_field(&mut spooler, filename, &mut field).await?;
        } else if field.name() == Some(OUTPUT_NAME_FIELD) {
            let name = field.text().await.map_err(|e| multipart_error(&e))?;
            if !name.trim().is_empty() {
                output_name = Some(name);
            }
        } else {
            debug!("Ignoring form field {:?}", field.name());
        }
    }

    info!("Received upload of {} bytes", spooler.total_bytes());

    let request = ConversionRequest::new(spooler.into_items());
    Ok(match output_name {
        Some(name) => request.with_output_name(name),
        None => request,
    })
}

/// Stream a delivery out in chunks read on the blocking pool.
///
/// Dropping the body (client disconnect) drops the delivery, which removes
/// the request's staged files.
#[allow(tail_expr_drop_order)] // Drop order change in async_stream macro is harmless here
fn stream_body(delivery: Delivery) -> Body {
    let stream = async_stream::stream! {
        let mut pending = Some(delivery);
        while let Some(mut delivery) = pending.take() {
            let next = tokio::task::spawn_blocking(move || {
                let chunk = delivery.next_chunk();
                (delivery, chunk)
            })
            .await;

            match next {
                Ok((delivery, Ok(Some(chunk)))) => {
                    pending = Some(delivery);
                    yield Ok::<_, std::io::Error>(chunk);
                }
                Ok((_, Ok(None))) => {}
                Ok((_, Err(e))) => {
                    error!("Delivery failed: {}", e);
                    yield Err(std::io::Error::other(e));
                }
                Err(e) => {
                    error!("Delivery task failed: {}", e);
                    yield Err(std::io::Error::other(e));
                }
            }
        }
    };
    Body::from_stream(stream)
}

/// Convert uploaded images into a single PDF download.
///
/// Every part carrying a filename is treated as an upload; items without a
/// supported image extension are skipped. An optional `output_name` text
/// field sets the download name.
pub async fn convert_images(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> RouteResult<Response> {
    if !is_multipart(&headers) {
        return Err(error_response(&Error::NotMultipart));
    }
    let multipart = multipart.map_err(|e| {
        warn!("Rejected multipart request: {}", e);
        (StatusCode::BAD_REQUEST, format!("Error: {e}"))
    })?;

    let request = read_request(&state, multipart).await?;
    let delivery = state
        .orchestrator
        .convert_async(request)
        .await
        .or_error_response()?;

    info!(
        "Delivering {} ({} pages, {} bytes)",
        delivery.filename(),
        delivery.page_count(),
        delivery.size()
    );

    let content_disposition = format!("attachment; filename=\"{}\"", delivery.filename());
    let content_length = delivery.size();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, delivery.content_type())
        .header(header::CONTENT_DISPOSITION, content_disposition)
        .header(header::CONTENT_LENGTH, content_length)
        .body(stream_body(delivery))
        .or_error_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_is_multipart() {
        let mut headers = HeaderMap::new();
        assert!(!is_multipart(&headers));

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        assert!(!is_multipart(&headers));

        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("Multipart/Form-Data; boundary=xyz"),
        );
        assert!(is_multipart(&headers));
    }
}
