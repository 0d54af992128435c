use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::Response,
};

use crate::engine::{ByteRange, EngineError, Session};

pub mod body;
pub mod range;

pub use body::SpanStream;
pub use range::{RangeOutcome, resolve};

pub const DEFAULT_MIME: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("file index {index} out of range ({count} files)")]
    FileNotFound { index: usize, count: usize },
    #[error("failed to open stream: {0}")]
    Open(#[source] EngineError),
}

/// Builds the full response for `GET /api/stream/..`.
///
/// The engine read is opened before any header is produced, so open failures
/// still become a proper error status. After that the body owns the read
/// handle until it completes or the client disconnects.
pub async fn stream_file(
    session: &dyn Session,
    file_index: usize,
    range_header: Option<&str>,
) -> Result<Response, StreamError> {
    let files = session.files();
    let count = files.len();
    let file = files
        .into_iter()
        .nth(file_index)
        .ok_or(StreamError::FileNotFound {
            index: file_index,
            count,
        })?;
    let length = file.length;
    let mime = file.mime.as_deref().unwrap_or(DEFAULT_MIME);
    let info_hash = session.info_hash();

    let (status, span) = match range::resolve(range_header, length) {
        RangeOutcome::Unsatisfiable => {
            tracing::debug!(
                info_hash = %info_hash,
                file_index,
                length,
                range = range_header.unwrap_or_default(),
                "unsatisfiable range"
            );
            return Ok(unsatisfiable(length));
        }
        RangeOutcome::Partial(span) => (StatusCode::PARTIAL_CONTENT, Some(span)),
        RangeOutcome::Full => (StatusCode::OK, ByteRange::full(length)),
    };

    let mut builder = Response::builder()
        .status(status)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_TYPE, content_type(mime));

    let Some(span) = span else {
        // Whole-file request on an empty file: nothing to open.
        return Ok(builder
            .header(header::CONTENT_LENGTH, 0)
            .body(Body::empty())
            .unwrap_or_else(|_| internal_error()));
    };

    let reader = session
        .open_read_stream(file_index, span)
        .await
        .map_err(StreamError::Open)?;

    if status == StatusCode::PARTIAL_CONTENT {
        builder = builder.header(
            header::CONTENT_RANGE,
            format!("bytes {}-{}/{}", span.start, span.end, length),
        );
    }
    tracing::debug!(
        info_hash = %info_hash,
        file_index,
        start = span.start,
        end = span.end,
        length,
        partial = status == StatusCode::PARTIAL_CONTENT,
        "streaming file"
    );

    let body = SpanStream::new(reader, span.byte_count(), info_hash, file_index);
    Ok(builder
        .header(header::CONTENT_LENGTH, span.byte_count())
        .body(Body::from_stream(body))
        .unwrap_or_else(|_| internal_error()))
}

fn content_type(mime: &str) -> HeaderValue {
    HeaderValue::from_str(mime).unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_MIME))
}

fn unsatisfiable(length: u64) -> Response {
    Response::builder()
        .status(StatusCode::RANGE_NOT_SATISFIABLE)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_RANGE, format!("bytes */{length}"))
        .body(Body::empty())
        .unwrap_or_else(|_| internal_error())
}

fn internal_error() -> Response {
    let mut resp = Response::new(Body::empty());
    *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    resp
}
