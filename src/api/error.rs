use axum::{
    Json,
    body::Body,
    body::Bytes,
    extract::Request,
    http::StatusCode,
    http::header::CONTENT_TYPE,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub(crate) struct ApiErrorEnvelope {
    pub(crate) error: String,
}

/// Handler error carrying the status and the message sent to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ApiError {
    pub(crate) status: StatusCode,
    pub(crate) message: String,
}

impl ApiError {
    pub(crate) fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<StatusCode> for ApiError {
    fn from(status: StatusCode) -> Self {
        Self::new(status, message_for_status(status))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ApiErrorEnvelope {
                error: self.message,
            }),
        )
            .into_response()
    }
}

pub(crate) fn message_for_status(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "bad request",
        StatusCode::FORBIDDEN => "forbidden",
        StatusCode::NOT_FOUND => "not found",
        StatusCode::METHOD_NOT_ALLOWED => "method not allowed",
        StatusCode::PAYLOAD_TOO_LARGE => "request body too large",
        StatusCode::UNSUPPORTED_MEDIA_TYPE => "unsupported media type",
        StatusCode::RANGE_NOT_SATISFIABLE => "range not satisfiable",
        StatusCode::UNPROCESSABLE_ENTITY => "unprocessable entity",
        StatusCode::SERVICE_UNAVAILABLE => "service unavailable",
        StatusCode::INTERNAL_SERVER_ERROR => "internal server error",
        _ => "request failed",
    }
}

pub(crate) fn parse_json_with_limit<T: serde::de::DeserializeOwned>(
    bytes: Bytes,
    max_bytes: usize,
) -> Result<T, ApiError> {
    if bytes.len() > max_bytes {
        return Err(StatusCode::PAYLOAD_TOO_LARGE.into());
    }
    serde_json::from_slice::<T>(&bytes)
        .map_err(|err| ApiError::bad_request(format!("invalid JSON body: {err}")))
}

/// Gives bodiless `/api/` failures (unknown routes, wrong methods, extractor
/// rejections, 416s) the same `{ "error": .. }` shape handlers produce.
pub(crate) async fn error_envelope_mw(req: Request<Body>, next: Next) -> Response {
    let is_api = req.uri().path().starts_with("/api/");
    let resp = next.run(req).await;
    if !is_api {
        return resp;
    }
    if resp.status().is_success() {
        return resp;
    }
    let has_json_body = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|h| h.to_str().ok())
        .map(|ct| ct.to_ascii_lowercase().starts_with("application/json"))
        .unwrap_or(false);
    if has_json_body {
        return resp;
    }

    let status = resp.status();
    let envelope_resp = ApiError::from(status).into_response();
    let (mut orig_parts, _orig_body) = resp.into_parts();
    let (envelope_parts, envelope_body) = envelope_resp.into_parts();
    orig_parts.headers.remove(axum::http::header::CONTENT_LENGTH);
    orig_parts.headers.extend(envelope_parts.headers);
    Response::from_parts(orig_parts, envelope_body)
}
