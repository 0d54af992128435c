use axum::{
    extract::{Path, State},
    http::{HeaderMap, header},
    response::Response,
};

use crate::{
    api::{ApiState, error::ApiError, handlers::resolve_session},
    gateway::{self, StreamError},
};

pub(crate) async fn stream(
    State(state): State<ApiState>,
    Path((info_hash, file_index)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let session = resolve_session(&state, &info_hash).await?;
    let Ok(file_index) = file_index.trim().parse::<usize>() else {
        return Err(ApiError::not_found("File not found"));
    };
    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());

    gateway::stream_file(session.as_ref(), file_index, range)
        .await
        .map_err(|err| match err {
            StreamError::FileNotFound { .. } => ApiError::not_found("File not found"),
            StreamError::Open(cause) => {
                tracing::warn!(
                    info_hash = %session.info_hash(),
                    file_index,
                    error = %cause,
                    "failed to open stream"
                );
                ApiError::internal(format!("Streaming error: {cause}"))
            }
        })
}
