use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};

use crate::{
    api::{
        ApiState,
        error::{ApiError, parse_json_with_limit},
        handlers::resolve_session,
    },
    gateway::DEFAULT_MIME,
    logging::shorten_identifier,
    registry::RegistryError,
};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AddTorrentRequest {
    #[serde(rename = "magnetURI", default)]
    pub(crate) magnet_uri: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AddTorrentResponse {
    pub(crate) info_hash: String,
    pub(crate) status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TorrentFileJson {
    pub(crate) name: String,
    pub(crate) length: u64,
    pub(crate) path: String,
    pub(crate) mime: String,
    pub(crate) index: usize,
    pub(crate) stream_url: String,
    pub(crate) vlc_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TorrentInfoResponse {
    pub(crate) info_hash: String,
    pub(crate) name: String,
    pub(crate) length: u64,
    pub(crate) downloaded: u64,
    pub(crate) download_speed: f64,
    pub(crate) upload_speed: f64,
    pub(crate) progress: f64,
    pub(crate) num_peers: usize,
    pub(crate) files: Vec<TorrentFileJson>,
}

pub(crate) async fn add_torrent(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<Json<AddTorrentResponse>, ApiError> {
    // An empty body reads as a request without the field.
    let req: AddTorrentRequest = if body.iter().all(u8::is_ascii_whitespace) {
        AddTorrentRequest::default()
    } else {
        parse_json_with_limit(body, state.max_json_body_bytes)?
    };
    let Some(magnet_uri) = req
        .magnet_uri
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
    else {
        return Err(ApiError::bad_request("Magnet URI is required"));
    };

    match state.registry.add_or_get(&magnet_uri).await {
        Ok((info_hash, status)) => {
            tracing::info!(
                info_hash = %info_hash,
                status = status.as_str(),
                "add-torrent request completed"
            );
            Ok(Json(AddTorrentResponse {
                info_hash: info_hash.to_hex_lower(),
                status: status.as_str(),
            }))
        }
        Err(err) => {
            tracing::warn!(
                identifier = %shorten_identifier(&magnet_uri),
                error = %err,
                "add-torrent request failed"
            );
            let cause = match err {
                RegistryError::EngineAddFailed { cause, .. } => cause.to_string(),
                other => other.to_string(),
            };
            Err(ApiError::internal(format!("Failed to add torrent: {cause}")))
        }
    }
}

pub(crate) async fn torrent_info(
    State(state): State<ApiState>,
    Path(info_hash): Path<String>,
) -> Result<Json<TorrentInfoResponse>, ApiError> {
    let session = resolve_session(&state, &info_hash).await?;
    let info_hash = session.info_hash().to_hex_lower();
    let stats = session.stats();

    let files = session
        .files()
        .into_iter()
        .enumerate()
        .map(|(index, f)| {
            let stream_url = format!("/api/stream/{info_hash}/{index}");
            TorrentFileJson {
                vlc_url: format!("{}{stream_url}", state.public_base_url),
                stream_url,
                mime: f.mime.unwrap_or_else(|| DEFAULT_MIME.to_string()),
                name: f.name,
                length: f.length,
                path: f.path,
                index,
            }
        })
        .collect::<Vec<_>>();

    Ok(Json(TorrentInfoResponse {
        name: session.name().unwrap_or_default(),
        length: session.length(),
        downloaded: stats.downloaded,
        download_speed: stats.download_speed,
        upload_speed: stats.upload_speed,
        progress: stats.progress,
        num_peers: stats.num_peers,
        files,
        info_hash,
    }))
}
