mod core;
mod history;
mod stream;
mod torrents;

use std::sync::Arc;

pub(crate) use core::health;
pub(crate) use history::{history_clear, history_list};
pub(crate) use stream::stream;
pub(crate) use torrents::{add_torrent, torrent_info};

use crate::{
    api::{ApiState, error::ApiError},
    engine::Session,
    magnet::InfoHash,
    registry::RegistryError,
};

/// Path hash → live session, re-creating it from history when needed.
/// A hash that does not parse can never match, so it is a plain 404.
pub(crate) async fn resolve_session(
    state: &ApiState,
    raw_hash: &str,
) -> Result<Arc<dyn Session>, ApiError> {
    let Ok(info_hash) = raw_hash.trim().parse::<InfoHash>() else {
        return Err(ApiError::not_found("Torrent not found"));
    };
    state
        .registry
        .get(&info_hash)
        .await
        .map_err(|err| match err {
            RegistryError::NotFound(_) => ApiError::not_found("Torrent not found"),
            RegistryError::EngineAddFailed { cause, .. } => {
                ApiError::internal(format!("Failed to re-add torrent: {cause}"))
            }
        })
}
