use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::api::{
    ApiState,
    cors::{CorsPolicy, cors_mw},
    error::error_envelope_mw,
    handlers::{add_torrent, health, history_clear, history_list, stream, torrent_info},
};

pub(crate) fn build_app(state: ApiState, cors: CorsPolicy) -> Router<()> {
    let api = Router::new()
        .route("/health", get(health))
        .route("/add-torrent", post(add_torrent))
        .route("/torrent/:info_hash", get(torrent_info))
        .route("/stream/:info_hash/:file_index", get(stream))
        .route("/history", get(history_list).delete(history_clear));

    Router::new()
        .nest("/api", api)
        .with_state(state)
        .layer(middleware::from_fn_with_state(cors, cors_mw))
        .layer(middleware::from_fn(error_envelope_mw))
}
