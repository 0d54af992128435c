use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};

use crate::{api::ApiState, history::HistoryPage};

/// Raw strings so that junk values fall back to defaults instead of
/// rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct HistoryQuery {
    #[serde(default)]
    pub(crate) page: Option<String>,
    #[serde(default)]
    pub(crate) limit: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct MessageResponse {
    pub(crate) message: &'static str,
}

pub(crate) async fn history_list(
    State(state): State<ApiState>,
    Query(query): Query<HistoryQuery>,
) -> Json<HistoryPage> {
    let page = positive_or(query.page.as_deref(), 1);
    let limit = positive_or(query.limit.as_deref(), state.default_page_size);
    Json(state.history.list(page, limit).await)
}

pub(crate) async fn history_clear(State(state): State<ApiState>) -> Json<MessageResponse> {
    state.history.clear().await;
    tracing::info!("history cleared");
    Json(MessageResponse {
        message: "History cleared",
    })
}

pub(crate) fn positive_or(raw: Option<&str>, default: usize) -> usize {
    raw.and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(default)
}
