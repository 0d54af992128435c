use chrono::{DateTime, SubsecRound as _, Utc};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use crate::{engine::Session, history::HistoryRecord, magnet::InfoHash};

pub const UNKNOWN_TITLE: &str = "Unknown Title";

const THUMBNAIL_TITLE_CHARS: usize = 20;

/// Builds the history entry for a freshly resolved session.
pub fn extract_record(session: &dyn Session, identifier: &str) -> HistoryRecord {
    record_at(session, identifier, Utc::now().trunc_subsecs(3))
}

pub fn record_at(session: &dyn Session, identifier: &str, now: DateTime<Utc>) -> HistoryRecord {
    let info_hash = session.info_hash();
    let title = session
        .name()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| UNKNOWN_TITLE.to_string());

    HistoryRecord {
        thumbnail: thumbnail_for(info_hash, &title),
        title,
        info_hash,
        created_at: now,
        magnet_uri: Some(identifier.to_string()),
    }
}

/// Placeholder poster URL. The background colour comes from the first three
/// hash bytes so every resource keeps the same tile across restarts.
pub fn thumbnail_for(info_hash: InfoHash, title: &str) -> String {
    let [r, g, b, ..] = info_hash.0;
    let label: String = title.chars().take(THUMBNAIL_TITLE_CHARS).collect();
    format!(
        "https://via.placeholder.com/300x450/{r:02x}{g:02x}{b:02x}/fff?text={}",
        utf8_percent_encode(&label, NON_ALPHANUMERIC)
    )
}
