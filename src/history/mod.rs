use std::{path::PathBuf, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::magnet::InfoHash;

pub mod metadata;
pub mod store;

pub use metadata::{UNKNOWN_TITLE, extract_record};
pub use store::{HistoryStoreError, LoadedFrom};

pub const DEFAULT_MAX_ENTRIES: usize = 100;
pub const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub title: String,
    pub thumbnail: String,
    pub info_hash: InfoHash,
    pub created_at: DateTime<Utc>,
    /// Identifier the resource was first requested with. Carries tracker
    /// hints a bare hash lacks, so recovery prefers it.
    #[serde(
        rename = "magnetURI",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub magnet_uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
    pub items_per_page: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryPage {
    pub history: Vec<HistoryRecord>,
    pub pagination: Pagination,
}

pub struct HistoryStore {
    path: PathBuf,
    max_entries: usize,
    // Held across the file write so snapshots land in mutation order.
    records: Mutex<Vec<HistoryRecord>>,
}

impl HistoryStore {
    /// Never fails: a missing or unreadable file starts an empty history.
    pub async fn load(path: impl Into<PathBuf>, max_entries: usize) -> Self {
        let path = path.into();
        let max_entries = max_entries.max(1);
        let mut records = match store::load_history(&path).await {
            Ok(Some((records, from))) => {
                tracing::info!(
                    path = %path.display(),
                    count = records.len(),
                    source = ?from,
                    "loaded history"
                );
                records
            }
            Ok(None) => {
                tracing::info!(path = %path.display(), "no history file yet; starting empty");
                Vec::new()
            }
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to load history; starting empty"
                );
                Vec::new()
            }
        };
        records.truncate(max_entries);

        Self {
            path,
            max_entries,
            records: Mutex::new(records),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub async fn prepend(&self, record: HistoryRecord) {
        let mut records = self.records.lock().await;
        records.insert(0, record);
        records.truncate(self.max_entries);
        self.persist(&records).await;
    }

    pub async fn clear(&self) {
        let mut records = self.records.lock().await;
        records.clear();
        self.persist(&records).await;
    }

    /// One-based page of at most `limit` records.
    pub async fn list(&self, page: usize, limit: usize) -> HistoryPage {
        let page = page.max(1);
        let limit = limit.max(1);
        let records = self.records.lock().await;
        let total = records.len();
        let start = (page - 1).saturating_mul(limit).min(total);
        let end = start.saturating_add(limit).min(total);

        HistoryPage {
            history: records[start..end].to_vec(),
            pagination: Pagination {
                current_page: page,
                total_pages: total.div_ceil(limit),
                total_items: total,
                items_per_page: limit,
            },
        }
    }

    /// Most recent record for `info_hash`.
    pub async fn find(&self, info_hash: &InfoHash) -> Option<HistoryRecord> {
        self.records
            .lock()
            .await
            .iter()
            .find(|r| r.info_hash == *info_hash)
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn persist(&self, records: &[HistoryRecord]) {
        if let Err(err) = store::save_history(&self.path, records).await {
            if crate::logging::warn_throttled("history_persist", Duration::from_secs(30)) {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "failed to persist history; keeping in-memory state"
                );
            }
        } else {
            tracing::debug!(path = %self.path.display(), count = records.len(), "history saved");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone as _, Utc};

    fn temp_path(tag: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        p.push(format!("magnet-stream-history-{tag}-{nanos}"));
        p.join("torrent_history.json")
    }

    fn record(n: u8) -> HistoryRecord {
        HistoryRecord {
            title: format!("item {n}"),
            thumbnail: String::new(),
            info_hash: InfoHash([n; 20]),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            magnet_uri: None,
        }
    }

    fn cleanup(path: &std::path::Path) {
        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[tokio::test]
    async fn prepend_puts_newest_first_for_any_page_size() {
        let path = temp_path("newest");
        let store = HistoryStore::load(&path, 100).await;
        store.prepend(record(1)).await;
        store.prepend(record(2)).await;

        for limit in [1, 2, 20] {
            let page = store.list(1, limit).await;
            assert_eq!(page.history[0].info_hash, InfoHash([2; 20]));
        }
        cleanup(&path);
    }

    #[tokio::test]
    async fn length_never_exceeds_cap() {
        let path = temp_path("cap");
        let store = HistoryStore::load(&path, 5).await;
        for n in 0..12u8 {
            store.prepend(record(n)).await;
            assert!(store.len().await <= 5);
        }
        let page = store.list(1, 10).await;
        let order: Vec<u8> = page.history.iter().map(|r| r.info_hash.0[0]).collect();
        assert_eq!(order, vec![11, 10, 9, 8, 7]);
        cleanup(&path);
    }

    #[tokio::test]
    async fn page_past_end_is_empty_with_true_total_pages() {
        let path = temp_path("past-end");
        let store = HistoryStore::load(&path, 100).await;
        for n in 0..45u8 {
            store.prepend(record(n)).await;
        }

        let page = store.list(2, 20).await;
        assert_eq!(page.history.len(), 20);
        let page = store.list(3, 20).await;
        assert_eq!(page.history.len(), 5);

        let page = store.list(9, 20).await;
        assert!(page.history.is_empty());
        assert_eq!(
            page.pagination,
            Pagination {
                current_page: 9,
                total_pages: 3,
                total_items: 45,
                items_per_page: 20,
            }
        );
        cleanup(&path);
    }

    #[tokio::test]
    async fn huge_limit_does_not_overflow() {
        let path = temp_path("huge");
        let store = HistoryStore::load(&path, 100).await;
        store.prepend(record(1)).await;
        let page = store.list(3, usize::MAX).await;
        assert!(page.history.is_empty());
        assert_eq!(page.pagination.total_pages, 1);
        cleanup(&path);
    }

    #[tokio::test]
    async fn state_survives_reload() {
        let path = temp_path("reload");
        {
            let store = HistoryStore::load(&path, 100).await;
            store.prepend(record(1)).await;
            store.prepend(record(2)).await;
        }
        let reloaded = HistoryStore::load(&path, 100).await;
        let page = reloaded.list(1, 20).await;
        assert_eq!(page.history, vec![record(2), record(1)]);
        assert_eq!(
            reloaded.find(&InfoHash([1; 20])).await.map(|r| r.title),
            Some("item 1".to_string())
        );
        cleanup(&path);
    }

    #[tokio::test]
    async fn clear_then_reload_is_empty() {
        let path = temp_path("clear");
        {
            let store = HistoryStore::load(&path, 100).await;
            store.prepend(record(1)).await;
            store.clear().await;
            assert!(store.is_empty().await);
        }
        let reloaded = HistoryStore::load(&path, 100).await;
        assert!(reloaded.is_empty().await);
        assert_eq!(reloaded.list(1, 20).await.pagination.total_pages, 0);
        cleanup(&path);
    }

    #[tokio::test]
    async fn corrupt_file_starts_empty() {
        let path = temp_path("corrupt");
        tokio::fs::create_dir_all(path.parent().unwrap())
            .await
            .expect("mkdir");
        tokio::fs::write(&path, b"{{{").await.expect("write");

        let store = HistoryStore::load(&path, 100).await;
        assert!(store.is_empty().await);
        store.prepend(record(7)).await;
        let reloaded = HistoryStore::load(&path, 100).await;
        assert_eq!(reloaded.len().await, 1);
        cleanup(&path);
    }

    #[tokio::test]
    async fn loading_more_than_cap_truncates_tail() {
        let path = temp_path("shrink");
        {
            let store = HistoryStore::load(&path, 10).await;
            for n in 0..10u8 {
                store.prepend(record(n)).await;
            }
        }
        let store = HistoryStore::load(&path, 3).await;
        let page = store.list(1, 10).await;
        let order: Vec<u8> = page.history.iter().map(|r| r.info_hash.0[0]).collect();
        assert_eq!(order, vec![9, 8, 7]);
        cleanup(&path);
    }
}
