use std::path::{Path, PathBuf};

use crate::history::HistoryRecord;

pub type Result<T> = std::result::Result<T, HistoryStoreError>;

#[derive(Debug, thiserror::Error)]
pub enum HistoryStoreError {
    #[error("failed to read history file '{}': {source}", path.display())]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse history file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to serialize history: {source}")]
    Serialize { source: serde_json::Error },
    #[error("failed to write history file '{}': {source}", path.display())]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to copy '{}' to '{}': {source}", from.display(), to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to rename '{}' to '{}': {source}", from.display(), to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to create directory '{}': {source}", path.display())]
    EnsureDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadedFrom {
    Primary,
    Backup,
}

/// Writes the whole sequence as pretty JSON.
///
/// The previous snapshot is kept as `<path>.bak` and the new one is written to
/// `<path>.tmp` and renamed into place, so a crash mid-write leaves either the
/// old or the new file intact.
pub async fn save_history(path: &Path, records: &[HistoryRecord]) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(records)
        .map_err(|source| HistoryStoreError::Serialize { source })?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| HistoryStoreError::EnsureDir {
                path: parent.to_path_buf(),
                source,
            })?;
    }

    if path.exists() {
        let bak = backup_path(path);
        tokio::fs::copy(path, &bak)
            .await
            .map_err(|source| HistoryStoreError::Copy {
                from: path.to_path_buf(),
                to: bak,
                source,
            })?;
    }

    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, &bytes)
        .await
        .map_err(|source| HistoryStoreError::WriteFile {
            path: tmp.clone(),
            source,
        })?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|source| HistoryStoreError::Rename {
            from: tmp,
            to: path.to_path_buf(),
            source,
        })?;
    Ok(())
}

/// `Ok(None)` when neither the file nor its backup exist (first run).
pub async fn load_history(path: &Path) -> Result<Option<(Vec<HistoryRecord>, LoadedFrom)>> {
    let bak = backup_path(path);
    if !path.exists() && !bak.exists() {
        return Ok(None);
    }

    match read_records(path).await {
        Ok(records) => Ok(Some((records, LoadedFrom::Primary))),
        Err(primary_err) => {
            if !bak.exists() {
                return Err(primary_err);
            }
            match read_records(&bak).await {
                Ok(records) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %primary_err,
                        "history file unreadable; recovered from backup"
                    );
                    Ok(Some((records, LoadedFrom::Backup)))
                }
                Err(_) => Err(primary_err),
            }
        }
    }
}

async fn read_records(path: &Path) -> Result<Vec<HistoryRecord>> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| HistoryStoreError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_slice(&bytes).map_err(|source| HistoryStoreError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn backup_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(".bak");
    PathBuf::from(s)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(".tmp");
    PathBuf::from(s)
}
