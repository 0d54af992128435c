use std::{
    collections::HashMap,
    io::SeekFrom,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, Weak},
};

use async_trait::async_trait;
use tokio::{
    io::{AsyncReadExt as _, AsyncSeekExt as _},
    sync::watch,
};

use crate::{
    engine::{ByteRange, Engine, EngineError, ReadStream, Session, SessionFile, SessionStats},
    magnet::{self, InfoHash, MagnetLink},
};

type SessionMap = Mutex<HashMap<InfoHash, Arc<LocalSession>>>;

/// Engine backed by already-complete content on disk.
///
/// A session for info hash `H` exists when `<content_dir>/<H as hex>/` holds
/// at least one file. No peers are contacted; every session reports full
/// progress. Removing a file under a live session fails that session.
pub struct LocalEngine {
    content_dir: PathBuf,
    sessions: Arc<SessionMap>,
}

impl LocalEngine {
    pub fn new(content_dir: impl Into<PathBuf>) -> Self {
        Self {
            content_dir: content_dir.into(),
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn content_dir(&self) -> &Path {
        &self.content_dir
    }
}

fn lock_sessions(map: &SessionMap) -> MutexGuard<'_, HashMap<InfoHash, Arc<LocalSession>>> {
    match map.lock() {
        Ok(g) => g,
        Err(poisoned) => {
            tracing::warn!("local engine session lock poisoned; continuing with recovered state");
            poisoned.into_inner()
        }
    }
}

#[async_trait]
impl Engine for LocalEngine {
    async fn add_session(&self, identifier: &str) -> Result<Arc<dyn Session>, EngineError> {
        let link = magnet::parse_identifier(identifier)
            .map_err(|e| EngineError::InvalidIdentifier(e.to_string()))?;

        let existing = lock_sessions(&self.sessions).get(&link.info_hash).cloned();
        if let Some(existing) = existing {
            let existing: Arc<dyn Session> = existing;
            return Ok(existing);
        }

        let root = self.content_dir.join(link.info_hash.to_hex_lower());
        let files = scan_content(&root).await?;
        tracing::debug!(
            info_hash = %link.info_hash,
            root = %root.display(),
            files = files.len(),
            trackers = link.trackers.len(),
            "local content resolved"
        );

        let fresh = Arc::new(LocalSession::new(link, files, Arc::downgrade(&self.sessions)));
        let session: Arc<dyn Session> = lock_sessions(&self.sessions)
            .entry(fresh.info_hash)
            .or_insert(fresh)
            .clone();
        Ok(session)
    }

    fn get_session(&self, info_hash: &InfoHash) -> Option<Arc<dyn Session>> {
        let session: Arc<dyn Session> = lock_sessions(&self.sessions).get(info_hash).cloned()?;
        Some(session)
    }
}

struct LocalFile {
    meta: SessionFile,
    abs_path: PathBuf,
}

pub struct LocalSession {
    info_hash: InfoHash,
    name: Option<String>,
    files: Vec<LocalFile>,
    errors_tx: watch::Sender<Option<String>>,
    owner: Weak<SessionMap>,
}

impl LocalSession {
    fn new(link: MagnetLink, files: Vec<LocalFile>, owner: Weak<SessionMap>) -> Self {
        let name = link.display_name.or_else(|| match files.as_slice() {
            [only] => Some(only.meta.name.clone()),
            _ => None,
        });
        let (errors_tx, _errors_rx) = watch::channel(None);
        Self {
            info_hash: link.info_hash,
            name,
            files,
            errors_tx,
            owner,
        }
    }

    fn fail(&self, reason: String) {
        tracing::warn!(info_hash = %self.info_hash, reason = %reason, "local session failed");
        if let Some(owner) = self.owner.upgrade() {
            lock_sessions(&owner).remove(&self.info_hash);
        }
        self.errors_tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }
}

#[async_trait]
impl Session for LocalSession {
    fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    fn files(&self) -> Vec<SessionFile> {
        self.files.iter().map(|f| f.meta.clone()).collect()
    }

    fn stats(&self) -> SessionStats {
        SessionStats {
            downloaded: self.length(),
            download_speed: 0.0,
            upload_speed: 0.0,
            progress: 1.0,
            num_peers: 0,
        }
    }

    fn errors(&self) -> watch::Receiver<Option<String>> {
        self.errors_tx.subscribe()
    }

    async fn open_read_stream(
        &self,
        file_index: usize,
        range: ByteRange,
    ) -> Result<ReadStream, EngineError> {
        let file = self.files.get(file_index).ok_or(EngineError::FileIndex {
            index: file_index,
            count: self.files.len(),
        })?;
        if range.start > range.end || range.end >= file.meta.length {
            return Err(EngineError::Read(format!(
                "range {}-{} outside file of {} bytes",
                range.start, range.end, file.meta.length
            )));
        }

        let mut handle = match tokio::fs::File::open(&file.abs_path).await {
            Ok(h) => h,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let reason = format!("content file vanished: {}", file.meta.path);
                self.fail(reason.clone());
                return Err(EngineError::Unavailable(reason));
            }
            Err(err) => return Err(EngineError::Read(err.to_string())),
        };
        handle
            .seek(SeekFrom::Start(range.start))
            .await
            .map_err(|e| EngineError::Read(e.to_string()))?;
        Ok(Box::pin(handle.take(range.byte_count())))
    }
}

async fn scan_content(root: &Path) -> Result<Vec<LocalFile>, EngineError> {
    let mut out = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut rd = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(err) if dir == root && err.kind() == std::io::ErrorKind::NotFound => {
                return Err(EngineError::Unavailable(format!(
                    "no content available at {}",
                    root.display()
                )));
            }
            Err(err) => {
                return Err(EngineError::Unavailable(format!(
                    "failed to read {}: {err}",
                    dir.display()
                )));
            }
        };
        while let Some(entry) = rd
            .next_entry()
            .await
            .map_err(|e| EngineError::Unavailable(format!("failed to read {}: {e}", dir.display())))?
        {
            let path = entry.path();
            let meta = entry
                .metadata()
                .await
                .map_err(|e| EngineError::Unavailable(format!("failed to stat {}: {e}", path.display())))?;
            if meta.is_dir() {
                pending.push(path);
            } else if meta.is_file() {
                out.push(local_file(root, path, meta.len()));
            }
        }
    }

    if out.is_empty() {
        return Err(EngineError::Unavailable(format!(
            "no files under {}",
            root.display()
        )));
    }
    out.sort_by(|a, b| a.meta.path.cmp(&b.meta.path));
    Ok(out)
}

fn local_file(root: &Path, abs_path: PathBuf, length: u64) -> LocalFile {
    let rel = abs_path.strip_prefix(root).unwrap_or(&abs_path);
    let path = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    let name = abs_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.clone());
    let mime = mime_guess::from_path(&name).first_raw().map(str::to_string);
    LocalFile {
        meta: SessionFile {
            name,
            length,
            path,
            mime,
        },
        abs_path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt as _;

    const HASH: &str = "0123456789abcdef0123456789abcdef01234567";

    fn temp_dir(tag: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        p.push(format!("magnet-stream-local-{tag}-{nanos}"));
        p
    }

    async fn seed(root: &Path) {
        let dir = root.join(HASH);
        tokio::fs::create_dir_all(dir.join("extras"))
            .await
            .expect("mkdir");
        let movie: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        tokio::fs::write(dir.join("movie.mp4"), &movie)
            .await
            .expect("write movie");
        tokio::fs::write(dir.join("extras/notes.txt"), b"hello")
            .await
            .expect("write notes");
    }

    async fn read_all(mut stream: ReadStream) -> Vec<u8> {
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.expect("read");
        out
    }

    #[tokio::test]
    async fn add_session_lists_files_sorted_with_mime() {
        let root = temp_dir("list");
        seed(&root).await;
        let engine = LocalEngine::new(&root);

        let session = engine
            .add_session(&format!("magnet:?xt=urn:btih:{HASH}&dn=Demo"))
            .await
            .expect("add");
        assert_eq!(session.info_hash().to_hex_lower(), HASH);
        assert_eq!(session.name().as_deref(), Some("Demo"));

        let files = session.files();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "extras/notes.txt");
        assert_eq!(files[0].mime.as_deref(), Some("text/plain"));
        assert_eq!(files[1].path, "movie.mp4");
        assert_eq!(files[1].length, 1000);
        assert_eq!(files[1].mime.as_deref(), Some("video/mp4"));
        assert_eq!(session.length(), 1005);
        assert_eq!(session.stats().downloaded, 1005);

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn add_session_is_idempotent_by_info_hash() {
        let root = temp_dir("idem");
        seed(&root).await;
        let engine = LocalEngine::new(&root);

        let a = engine.add_session(HASH).await.expect("add bare");
        let b = engine
            .add_session(&magnet::magnet_uri_for(a.info_hash()))
            .await
            .expect("add magnet");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(engine.get_session(&a.info_hash()).is_some());

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn missing_content_fails_add() {
        let root = temp_dir("missing");
        let engine = LocalEngine::new(&root);
        let err = match engine.add_session(HASH).await {
            Err(err) => err,
            Ok(_) => panic!("expected add to fail"),
        };
        assert!(matches!(err, EngineError::Unavailable(_)));

        let err = match engine.add_session("magnet:?dn=nothing").await {
            Err(err) => err,
            Ok(_) => panic!("expected add to fail"),
        };
        assert!(matches!(err, EngineError::InvalidIdentifier(_)));
    }

    #[tokio::test]
    async fn reads_exact_inclusive_range() {
        let root = temp_dir("range");
        seed(&root).await;
        let engine = LocalEngine::new(&root);
        let session = engine.add_session(HASH).await.expect("add");

        let stream = session
            .open_read_stream(1, ByteRange { start: 10, end: 19 })
            .await
            .expect("open");
        let bytes = read_all(stream).await;
        let expected: Vec<u8> = (10..20u32).map(|i| (i % 251) as u8).collect();
        assert_eq!(bytes, expected);

        let err = match session.open_read_stream(1, ByteRange { start: 0, end: 1000 }).await {
            Err(err) => err,
            Ok(_) => panic!("expected out of range read to fail"),
        };
        assert!(matches!(err, EngineError::Read(_)));
        let err = match session.open_read_stream(7, ByteRange { start: 0, end: 0 }).await {
            Err(err) => err,
            Ok(_) => panic!("expected bad index to fail"),
        };
        assert_eq!(err, EngineError::FileIndex { index: 7, count: 2 });

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn vanished_file_fails_session() {
        let root = temp_dir("vanish");
        seed(&root).await;
        let engine = LocalEngine::new(&root);
        let session = engine.add_session(HASH).await.expect("add");
        let mut errors = session.errors();
        assert!(errors.borrow().is_none());

        tokio::fs::remove_file(root.join(HASH).join("movie.mp4"))
            .await
            .expect("rm");
        let res = session
            .open_read_stream(1, ByteRange { start: 0, end: 9 })
            .await;
        assert!(matches!(res, Err(EngineError::Unavailable(_))));

        errors.changed().await.expect("error published");
        assert!(errors.borrow().is_some());
        assert!(engine.get_session(&session.info_hash()).is_none());

        let _ = std::fs::remove_dir_all(root);
    }
}
