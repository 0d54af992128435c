use std::{
    collections::HashMap,
    io,
    pin::Pin,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    task::{Context, Poll},
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, ReadBuf},
    sync::watch,
};

use crate::{
    engine::{ByteRange, Engine, EngineError, ReadStream, Session, SessionFile, SessionStats},
    magnet::{self, InfoHash},
};

/// Counts read handles so tests can prove they were released.
#[derive(Debug, Default)]
pub(crate) struct ReadProbe {
    pub(crate) opened: AtomicUsize,
    pub(crate) closed: AtomicUsize,
    pub(crate) bytes_served: AtomicU64,
}

impl ReadProbe {
    pub(crate) fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub(crate) fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn bytes_served(&self) -> u64 {
        self.bytes_served.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum ReadBehavior {
    #[default]
    Normal,
    /// Ends the stream after this many bytes regardless of the requested span.
    ShortAfter(u64),
    /// Yields an I/O error after this many bytes.
    ErrorAfter(u64),
}

#[derive(Debug, Clone)]
pub(crate) struct FakeFile {
    pub(crate) meta: SessionFile,
    pub(crate) data: Arc<Vec<u8>>,
}

impl FakeFile {
    pub(crate) fn new(name: &str, mime: Option<&str>, data: Vec<u8>) -> Self {
        Self {
            meta: SessionFile {
                name: name.to_string(),
                length: data.len() as u64,
                path: name.to_string(),
                mime: mime.map(str::to_string),
            },
            data: Arc::new(data),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FakeContent {
    pub(crate) name: Option<String>,
    pub(crate) files: Vec<FakeFile>,
}

pub(crate) struct FakeEngine {
    content: Mutex<HashMap<InfoHash, FakeContent>>,
    live: Mutex<HashMap<InfoHash, Arc<FakeSession>>>,
    add_calls: Mutex<Vec<String>>,
    add_delay: Mutex<Option<Duration>>,
    add_failure: Mutex<Option<String>>,
    open_failure: Mutex<Option<String>>,
    read_behavior: Mutex<ReadBehavior>,
    chunk_size: usize,
    probe: Arc<ReadProbe>,
}

impl FakeEngine {
    pub(crate) fn new() -> Self {
        Self {
            content: Mutex::new(HashMap::new()),
            live: Mutex::new(HashMap::new()),
            add_calls: Mutex::new(Vec::new()),
            add_delay: Mutex::new(None),
            add_failure: Mutex::new(None),
            open_failure: Mutex::new(None),
            read_behavior: Mutex::new(ReadBehavior::Normal),
            chunk_size: 100,
            probe: Arc::new(ReadProbe::default()),
        }
    }

    pub(crate) fn insert(&self, info_hash: InfoHash, content: FakeContent) {
        self.content.lock().unwrap().insert(info_hash, content);
    }

    pub(crate) fn set_add_delay(&self, delay: Duration) {
        *self.add_delay.lock().unwrap() = Some(delay);
    }

    pub(crate) fn set_add_failure(&self, reason: Option<&str>) {
        *self.add_failure.lock().unwrap() = reason.map(str::to_string);
    }

    /// Makes `open_read_stream` fail on sessions built after this call.
    pub(crate) fn set_open_failure(&self, reason: Option<&str>) {
        *self.open_failure.lock().unwrap() = reason.map(str::to_string);
    }

    pub(crate) fn set_read_behavior(&self, behavior: ReadBehavior) {
        *self.read_behavior.lock().unwrap() = behavior;
    }

    pub(crate) fn add_calls(&self) -> Vec<String> {
        self.add_calls.lock().unwrap().clone()
    }

    pub(crate) fn probe(&self) -> Arc<ReadProbe> {
        self.probe.clone()
    }

    pub(crate) fn live_session(&self, info_hash: &InfoHash) -> Option<Arc<FakeSession>> {
        self.live.lock().unwrap().get(info_hash).cloned()
    }

    /// Starts a session without going through `add_session`, as if another
    /// client of the engine had added it.
    pub(crate) fn spawn_detached(&self, info_hash: InfoHash) -> Arc<FakeSession> {
        let content = self.content.lock().unwrap().get(&info_hash).cloned();
        let session = Arc::new(self.build_session(info_hash, content.expect("content")));
        self.live.lock().unwrap().insert(info_hash, session.clone());
        session
    }

    fn build_session(&self, info_hash: InfoHash, content: FakeContent) -> FakeSession {
        let (errors_tx, _rx) = watch::channel(None);
        FakeSession {
            info_hash,
            content,
            errors_tx,
            probe: self.probe.clone(),
            chunk_size: self.chunk_size,
            read_behavior: *self.read_behavior.lock().unwrap(),
            open_failure: self.open_failure.lock().unwrap().clone(),
        }
    }
}

#[async_trait]
impl Engine for FakeEngine {
    async fn add_session(&self, identifier: &str) -> Result<Arc<dyn Session>, EngineError> {
        self.add_calls.lock().unwrap().push(identifier.to_string());
        let delay = *self.add_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self.add_failure.lock().unwrap().clone();
        if let Some(reason) = failure {
            return Err(EngineError::Unavailable(reason));
        }

        let link = magnet::parse_identifier(identifier)
            .map_err(|e| EngineError::InvalidIdentifier(e.to_string()))?;
        let content = self
            .content
            .lock()
            .unwrap()
            .get(&link.info_hash)
            .cloned()
            .ok_or_else(|| EngineError::Unavailable("no peers".to_string()))?;
        let session = Arc::new(self.build_session(link.info_hash, content));
        self.live
            .lock()
            .unwrap()
            .insert(link.info_hash, session.clone());
        let session: Arc<dyn Session> = session;
        Ok(session)
    }

    fn get_session(&self, info_hash: &InfoHash) -> Option<Arc<dyn Session>> {
        let session: Arc<dyn Session> = self.live.lock().unwrap().get(info_hash).cloned()?;
        Some(session)
    }
}

pub(crate) struct FakeSession {
    info_hash: InfoHash,
    content: FakeContent,
    errors_tx: watch::Sender<Option<String>>,
    probe: Arc<ReadProbe>,
    chunk_size: usize,
    read_behavior: ReadBehavior,
    open_failure: Option<String>,
}

impl FakeSession {
    pub(crate) fn fail(&self, reason: &str) {
        let _ = self.errors_tx.send(Some(reason.to_string()));
    }
}

#[async_trait]
impl Session for FakeSession {
    fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    fn name(&self) -> Option<String> {
        self.content.name.clone()
    }

    fn files(&self) -> Vec<SessionFile> {
        self.content.files.iter().map(|f| f.meta.clone()).collect()
    }

    fn stats(&self) -> SessionStats {
        SessionStats {
            downloaded: self.length() / 2,
            download_speed: 1024.0,
            upload_speed: 256.0,
            progress: 0.5,
            num_peers: 3,
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
        let file = self
            .content
            .files
            .get(file_index)
            .ok_or(EngineError::FileIndex {
                index: file_index,
                count: self.content.files.len(),
            })?;
        if let Some(reason) = &self.open_failure {
            return Err(EngineError::Read(reason.clone()));
        }
        if range.end >= file.meta.length {
            return Err(EngineError::Read("range past end of file".to_string()));
        }
        self.probe.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::pin(ProbeReader {
            data: file.data.clone(),
            pos: range.start as usize,
            end: range.end as usize + 1,
            served: 0,
            chunk_size: self.chunk_size,
            behavior: self.read_behavior,
            probe: self.probe.clone(),
        }))
    }
}

struct ProbeReader {
    data: Arc<Vec<u8>>,
    pos: usize,
    end: usize,
    served: u64,
    chunk_size: usize,
    behavior: ReadBehavior,
    probe: Arc<ReadProbe>,
}

impl AsyncRead for ProbeReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let mut limit = this.end.saturating_sub(this.pos).min(this.chunk_size);
        match this.behavior {
            ReadBehavior::Normal => {}
            ReadBehavior::ShortAfter(max) => {
                let left = max.saturating_sub(this.served) as usize;
                limit = limit.min(left);
            }
            ReadBehavior::ErrorAfter(max) => {
                if this.served >= max {
                    return Poll::Ready(Err(io::Error::other("peer went away")));
                }
                let left = (max - this.served) as usize;
                limit = limit.min(left);
            }
        }
        let n = limit.min(buf.remaining());
        buf.put_slice(&this.data[this.pos..this.pos + n]);
        this.pos += n;
        this.served += n as u64;
        this.probe
            .bytes_served
            .fetch_add(n as u64, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}

impl Drop for ProbeReader {
    fn drop(&mut self) {
        self.probe.closed.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) fn hash(n: u8) -> InfoHash {
    InfoHash([n; 20])
}

pub(crate) fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// One 1000-byte video file named after the hash byte.
pub(crate) fn single_file_content(name: &str) -> FakeContent {
    FakeContent {
        name: Some(name.to_string()),
        files: vec![FakeFile::new(
            &format!("{name}.mp4"),
            Some("video/mp4"),
            patterned(1000),
        )],
    }
}
