use std::{pin::Pin, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{io::AsyncRead, sync::watch};

use crate::magnet::InfoHash;

pub mod local;

#[cfg(test)]
pub(crate) mod testing;

pub use local::LocalEngine;

/// Byte stream over part of one file. Dropping it releases the engine-side handle.
pub type ReadStream = Pin<Box<dyn AsyncRead + Send + 'static>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("file index {index} out of range ({count} files)")]
    FileIndex { index: usize, count: usize },
    #[error("read failed: {0}")]
    Read(String),
}

/// Inclusive byte span inside a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn full(length: u64) -> Option<Self> {
        (length > 0).then(|| Self {
            start: 0,
            end: length - 1,
        })
    }

    pub fn byte_count(&self) -> u64 {
        self.end - self.start + 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFile {
    pub name: String,
    pub length: u64,
    /// Path relative to the session root, `/`-separated.
    pub path: String,
    pub mime: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SessionStats {
    pub downloaded: u64,
    pub download_speed: f64,
    pub upload_speed: f64,
    pub progress: f64,
    pub num_peers: usize,
}

#[async_trait]
pub trait Session: Send + Sync + 'static {
    fn info_hash(&self) -> InfoHash;

    fn name(&self) -> Option<String>;

    fn files(&self) -> Vec<SessionFile>;

    fn length(&self) -> u64 {
        self.files().iter().map(|f| f.length).sum()
    }

    fn stats(&self) -> SessionStats;

    /// Terminal session failure. Holds `None` while the session is healthy;
    /// the engine publishes `Some(reason)` once and never clears it.
    fn errors(&self) -> watch::Receiver<Option<String>>;

    async fn open_read_stream(
        &self,
        file_index: usize,
        range: ByteRange,
    ) -> Result<ReadStream, EngineError>;
}

#[async_trait]
pub trait Engine: Send + Sync + 'static {
    /// Resolves once the engine knows the session's metadata. Adding an
    /// identifier the engine already tracks returns the existing session.
    async fn add_session(&self, identifier: &str) -> Result<Arc<dyn Session>, EngineError>;

    fn get_session(&self, info_hash: &InfoHash) -> Option<Arc<dyn Session>>;
}
