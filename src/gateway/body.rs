use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::Bytes;
use futures_util::Stream;
use tokio_util::io::ReaderStream;

use crate::{engine::ReadStream, magnet::InfoHash};

const CHUNK_SIZE: usize = 64 * 1024;

/// Response body over an engine read of exactly `expected` bytes.
///
/// The engine reader is polled only when hyper asks for the next chunk, so a
/// slow client throttles reads. A reader that ends early surfaces as an
/// `UnexpectedEof` error, which makes hyper abort the connection instead of
/// finishing a response shorter than its `Content-Length`. The reader is
/// dropped as soon as the span is complete, fails, or the body itself is
/// dropped on disconnect.
pub struct SpanStream {
    reader: Option<ReaderStream<ReadStream>>,
    remaining: u64,
    info_hash: InfoHash,
    file_index: usize,
}

impl SpanStream {
    pub fn new(reader: ReadStream, expected: u64, info_hash: InfoHash, file_index: usize) -> Self {
        Self {
            reader: Some(ReaderStream::with_capacity(reader, CHUNK_SIZE)),
            remaining: expected,
            info_hash,
            file_index,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl Stream for SpanStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(reader) = this.reader.as_mut() else {
            return Poll::Ready(None);
        };
        if this.remaining == 0 {
            this.reader = None;
            return Poll::Ready(None);
        }

        match Pin::new(reader).poll_next(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(mut chunk))) => {
                if chunk.len() as u64 > this.remaining {
                    chunk.truncate(this.remaining as usize);
                }
                this.remaining -= chunk.len() as u64;
                if this.remaining == 0 {
                    this.reader = None;
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(err))) => {
                this.reader = None;
                tracing::warn!(
                    info_hash = %this.info_hash,
                    file_index = this.file_index,
                    remaining = this.remaining,
                    error = %err,
                    "stream read failed; aborting response"
                );
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                this.reader = None;
                tracing::warn!(
                    info_hash = %this.info_hash,
                    file_index = this.file_index,
                    remaining = this.remaining,
                    "stream ended before the promised length; aborting response"
                );
                Poll::Ready(Some(Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("engine stream ended with {} bytes missing", this.remaining),
                ))))
            }
        }
    }
}

impl Drop for SpanStream {
    fn drop(&mut self) {
        if self.reader.is_some() && self.remaining > 0 {
            tracing::debug!(
                info_hash = %self.info_hash,
                file_index = self.file_index,
                remaining = self.remaining,
                "client went away mid-stream; releasing read handle"
            );
        }
    }
}
