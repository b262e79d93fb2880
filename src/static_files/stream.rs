//! One file being streamed to one client.

use std::io::SeekFrom;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, error, warn};

use super::compress::{Codec, Encoder};
use super::range::ByteRange;
use crate::server::{FlushOptions, ResponseComposer, Wire, WireError};

/// How a static response ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed,
    NotModified,
    NotFound,
    RangeNotSatisfiable,
    /// The client went away; the file handle was released.
    Aborted,
    /// The file could not be read before any header was sent; a 500 was written.
    Failed,
    /// Reading or writing failed after the head was sent; the connection must close.
    Broken,
}

impl StreamOutcome {
    /// Whether the connection is still in a state to carry another response.
    pub fn connection_reusable(&self) -> bool {
        !matches!(self, StreamOutcome::Aborted | StreamOutcome::Broken)
    }
}

/// Streaming state for one file response.
#[derive(Debug)]
pub struct FileStreamSession {
    pub path: PathBuf,
    /// `None` streams the whole file.
    pub range: Option<ByteRange>,
    pub total_size: u64,
    pub codec: Option<Codec>,
}

impl FileStreamSession {
    pub fn new(path: PathBuf, total_size: u64) -> Self {
        Self {
            path,
            range: None,
            total_size,
            codec: None,
        }
    }

    fn body_len(&self) -> u64 {
        self.range.map_or(self.total_size, |r| r.len())
    }

    /// Send `head` followed by the file contents.
    ///
    /// The head is held back until the first chunk has been read, so an
    /// unreadable file still turns into a clean 500. Reads are only issued
    /// while the wire is ready; once the sink refuses bytes the loop waits
    /// for it to drain before reading again.
    pub async fn run(
        self,
        wire: &mut Wire<'_>,
        head: Vec<u8>,
        chunk_size: usize,
        options: &FlushOptions,
    ) -> StreamOutcome {
        let abort = wire.abort_signal().clone();
        let mut file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) => return self.fail_before_head(wire, &e, options).await,
        };
        if let Some(range) = self.range {
            if let Err(e) = file.seek(SeekFrom::Start(range.start)).await {
                return self.fail_before_head(wire, &e, options).await;
            }
        }

        let mut remaining = self.body_len();
        let mut head = Some(head);
        let mut encoder = self.codec.map(Encoder::new);
        let mut buf = vec![0u8; chunk_size.max(1)];

        while remaining > 0 {
            if abort.is_aborted() {
                return self.aborted();
            }
            if !wire.is_ready() {
                match wire.drain().await {
                    Ok(()) => continue,
                    Err(e) => return self.write_failed(e),
                }
            }

            let want = remaining.min(buf.len() as u64) as usize;
            let read = match abort.guard(file.read(&mut buf[..want])).await {
                None => return self.aborted(),
                Some(Ok(0)) => Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "file shrank while streaming",
                )),
                Some(result) => result,
            };
            let n = match read {
                Ok(n) => n,
                Err(e) if head.is_some() => return self.fail_before_head(wire, &e, options).await,
                Err(e) => {
                    error!(path = %self.path.display(), error = %e, "Static file read failed mid-stream");
                    return StreamOutcome::Broken;
                }
            };
            remaining -= n as u64;

            let mut out = head.take().unwrap_or_default();
            match encoder.as_mut() {
                Some(enc) => match enc.encode(&buf[..n]) {
                    Ok(compressed) => push_chunk(&mut out, &compressed),
                    Err(e) => {
                        error!(path = %self.path.display(), error = %e, "Compression failed");
                        return StreamOutcome::Broken;
                    }
                },
                None => out.extend_from_slice(&buf[..n]),
            }
            if !out.is_empty() {
                if let Err(e) = wire.offer(out) {
                    return self.write_failed(e);
                }
            }
        }

        // Empty bodies still owe the head.
        let mut tail = head.take().unwrap_or_default();
        if let Some(enc) = encoder {
            match enc.finish() {
                Ok(rest) => push_chunk(&mut tail, &rest),
                Err(e) => {
                    error!(path = %self.path.display(), error = %e, "Compression failed");
                    return StreamOutcome::Broken;
                }
            }
            tail.extend_from_slice(b"0\r\n\r\n");
        }
        let flushed = if tail.is_empty() {
            wire.drain().await
        } else {
            wire.write_all(tail).await
        };
        match flushed {
            Ok(()) => {
                debug!(
                    path = %self.path.display(),
                    bytes_written = wire.bytes_written(),
                    codec = ?self.codec,
                    "Static file sent"
                );
                StreamOutcome::Completed
            }
            Err(e) => self.write_failed(e),
        }
    }

    fn aborted(&self) -> StreamOutcome {
        debug!(path = %self.path.display(), "Client aborted static file stream");
        StreamOutcome::Aborted
    }

    fn write_failed(&self, err: WireError) -> StreamOutcome {
        match err {
            WireError::Aborted => self.aborted(),
            WireError::Io(e) => {
                warn!(path = %self.path.display(), error = %e, "Static file write failed");
                StreamOutcome::Broken
            }
        }
    }

    async fn fail_before_head(
        &self,
        wire: &mut Wire<'_>,
        err: &std::io::Error,
        options: &FlushOptions,
    ) -> StreamOutcome {
        error!(path = %self.path.display(), error = %err, "Static file read failed");
        let response = ResponseComposer::text(500, "Internal Server Error");
        match wire.write_all(response.into_wire_bytes(options)).await {
            Ok(()) => StreamOutcome::Failed,
            Err(e) => self.write_failed(e),
        }
    }
}

/// Append `data` as one chunked-transfer frame; empty data writes nothing.
fn push_chunk(out: &mut Vec<u8>, data: &[u8]) {
    if data.is_empty() {
        return;
    }
    out.extend_from_slice(format!("{:x}\r\n", data.len()).as_bytes());
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
}
