//! Flow-controlled output.
//!
//! A [`Sink`] is the non-blocking side of a connection: it accepts as many
//! bytes as it can right now and can be awaited until it has room again. A
//! [`Wire`] sits on top of a sink and keeps the bytes a sink refused, so the
//! producer can stop producing (pause) until [`Wire::drain`] completes
//! (resume). Every wait is raced against the request's [`AbortSignal`].

use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Notify;

/// Non-blocking byte sink.
pub trait Sink: Send {
    /// Write as much of `buf` as fits without blocking. `Ok(0)` means "full".
    fn try_send(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Resolve once the sink can accept more bytes.
    fn drained(&mut self) -> BoxFuture<'_, io::Result<()>>;
}

impl Sink for OwnedWriteHalf {
    fn try_send(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.try_write(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn drained(&mut self) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(self.writable())
    }
}

/// Unbounded in-memory sink.
impl Sink for Vec<u8> {
    fn try_send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn drained(&mut self) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(futures::future::ready(Ok(())))
    }
}

#[derive(Debug, Default)]
struct AbortInner {
    aborted: AtomicBool,
    notify: Notify,
}

/// Set once, when the client goes away. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    inner: Arc<AbortInner>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        if !self.inner.aborted.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }

    /// Resolve when the signal fires (immediately if it already has).
    pub async fn aborted(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }

    /// Run `fut` unless the signal fires first; `None` means aborted.
    pub async fn guard<F: Future>(&self, fut: F) -> Option<F::Output> {
        if self.is_aborted() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.aborted() => None,
            out = fut => Some(out),
        }
    }
}

#[derive(Debug)]
pub enum WireError {
    /// The client went away; nothing more will be written.
    Aborted,
    Io(io::Error),
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::Aborted => write!(f, "client aborted the request"),
            WireError::Io(e) => write!(f, "write failed: {e}"),
        }
    }
}

impl std::error::Error for WireError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WireError::Aborted => None,
            WireError::Io(e) => Some(e),
        }
    }
}

/// Whether the wire can take more data now.
#[derive(Debug, Default)]
pub enum FlowState {
    #[default]
    Ready,
    /// The sink refused part of a chunk; `pending[offset..]` is still owed.
    WaitingForDrain { pending: Vec<u8>, offset: usize },
}

/// Response output for one request.
pub struct Wire<'c> {
    sink: &'c mut dyn Sink,
    abort: AbortSignal,
    state: FlowState,
    written: u64,
}

impl fmt::Debug for Wire<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wire")
            .field("state", &self.state)
            .field("written", &self.written)
            .field("aborted", &self.abort.is_aborted())
            .finish()
    }
}

impl<'c> Wire<'c> {
    pub fn new(sink: &'c mut dyn Sink, abort: AbortSignal) -> Self {
        Self {
            sink,
            abort,
            state: FlowState::Ready,
            written: 0,
        }
    }

    pub fn abort_signal(&self) -> &AbortSignal {
        &self.abort
    }

    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        matches!(self.state, FlowState::Ready)
    }

    /// Bytes the sink has accepted so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Offer a chunk without waiting.
    ///
    /// Returns `Ok(true)` when the sink took all of it. Otherwise the rest is
    /// kept and the wire enters [`FlowState::WaitingForDrain`]; the caller must
    /// stop producing and call [`drain`](Self::drain).
    pub fn offer(&mut self, chunk: Vec<u8>) -> Result<bool, WireError> {
        if self.is_aborted() {
            return Err(WireError::Aborted);
        }
        if let FlowState::WaitingForDrain { pending, .. } = &mut self.state {
            pending.extend_from_slice(&chunk);
            return Ok(false);
        }
        let sent = self.push(&chunk)?;
        if sent == chunk.len() {
            Ok(true)
        } else {
            self.state = FlowState::WaitingForDrain {
                pending: chunk,
                offset: sent,
            };
            Ok(false)
        }
    }

    /// Wait until every owed byte has been accepted.
    pub async fn drain(&mut self) -> Result<(), WireError> {
        loop {
            let FlowState::WaitingForDrain { pending, mut offset } =
                std::mem::take(&mut self.state)
            else {
                return Ok(());
            };
            let abort = self.abort.clone();
            match abort.guard(self.sink.drained()).await {
                None => return Err(WireError::Aborted),
                Some(Err(e)) => return Err(WireError::Io(e)),
                Some(Ok(())) => {}
            }
            offset += self.push(&pending[offset..])?;
            if offset < pending.len() {
                self.state = FlowState::WaitingForDrain { pending, offset };
            }
        }
    }

    /// Offer then drain.
    pub async fn write_all(&mut self, bytes: Vec<u8>) -> Result<(), WireError> {
        if !self.offer(bytes)? {
            self.drain().await?;
        }
        Ok(())
    }

    fn push(&mut self, buf: &[u8]) -> Result<usize, WireError> {
        let mut sent = 0;
        while sent < buf.len() {
            let n = self.sink.try_send(&buf[sent..]).map_err(WireError::Io)?;
            if n == 0 {
                break;
            }
            sent += n;
            self.written += n as u64;
        }
        Ok(sent)
    }
}
