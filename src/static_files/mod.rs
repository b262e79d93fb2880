//! # Static Files
//!
//! Serves files from a public directory for GET requests no route matched.
//!
//! - URL paths are percent-decoded and mapped under the root; `..`, absolute
//!   and prefix components are refused.
//! - Directories resolve to the configured index file.
//! - `If-Modified-Since` at or after the file's mtime (whole seconds) gives 304.
//! - A single `Range` gives 206 with `Content-Range`; a start past the end gives
//!   416 with `Content-Range: bytes */<size>`. Ranged responses are never compressed.
//! - Otherwise the first codec from the priority list found in `Accept-Encoding`
//!   is applied and the body is sent with chunked framing.
//!
//! Output goes through a [`Wire`], which tells the streamer when the client
//! stops accepting bytes; see [`FileStreamSession::run`].

mod compress;
mod range;
mod stream;

pub use compress::{negotiate, Codec, Encoder, DEFAULT_PRIORITY};
pub use range::{parse_range, ByteRange, RangeRequest};
pub use stream::{FileStreamSession, StreamOutcome};

use std::fmt;
use std::fs::Metadata;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::mime;
use crate::server::{FlushOptions, IncomingRequest, ResponseComposer, Wire};

/// Default read size per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug)]
pub enum StreamError {
    /// Missing, not a regular file, or outside the root.
    NotFound,
    Io(io::Error),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::NotFound => write!(f, "file not found"),
            StreamError::Io(e) => write!(f, "i/o error: {e}"),
        }
    }
}

impl std::error::Error for StreamError {}

impl From<io::Error> for StreamError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::NotFound {
            StreamError::NotFound
        } else {
            StreamError::Io(e)
        }
    }
}

/// Public-directory file server.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
    index: Option<String>,
    compress: bool,
    last_modified: bool,
    priority: Vec<Codec>,
    chunk_size: usize,
}

impl StaticFiles {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            index: Some("index.html".to_string()),
            compress: true,
            last_modified: true,
            priority: DEFAULT_PRIORITY.to_vec(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn index(mut self, index: Option<String>) -> Self {
        self.index = index;
        self
    }

    pub fn compress(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }

    pub fn last_modified(mut self, enabled: bool) -> Self {
        self.last_modified = enabled;
        self
    }

    pub fn priority(mut self, priority: Vec<Codec>) -> Self {
        self.priority = priority;
        self
    }

    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn map_path(&self, url_path: &str) -> Option<PathBuf> {
        let mut pb = self.root.clone();
        for comp in Path::new(url_path.trim_start_matches('/')).components() {
            match comp {
                Component::Normal(s) => pb.push(s),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(pb)
    }

    /// Resolve a URL path to a regular file under the root.
    pub async fn resolve(&self, url_path: &str) -> Result<(PathBuf, Metadata), StreamError> {
        let decoded = urlencoding::decode(url_path).map_err(|_| StreamError::NotFound)?;
        let mut path = self.map_path(&decoded).ok_or(StreamError::NotFound)?;
        let mut meta = tokio::fs::metadata(&path).await?;
        if meta.is_dir() {
            let index = self.index.as_deref().ok_or(StreamError::NotFound)?;
            path.push(index);
            meta = tokio::fs::metadata(&path).await?;
        }
        if !meta.is_file() {
            return Err(StreamError::NotFound);
        }
        Ok((path, meta))
    }

    /// Serve `request` from the public directory.
    pub async fn serve(&self, request: &IncomingRequest, wire: &mut Wire<'_>) -> StreamOutcome {
        let options = FlushOptions::for_request(request);
        let url_path = request.path();

        let (path, meta) = match self.resolve(url_path).await {
            Ok(found) => found,
            Err(e) => {
                debug!(path = %url_path, error = %e, "Static file not served");
                let response =
                    ResponseComposer::text(404, format!("Cannot {} {}", request.method, url_path));
                return finish_simple(wire, response, &options, StreamOutcome::NotFound).await;
            }
        };
        let size = meta.len();
        let mut head = ResponseComposer::default();

        if self.last_modified {
            if let Some(mtime) = meta.modified().ok().map(truncate_to_seconds) {
                let since = request
                    .header("if-modified-since")
                    .and_then(|v| httpdate::parse_http_date(v).ok());
                if since.is_some_and(|since| since >= mtime) {
                    let mut response = ResponseComposer::default();
                    response.set_status(304);
                    response.set_header("Last-Modified", httpdate::fmt_http_date(mtime));
                    return finish_simple(wire, response, &options, StreamOutcome::NotModified)
                        .await;
                }
                head.set_header("Last-Modified", httpdate::fmt_http_date(mtime));
            }
        }

        let mut session = FileStreamSession::new(path, size);
        match request.header("range").map(|h| parse_range(h, size)) {
            Some(RangeRequest::Unsatisfiable) => {
                let mut response = ResponseComposer::default();
                response.set_status(416);
                response.set_header("Content-Range", format!("bytes */{size}"));
                return finish_simple(wire, response, &options, StreamOutcome::RangeNotSatisfiable)
                    .await;
            }
            Some(RangeRequest::Partial(range)) => {
                head.set_status(206);
                head.set_header("Content-Range", range.content_range(size));
                session.range = Some(range);
            }
            Some(RangeRequest::Full) | None => {}
        }
        head.set_header("Content-Type", mime::for_path(&session.path));
        head.set_header("Accept-Ranges", "bytes");

        if self.compress && session.range.is_none() {
            session.codec = request
                .header("accept-encoding")
                .and_then(|accept| negotiate(accept, &self.priority));
            head.set_header("Vary", "Accept-Encoding");
        }
        let content_length = match session.codec {
            Some(codec) => {
                head.set_header("Content-Encoding", codec.token());
                None
            }
            None => Some(session.range.map_or(size, |r| r.len())),
        };

        debug!(
            path = %session.path.display(),
            size,
            range = ?session.range,
            codec = ?session.codec,
            "Streaming static file"
        );
        let head = head.into_head_bytes(content_length, &options);
        session.run(wire, head, self.chunk_size, &options).await
    }
}

async fn finish_simple(
    wire: &mut Wire<'_>,
    response: ResponseComposer,
    options: &FlushOptions,
    outcome: StreamOutcome,
) -> StreamOutcome {
    match wire.write_all(response.into_wire_bytes(options)).await {
        Ok(()) => outcome,
        Err(crate::server::WireError::Aborted) => StreamOutcome::Aborted,
        Err(crate::server::WireError::Io(_)) => StreamOutcome::Broken,
    }
}

fn truncate_to_seconds(t: SystemTime) -> SystemTime {
    let secs = t.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    UNIX_EPOCH + Duration::from_secs(secs)
}
