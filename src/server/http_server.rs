//! Socket binding: accepts TCP connections, parses HTTP/1.1 request heads
//! and hands each request to the [`AppService`] together with a flow-controlled
//! [`Wire`] over the connection's write half.
//!
//! While a request is being handled the read half keeps being polled. EOF or
//! a read error fires the request's [`AbortSignal`], which stops handlers and
//! file streams and suppresses the response flush.

use http::Method;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::request::{header_value, IncomingRequest};
use super::response::{FlushOptions, HeaderVec, ResponseComposer};
use super::service::AppService;
use super::transport::{AbortSignal, Wire};
use crate::dispatcher::Completion;

/// Maximum number of request headers.
pub const MAX_HEADERS: usize = 64;

/// HTTP server wrapping a service.
pub struct HttpServer<T>(pub T);

/// Handle to a running HTTP server.
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl ServerHandle {
    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Poll the listening address until a connection succeeds.
    ///
    /// # Errors
    ///
    /// Returns `TimedOut` if the server doesn't accept within ~250ms (50 attempts × 5ms).
    pub async fn wait_ready(&self) -> io::Result<()> {
        for _ in 0..50 {
            if TcpStream::connect(self.addr).await.is_ok() {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Err(io::Error::new(io::ErrorKind::TimedOut, "server not ready"))
    }

    /// Stop accepting connections and wait for the accept loop to exit.
    /// Connections already being served run to completion.
    pub async fn stop(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Accept loop ended abnormally");
        }
        info!(addr = %self.addr, "HTTP server stopped");
    }

    /// Wait for the accept loop to finish.
    pub async fn join(self) -> Result<(), tokio::task::JoinError> {
        self.handle.await
    }
}

impl HttpServer<AppService> {
    /// Bind `addr` and start accepting connections on the current runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or the port cannot be bound.
    pub async fn start<A: ToSocketAddrs>(self, addr: A) -> io::Result<ServerHandle> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let shutdown = Arc::new(Notify::new());
        let handle = tokio::spawn(accept_loop(listener, self.0, Arc::clone(&shutdown)));
        info!(addr = %addr, "HTTP server listening");
        Ok(ServerHandle {
            addr,
            shutdown,
            handle,
        })
    }
}

async fn accept_loop(listener: TcpListener, service: AppService, shutdown: Arc<Notify>) {
    loop {
        tokio::select! {
            _ = shutdown.notified() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let service = service.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(service, stream, peer).await {
                            debug!(peer = %peer, error = %e, "Connection closed with error");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "Accept failed"),
            },
        }
    }
}

#[derive(Debug)]
struct RequestHead {
    method: Method,
    target: String,
    headers: HeaderVec,
    version: u8,
}

impl RequestHead {
    fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }

    fn keep_alive(&self) -> bool {
        let connection = self.header("connection").map(str::to_ascii_lowercase);
        match connection {
            Some(value) if value.contains("close") => false,
            Some(value) if value.contains("keep-alive") => true,
            _ => self.version >= 1,
        }
    }
}

fn invalid_data(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

fn parse_head(buf: &[u8]) -> io::Result<Option<(RequestHead, usize)>> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);
    match req.parse(buf) {
        Ok(httparse::Status::Partial) => Ok(None),
        Ok(httparse::Status::Complete(len)) => {
            let method = req
                .method
                .and_then(|m| Method::from_bytes(m.as_bytes()).ok())
                .ok_or_else(|| invalid_data("invalid method"))?;
            let target = req
                .path
                .ok_or_else(|| invalid_data("missing request target"))?
                .to_string();
            let headers = req
                .headers
                .iter()
                .map(|h| {
                    (
                        Arc::from(h.name.to_ascii_lowercase()),
                        String::from_utf8_lossy(h.value).into_owned(),
                    )
                })
                .collect();
            Ok(Some((
                RequestHead {
                    method,
                    target,
                    headers,
                    version: req.version.unwrap_or(1),
                },
                len,
            )))
        }
        Err(e) => Err(invalid_data(e.to_string())),
    }
}

async fn read_head(
    reader: &mut OwnedReadHalf,
    buf: &mut Vec<u8>,
    max_head_bytes: usize,
) -> io::Result<Option<RequestHead>> {
    loop {
        if !buf.is_empty() {
            if let Some((head, len)) = parse_head(buf)? {
                buf.drain(..len);
                return Ok(Some(head));
            }
            if buf.len() > max_head_bytes {
                return Err(invalid_data("request head too large"));
            }
        }
        if reader.read_buf(buf).await? == 0 {
            return if buf.is_empty() {
                Ok(None)
            } else {
                Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed mid-request",
                ))
            };
        }
    }
}

/// Write a framework error and close.
async fn reject(writer: &mut OwnedWriteHalf, status: u16, message: &str) -> io::Result<()> {
    let options = FlushOptions {
        head_only: false,
        keep_alive: false,
        cache_ttl: -1,
    };
    let bytes = ResponseComposer::text(status, message).into_wire_bytes(&options);
    writer.write_all(&bytes).await?;
    writer.shutdown().await
}

async fn serve_connection(service: AppService, stream: TcpStream, peer: SocketAddr) -> io::Result<()> {
    stream.set_nodelay(true)?;
    let limits = service.limits();
    let read_cap = limits.max_head_bytes + limits.max_body_bytes;
    let (mut reader, mut writer) = stream.into_split();
    let mut buf: Vec<u8> = Vec::with_capacity(8 * 1024);

    loop {
        let head = match read_head(&mut reader, &mut buf, limits.max_head_bytes).await {
            Ok(Some(head)) => head,
            Ok(None) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                debug!(peer = %peer, error = %e, "Malformed request");
                return reject(&mut writer, 400, "Bad Request").await;
            }
            Err(e) => return Err(e),
        };

        if head.header("transfer-encoding").is_some() {
            return reject(&mut writer, 501, "Chunked request bodies are not supported").await;
        }
        let content_length = match head.header("content-length").map(|v| v.trim().parse::<usize>()) {
            None => 0,
            Some(Ok(n)) => n,
            Some(Err(_)) => return reject(&mut writer, 400, "Bad Request").await,
        };
        if content_length > limits.max_body_bytes {
            return reject(&mut writer, 413, "Payload Too Large").await;
        }
        if buf.len() < content_length
            && head
                .header("expect")
                .is_some_and(|v| v.eq_ignore_ascii_case("100-continue"))
        {
            writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await?;
        }
        while buf.len() < content_length {
            if reader.read_buf(&mut buf).await? == 0 {
                return Ok(());
            }
        }
        let body: Vec<u8> = buf.drain(..content_length).collect();

        let keep_alive = head.keep_alive();
        let request = IncomingRequest {
            method: head.method,
            target: head.target,
            headers: head.headers,
            body,
            peer: Some(peer),
            keep_alive,
        };

        let abort = AbortSignal::new();
        let mut peer_open = true;
        let completion = {
            let mut wire = Wire::new(&mut writer, abort.clone());
            let handling = service.call(request, &mut wire);
            tokio::pin!(handling);
            loop {
                tokio::select! {
                    completion = &mut handling => break completion,
                    read = reader.read_buf(&mut buf), if peer_open && buf.len() < read_cap => {
                        if matches!(read, Ok(0) | Err(_)) {
                            debug!(peer = %peer, "Client closed the connection mid-request");
                            peer_open = false;
                            abort.abort();
                        }
                    }
                }
            }
        };

        match completion {
            Completion::KeepAlive if peer_open => continue,
            _ => {
                if let Err(e) = writer.shutdown().await {
                    debug!(peer = %peer, error = %e, "Shutdown failed");
                }
                return Ok(());
            }
        }
    }
}
