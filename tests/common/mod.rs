#![allow(dead_code)]

pub mod sink {
    use corkrouter::server::Sink;
    use futures::future::BoxFuture;
    use std::io;

    /// In-memory sink that accepts at most `quota` bytes between drains,
    /// like a socket whose send buffer keeps filling up.
    pub struct Throttled {
        pub out: Vec<u8>,
        quota: usize,
        left: usize,
        pub drains: usize,
    }

    impl Throttled {
        pub fn new(quota: usize) -> Self {
            Self {
                out: Vec::new(),
                quota,
                left: quota,
                drains: 0,
            }
        }
    }

    impl Sink for Throttled {
        fn try_send(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = buf.len().min(self.left);
            self.out.extend_from_slice(&buf[..n]);
            self.left -= n;
            Ok(n)
        }

        fn drained(&mut self) -> BoxFuture<'_, io::Result<()>> {
            self.drains += 1;
            self.left = self.quota;
            Box::pin(async {
                tokio::task::yield_now().await;
                Ok(())
            })
        }
    }
}

pub mod fixtures {
    use std::path::Path;
    use tempfile::TempDir;

    pub const TEN_BYTES: &[u8] = b"0123456789";

    /// Deterministic, poorly compressible bytes.
    pub fn noise(len: usize) -> Vec<u8> {
        let mut state: u32 = 0x2545_f491;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state >> 24) as u8
            })
            .collect()
    }

    /// A public directory with an index page, a 10-byte file, a stylesheet in
    /// a subdirectory and a 300 KiB binary.
    pub fn public_dir() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "index.html", b"<h1>home</h1>");
        write(root, "ten.txt", TEN_BYTES);
        std::fs::create_dir(root.join("css")).unwrap();
        write(root, "css/site.css", "body { color: red; }\n".repeat(200).as_bytes());
        std::fs::create_dir(root.join("empty")).unwrap();
        write(root, "big.bin", &noise(300 * 1024));
        dir
    }

    pub fn write(root: &Path, name: &str, bytes: &[u8]) {
        std::fs::write(root.join(name), bytes).unwrap();
    }
}

pub mod http {
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    /// A parsed HTTP/1.1 response.
    #[derive(Debug)]
    pub struct RawResponse {
        pub status: u16,
        pub headers: Vec<(String, String)>,
        pub body: Vec<u8>,
    }

    impl RawResponse {
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }

        pub fn headers_named(&self, name: &str) -> Vec<&str> {
            self.headers
                .iter()
                .filter(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
                .collect()
        }

        pub fn text(&self) -> String {
            String::from_utf8_lossy(&self.body).into_owned()
        }
    }

    /// Parse one response from `bytes`, decoding chunked framing.
    pub fn parse_response(bytes: &[u8]) -> RawResponse {
        let split = bytes
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("response head terminator");
        let head = std::str::from_utf8(&bytes[..split]).unwrap();
        let rest = &bytes[split + 4..];
        let mut lines = head.split("\r\n");
        let status_line = lines.next().unwrap();
        let status = status_line.split_whitespace().nth(1).unwrap().parse().unwrap();
        let headers: Vec<(String, String)> = lines
            .filter_map(|l| l.split_once(':'))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();
        let chunked = headers
            .iter()
            .any(|(k, v)| k.eq_ignore_ascii_case("transfer-encoding") && v == "chunked");
        let body = if chunked {
            decode_chunked(rest)
        } else {
            let len = headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                .map(|(_, v)| v.parse::<usize>().unwrap())
                .unwrap_or(0);
            rest[..len.min(rest.len())].to_vec()
        };
        RawResponse {
            status,
            headers,
            body,
        }
    }

    pub fn decode_chunked(mut data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let line_end = data.windows(2).position(|w| w == b"\r\n").unwrap();
            let size = usize::from_str_radix(std::str::from_utf8(&data[..line_end]).unwrap(), 16)
                .unwrap();
            data = &data[line_end + 2..];
            if size == 0 {
                return out;
            }
            out.extend_from_slice(&data[..size]);
            data = &data[size + 2..];
        }
    }

    /// Send `raw` and read until the server closes the connection.
    pub async fn send_request(addr: SocketAddr, raw: &str) -> RawResponse {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw.as_bytes()).await.unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        parse_response(&buf)
    }

    pub fn get(path: &str) -> String {
        format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
    }
}

pub mod dispatch {
    use super::http::{parse_response, RawResponse};
    use corkrouter::dispatcher::{Completion, Dispatcher};
    use corkrouter::server::{AbortSignal, IncomingRequest, Wire};
    use std::time::Duration;

    /// Run one request through `dispatcher` into an in-memory sink.
    pub async fn run(dispatcher: &Dispatcher, request: IncomingRequest) -> (RawResponse, Completion) {
        let mut out: Vec<u8> = Vec::new();
        let completion = {
            let mut wire = Wire::new(&mut out, AbortSignal::new());
            dispatcher.handle(request, &mut wire).await
        };
        (parse_response(&out), completion)
    }

    /// Like [`run`] but returns the raw bytes written.
    pub async fn run_raw(dispatcher: &Dispatcher, request: IncomingRequest) -> (Vec<u8>, Completion) {
        let mut out: Vec<u8> = Vec::new();
        let completion = {
            let mut wire = Wire::new(&mut out, AbortSignal::new());
            dispatcher.handle(request, &mut wire).await
        };
        (out, completion)
    }

    /// Like [`run_raw`] but the client disconnects after `delay`.
    pub async fn run_aborting(
        dispatcher: &Dispatcher,
        request: IncomingRequest,
        delay: Duration,
    ) -> (Vec<u8>, Completion) {
        let abort = AbortSignal::new();
        let trigger = abort.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            trigger.abort();
        });
        let mut out: Vec<u8> = Vec::new();
        let completion = {
            let mut wire = Wire::new(&mut out, abort);
            dispatcher.handle(request, &mut wire).await
        };
        (out, completion)
    }
}
