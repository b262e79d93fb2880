//! Static file serving tests
//!
//! # Test Coverage
//!
//! - Resolution: index files, directories without an index, traversal
//! - Conditional requests (`If-Modified-Since`)
//! - Byte ranges: partial, suffix, unsatisfiable, never compressed
//! - Content encodings (gzip, br, deflate) decoded back to the original bytes
//! - Backpressure: a slow sink receives every byte intact
//! - Client abort mid-stream stops the transfer
//! - Fallback through the dispatcher for unmatched GET requests

mod common;

use common::dispatch::run;
use common::fixtures::{noise, public_dir, write, TEN_BYTES};
use common::http::{parse_response, RawResponse};
use common::sink::Throttled;
use corkrouter::dispatcher::{Completion, Dispatcher};
use corkrouter::router::{CompileMode, RouteTable};
use corkrouter::server::{AbortSignal, IncomingRequest, Sink, Wire};
use corkrouter::static_files::{Codec, StaticFiles, StreamOutcome};
use futures::future::BoxFuture;
use http::Method;
use sha2::{Digest, Sha256};
use std::io::{self, Read};
use std::path::Path;
use std::time::{Duration, SystemTime};

fn get(target: &str) -> IncomingRequest {
    IncomingRequest::new(Method::GET, target)
}

async fn serve(files: &StaticFiles, request: IncomingRequest) -> (RawResponse, StreamOutcome) {
    let mut out: Vec<u8> = Vec::new();
    let outcome = {
        let mut wire = Wire::new(&mut out, AbortSignal::new());
        files.serve(&request, &mut wire).await
    };
    (parse_response(&out), outcome)
}

fn public(root: &Path) -> StaticFiles {
    StaticFiles::new(root)
}

#[tokio::test]
async fn test_plain_file() {
    let dir = public_dir();
    let (resp, outcome) = serve(&public(dir.path()), get("/ten.txt")).await;
    assert_eq!(outcome, StreamOutcome::Completed);
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, TEN_BYTES);
    assert_eq!(resp.header("content-length"), Some("10"));
    assert_eq!(resp.header("content-type"), Some("text/plain; charset=utf-8"));
    assert_eq!(resp.header("accept-ranges"), Some("bytes"));
    assert!(resp.header("last-modified").is_some());
    assert!(resp.header("content-encoding").is_none());
}

#[tokio::test]
async fn test_index_resolution() {
    let dir = public_dir();
    let (resp, _) = serve(&public(dir.path()), get("/")).await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.text(), "<h1>home</h1>");
    assert_eq!(resp.header("content-type"), Some("text/html; charset=utf-8"));

    let (resp, outcome) = serve(&public(dir.path()).index(None), get("/")).await;
    assert_eq!(resp.status, 404);
    assert_eq!(outcome, StreamOutcome::NotFound);
}

#[tokio::test]
async fn test_directory_without_index_is_404() {
    let dir = public_dir();
    let (resp, outcome) = serve(&public(dir.path()), get("/empty")).await;
    assert_eq!(resp.status, 404);
    assert_eq!(outcome, StreamOutcome::NotFound);
}

#[tokio::test]
async fn test_missing_and_traversal_are_404() {
    let outer = tempfile::tempdir().unwrap();
    write(outer.path(), "secret.txt", b"top secret");
    std::fs::create_dir_all(outer.path().join("public/css")).unwrap();
    let files = public(&outer.path().join("public"));

    let (resp, _) = serve(&files, get("/nope.txt")).await;
    assert_eq!(resp.status, 404);
    assert_eq!(resp.text(), "Cannot GET /nope.txt");

    for target in ["/../secret.txt", "/%2e%2e/secret.txt", "/css/../../secret.txt"] {
        let (resp, outcome) = serve(&files, get(target)).await;
        assert_eq!(resp.status, 404, "{target}");
        assert_eq!(outcome, StreamOutcome::NotFound, "{target}");
    }
}

#[tokio::test]
async fn test_percent_encoded_name() {
    let dir = public_dir();
    write(dir.path(), "with space.txt", b"spaced");
    let (resp, _) = serve(&public(dir.path()), get("/with%20space.txt")).await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.text(), "spaced");
}

#[tokio::test]
async fn test_if_modified_since() {
    let dir = public_dir();
    let files = public(dir.path());
    let future = httpdate::fmt_http_date(SystemTime::now() + Duration::from_secs(3600));
    let (resp, outcome) = serve(&files, get("/ten.txt").with_header("If-Modified-Since", future)).await;
    assert_eq!(resp.status, 304);
    assert_eq!(outcome, StreamOutcome::NotModified);
    assert!(resp.body.is_empty());
    assert!(resp.header("last-modified").is_some());

    let past = "Sun, 06 Nov 1994 08:49:37 GMT";
    let (resp, _) = serve(&files, get("/ten.txt").with_header("If-Modified-Since", past)).await;
    assert_eq!(resp.status, 200);

    // ignored when last-modified handling is off
    let future = httpdate::fmt_http_date(SystemTime::now() + Duration::from_secs(3600));
    let plain = StaticFiles::new(dir.path()).last_modified(false);
    let (resp, _) = serve(&plain, get("/ten.txt").with_header("If-Modified-Since", future)).await;
    assert_eq!(resp.status, 200);
    assert!(resp.header("last-modified").is_none());
}

#[tokio::test]
async fn test_range_is_never_compressed() {
    let dir = public_dir();
    let request = get("/ten.txt")
        .with_header("Range", "bytes=0-3")
        .with_header("Accept-Encoding", "gzip, br");
    let (resp, outcome) = serve(&public(dir.path()), request).await;
    assert_eq!(outcome, StreamOutcome::Completed);
    assert_eq!(resp.status, 206);
    assert_eq!(resp.header("content-range"), Some("bytes 0-3/10"));
    assert_eq!(resp.header("content-length"), Some("4"));
    assert!(resp.header("content-encoding").is_none());
    assert_eq!(resp.body, b"0123");
}

#[tokio::test]
async fn test_suffix_and_open_ranges() {
    let dir = public_dir();
    let files = public(dir.path());

    let (resp, _) = serve(&files, get("/ten.txt").with_header("Range", "bytes=-3")).await;
    assert_eq!(resp.header("content-range"), Some("bytes 7-9/10"));
    assert_eq!(resp.body, b"789");

    let (resp, _) = serve(&files, get("/ten.txt").with_header("Range", "bytes=6-")).await;
    assert_eq!(resp.header("content-range"), Some("bytes 6-9/10"));
    assert_eq!(resp.body, b"6789");

    let (resp, _) = serve(&files, get("/ten.txt").with_header("Range", "bytes=8-100")).await;
    assert_eq!(resp.header("content-range"), Some("bytes 8-9/10"));
    assert_eq!(resp.body, b"89");
}

#[tokio::test]
async fn test_unsatisfiable_range() {
    let dir = public_dir();
    let request = get("/ten.txt").with_header("Range", "bytes=10-20");
    let (resp, outcome) = serve(&public(dir.path()), request).await;
    assert_eq!(resp.status, 416);
    assert_eq!(outcome, StreamOutcome::RangeNotSatisfiable);
    assert_eq!(resp.header("content-range"), Some("bytes */10"));
}

#[tokio::test]
async fn test_malformed_range_sends_whole_file() {
    let dir = public_dir();
    let request = get("/ten.txt").with_header("Range", "bytes=5-2");
    let (resp, _) = serve(&public(dir.path()), request).await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, TEN_BYTES);
}

fn decode(codec: Codec, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    match codec {
        Codec::Gzip => flate2::read::GzDecoder::new(body).read_to_end(&mut out),
        Codec::Deflate => flate2::read::ZlibDecoder::new(body).read_to_end(&mut out),
        Codec::Brotli => brotli::Decompressor::new(body, 4096).read_to_end(&mut out),
    }
    .unwrap();
    out
}

#[tokio::test]
async fn test_compressed_bodies_decode() {
    let dir = public_dir();
    let original = std::fs::read(dir.path().join("css/site.css")).unwrap();
    let files = public(dir.path()).chunk_size(1000);

    for (accept, codec) in [("gzip", Codec::Gzip), ("br", Codec::Brotli), ("deflate", Codec::Deflate)] {
        let request = get("/css/site.css").with_header("Accept-Encoding", accept);
        let (resp, outcome) = serve(&files, request).await;
        assert_eq!(outcome, StreamOutcome::Completed);
        assert_eq!(resp.status, 200);
        assert_eq!(resp.header("content-encoding"), Some(codec.token()));
        assert_eq!(resp.header("transfer-encoding"), Some("chunked"));
        assert_eq!(resp.header("vary"), Some("Accept-Encoding"));
        assert!(resp.header("content-length").is_none());
        assert!(resp.body.len() < original.len(), "{accept} should shrink css");
        assert_eq!(decode(codec, &resp.body), original, "{accept}");
    }
}

#[tokio::test]
async fn test_priority_order_and_disabled_compression() {
    let dir = public_dir();
    let request = || get("/ten.txt").with_header("Accept-Encoding", "deflate, br, gzip");

    let (resp, _) = serve(&public(dir.path()), request()).await;
    assert_eq!(resp.header("content-encoding"), Some("gzip"));

    let brotli_first = public(dir.path()).priority(vec![Codec::Brotli, Codec::Gzip]);
    let (resp, _) = serve(&brotli_first, request()).await;
    assert_eq!(resp.header("content-encoding"), Some("br"));
    assert_eq!(decode(Codec::Brotli, &resp.body), TEN_BYTES);

    let off = public(dir.path()).compress(false);
    let (resp, _) = serve(&off, request()).await;
    assert!(resp.header("content-encoding").is_none());
    assert_eq!(resp.body, TEN_BYTES);
}

#[tokio::test]
async fn test_slow_sink_receives_every_byte() {
    let dir = public_dir();
    let files = public(dir.path()).chunk_size(16 * 1024);
    let request = get("/big.bin");

    let mut sink = Throttled::new(7_000);
    let outcome = {
        let mut wire = Wire::new(&mut sink, AbortSignal::new());
        files.serve(&request, &mut wire).await
    };
    assert_eq!(outcome, StreamOutcome::Completed);
    assert!(sink.drains > 30, "expected backpressure, got {} drains", sink.drains);

    let resp = parse_response(&sink.out);
    assert_eq!(resp.status, 200);
    assert_eq!(resp.header("content-length"), Some("307200"));
    assert_eq!(Sha256::digest(&resp.body), Sha256::digest(noise(300 * 1024)));
}

#[tokio::test]
async fn test_slow_sink_compressed_stream() {
    let dir = public_dir();
    let files = public(dir.path()).chunk_size(8 * 1024);
    let request = get("/big.bin").with_header("Accept-Encoding", "gzip");

    let mut sink = Throttled::new(3_000);
    let outcome = {
        let mut wire = Wire::new(&mut sink, AbortSignal::new());
        files.serve(&request, &mut wire).await
    };
    assert_eq!(outcome, StreamOutcome::Completed);
    let resp = parse_response(&sink.out);
    assert_eq!(decode(Codec::Gzip, &resp.body), noise(300 * 1024));
}

/// Accepts `limit` bytes, then reports the client gone.
struct HangUp {
    abort: AbortSignal,
    taken: usize,
    limit: usize,
}

impl Sink for HangUp {
    fn try_send(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.taken >= self.limit {
            self.abort.abort();
            return Ok(0);
        }
        let n = buf.len().min(self.limit - self.taken);
        self.taken += n;
        Ok(n)
    }

    fn drained(&mut self) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(futures::future::pending())
    }
}

#[tokio::test]
async fn test_abort_mid_stream() {
    let dir = public_dir();
    let files = public(dir.path()).chunk_size(4 * 1024);
    let abort = AbortSignal::new();
    let mut sink = HangUp {
        abort: abort.clone(),
        taken: 0,
        limit: 20_000,
    };
    let outcome = {
        let mut wire = Wire::new(&mut sink, abort.clone());
        files.serve(&get("/big.bin"), &mut wire).await
    };
    assert_eq!(outcome, StreamOutcome::Aborted);
    assert!(!outcome.connection_reusable());
    assert!(abort.is_aborted());
    assert_eq!(sink.taken, 20_000);
}

#[tokio::test]
async fn test_dispatcher_falls_back_to_public_dir() {
    let dir = public_dir();
    let mut builder = RouteTable::builder(CompileMode::Strict);
    builder.add_lines("get /ten.txt #c:home.shadow").unwrap();
    let dispatcher = Dispatcher::builder(builder.build())
        .static_files(StaticFiles::new(dir.path()))
        .build();

    let (resp, completion) = run(&dispatcher, get("/css/site.css")).await;
    assert_eq!(resp.status, 200);
    assert_eq!(completion, Completion::KeepAlive);
    assert_eq!(resp.header("content-type"), Some("text/css; charset=utf-8"));

    // a matched route is never served from disk
    let (resp, _) = run(&dispatcher, get("/ten.txt")).await;
    assert_eq!(resp.status, 500);

    // only GET falls back
    let (resp, _) = run(&dispatcher, IncomingRequest::new(Method::POST, "/css/site.css")).await;
    assert_eq!(resp.status, 404);
    assert_eq!(resp.text(), "Cannot POST /css/site.css");
}
