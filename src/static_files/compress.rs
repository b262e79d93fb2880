//! Streaming content codecs.

use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use serde::Deserialize;
use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

/// Brotli quality for streamed responses (0-11).
const BROTLI_QUALITY: u32 = 5;
/// Brotli window size (10-24).
const BROTLI_WINDOW: u32 = 22;
const BROTLI_BUFFER: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum Codec {
    #[serde(rename = "gzip")]
    Gzip,
    #[serde(rename = "br")]
    Brotli,
    /// zlib-wrapped deflate, which is what `Content-Encoding: deflate` means.
    #[serde(rename = "deflate")]
    Deflate,
}

/// Default negotiation order.
pub const DEFAULT_PRIORITY: [Codec; 3] = [Codec::Gzip, Codec::Brotli, Codec::Deflate];

impl Codec {
    /// `Content-Encoding` token.
    pub fn token(&self) -> &'static str {
        match self {
            Codec::Gzip => "gzip",
            Codec::Brotli => "br",
            Codec::Deflate => "deflate",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Codec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gzip" => Ok(Codec::Gzip),
            "br" | "brotli" => Ok(Codec::Brotli),
            "deflate" => Ok(Codec::Deflate),
            other => Err(format!("unknown codec '{other}'")),
        }
    }
}

/// First codec in `priority` whose token occurs in `accept_encoding`.
///
/// Matching is by substring, so `q=0` parameters are not honoured.
pub fn negotiate(accept_encoding: &str, priority: &[Codec]) -> Option<Codec> {
    priority
        .iter()
        .copied()
        .find(|codec| accept_encoding.contains(codec.token()))
}

/// Writer whose contents can be taken while an encoder still owns a handle to it.
#[derive(Debug, Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn take(&self) -> Vec<u8> {
        let mut guard = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(&mut *guard)
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

enum Inner {
    Gzip(GzEncoder<SharedBuffer>),
    Deflate(ZlibEncoder<SharedBuffer>),
    Brotli(Box<brotli::CompressorWriter<SharedBuffer>>),
}

/// Incremental encoder: feed chunks, collect whatever output is ready.
pub struct Encoder {
    codec: Codec,
    inner: Inner,
    out: SharedBuffer,
}

impl fmt::Debug for Encoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Encoder").field("codec", &self.codec).finish()
    }
}

impl Encoder {
    pub fn new(codec: Codec) -> Self {
        let out = SharedBuffer::default();
        let inner = match codec {
            Codec::Gzip => Inner::Gzip(GzEncoder::new(out.clone(), Compression::default())),
            Codec::Deflate => Inner::Deflate(ZlibEncoder::new(out.clone(), Compression::default())),
            Codec::Brotli => Inner::Brotli(Box::new(brotli::CompressorWriter::new(
                out.clone(),
                BROTLI_BUFFER,
                BROTLI_QUALITY,
                BROTLI_WINDOW,
            ))),
        };
        Self { codec, inner, out }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Compress `data`; returns the bytes produced so far (possibly none).
    pub fn encode(&mut self, data: &[u8]) -> io::Result<Vec<u8>> {
        match &mut self.inner {
            Inner::Gzip(e) => e.write_all(data)?,
            Inner::Deflate(e) => e.write_all(data)?,
            Inner::Brotli(e) => e.write_all(data)?,
        }
        Ok(self.out.take())
    }

    /// Finish the stream and return the trailing bytes.
    pub fn finish(self) -> io::Result<Vec<u8>> {
        match self.inner {
            Inner::Gzip(e) => {
                e.finish()?;
            }
            Inner::Deflate(e) => {
                e.finish()?;
            }
            Inner::Brotli(e) => {
                drop((*e).into_inner());
            }
        }
        Ok(self.out.take())
    }
}
