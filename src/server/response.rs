//! Response accumulation and serialization.
//!
//! Handlers, hooks and remote replies mutate a [`ResponseComposer`]; the
//! dispatcher flushes it exactly once. Flushing consumes the composer, so a
//! response cannot be written twice.

use serde::Deserialize;
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::warn;

use super::cookies::CookieJar;
use super::request::{header_value, IncomingRequest};

/// Maximum number of response headers before heap allocation.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Header storage; names keep the case they were set with and compare
/// case-insensitively.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

pub const DEFAULT_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Canonical reason phrase for a status code, `"Unknown"` when there is none.
pub fn status_reason(status: u16) -> &'static str {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown")
}

/// Response body produced by a handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Body {
    #[default]
    Empty,
    Text(String),
    Bytes(Vec<u8>),
}

impl Body {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Body::Empty => &[],
            Body::Text(s) => s.as_bytes(),
            Body::Bytes(b) => b,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Body::Empty => Vec::new(),
            Body::Text(s) => s.into_bytes(),
            Body::Bytes(b) => b,
        }
    }

    /// Text view; bytes that are not UTF-8 are replaced.
    pub fn to_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Text(s)
    }
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Body::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Body {
    fn from(b: Vec<u8>) -> Self {
        Body::Bytes(b)
    }
}

/// How redirects are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedirectMode {
    /// `Location` header and an empty body.
    Header,
    /// `Location` header plus an HTML meta-refresh page.
    #[default]
    Meta,
    /// HTML page assigning `window.location.href`; no `Location` header.
    #[serde(alias = "js")]
    Script,
}

impl FromStr for RedirectMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "header" => Ok(RedirectMode::Header),
            "meta" => Ok(RedirectMode::Meta),
            "js" | "script" => Ok(RedirectMode::Script),
            other => Err(format!("unknown redirect mode '{other}'")),
        }
    }
}

impl fmt::Display for RedirectMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RedirectMode::Header => "header",
            RedirectMode::Meta => "meta",
            RedirectMode::Script => "js",
        })
    }
}

/// Meta-refresh redirect page. `"` in the location is percent-encoded.
pub fn meta_redirect_body(location: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta http-equiv=\"refresh\" content=\"0; url={}\"></head></html>",
        location.replace('"', "%22")
    )
}

/// Script redirect page.
pub fn script_redirect_body(location: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><script>window.location.href='{}'</script></head></html>",
        location.replace('\'', "%27")
    )
}

/// Connection-level parameters for serializing a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushOptions {
    /// HEAD request: write headers only.
    pub head_only: bool,
    pub keep_alive: bool,
    /// Route cache TTL; `> 0` adds `Cache-Control: public, max-age=<ttl>`.
    pub cache_ttl: i64,
}

impl FlushOptions {
    pub fn for_request(request: &IncomingRequest) -> Self {
        Self {
            head_only: request.method == http::Method::HEAD,
            keep_alive: request.keep_alive,
            cache_ttl: -1,
        }
    }

    pub fn with_cache_ttl(mut self, ttl: i64) -> Self {
        self.cache_ttl = ttl;
        self
    }
}

/// Mutable response state for one request.
#[derive(Debug, Clone)]
pub struct ResponseComposer {
    status: u16,
    headers: HeaderVec,
    cookies: CookieJar,
    raw_cookies: Vec<String>,
    body: Body,
}

impl Default for ResponseComposer {
    fn default() -> Self {
        Self::new(CookieJar::default())
    }
}

impl ResponseComposer {
    pub fn new(cookies: CookieJar) -> Self {
        Self {
            status: 200,
            headers: HeaderVec::new(),
            cookies,
            raw_cookies: Vec::new(),
            body: Body::Empty,
        }
    }

    /// Plain-text response, used for 404/500 and other framework replies.
    pub fn text(status: u16, message: impl Into<String>) -> Self {
        let mut response = Self::default();
        response.set_status(status);
        response.set_header("Content-Type", "text/plain; charset=utf-8");
        response.set_body(message.into());
        response
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    /// Set a header, replacing any existing value (case-insensitive name match).
    ///
    /// A name or value that is not a legal header field (CR, LF and other
    /// control bytes included) is dropped and any existing value is kept.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if !is_valid_header(name, &value) {
            warn!(header = %name, "Dropping invalid response header");
            return;
        }
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((Arc::from(name), value));
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    pub fn headers(&self) -> &HeaderVec {
        &self.headers
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    pub fn cookies_mut(&mut self) -> &mut CookieJar {
        &mut self.cookies
    }

    /// Add a preformatted `Set-Cookie` value, written after the jar's records.
    pub fn push_set_cookie(&mut self, line: impl Into<String>) {
        let line = line.into();
        if !is_valid_header("Set-Cookie", &line) {
            warn!("Dropping invalid Set-Cookie line");
            return;
        }
        self.raw_cookies.push(line);
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<Body>) {
        self.body = body.into();
    }

    pub fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }

    /// Apply a redirect and return the body to send with it. Status defaults to 301.
    pub fn redirect(&mut self, location: &str, status: Option<u16>, mode: RedirectMode) -> Body {
        self.set_status(status.unwrap_or(301));
        match mode {
            RedirectMode::Header => {
                self.set_header("Location", location);
                Body::Empty
            }
            RedirectMode::Meta => {
                self.set_header("Location", location);
                Body::Text(meta_redirect_body(location))
            }
            RedirectMode::Script => Body::Text(script_redirect_body(location)),
        }
    }

    /// `Set-Cookie` values in output order.
    pub fn set_cookie_lines(&self) -> Vec<String> {
        self.cookies
            .set_cookie_lines()
            .chain(self.raw_cookies.iter().cloned())
            .collect()
    }

    /// Serialize the complete response: status line, headers, cookies, body.
    pub fn into_wire_bytes(mut self, options: &FlushOptions) -> Vec<u8> {
        let body = self.take_body();
        let bodyless = status_forbids_body(self.status);
        let length = (!bodyless).then_some(body.len() as u64);
        let mut out = self.head_bytes(length, !body.is_empty(), options);
        if !options.head_only && !bodyless {
            out.extend_from_slice(body.as_bytes());
        }
        out
    }

    /// Serialize only the head. `content_length: None` selects chunked framing.
    pub fn into_head_bytes(self, content_length: Option<u64>, options: &FlushOptions) -> Vec<u8> {
        self.head_bytes(content_length, true, options)
    }

    fn head_bytes(&self, content_length: Option<u64>, has_body: bool, options: &FlushOptions) -> Vec<u8> {
        let mut head = String::with_capacity(256);
        head.push_str(&format!(
            "HTTP/1.1 {} {}\r\n",
            self.status,
            status_reason(self.status)
        ));
        for (name, value) in &self.headers {
            if is_framing_header(name) {
                continue;
            }
            push_header(&mut head, name, value);
        }
        if has_body && self.header("content-type").is_none() && !status_forbids_body(self.status) {
            push_header(&mut head, "Content-Type", DEFAULT_CONTENT_TYPE);
        }
        if options.cache_ttl > 0 && self.header("cache-control").is_none() {
            push_header(
                &mut head,
                "Cache-Control",
                &format!("public, max-age={}", options.cache_ttl),
            );
        }
        for line in self.set_cookie_lines() {
            push_header(&mut head, "Set-Cookie", &line);
        }
        if self.header("date").is_none() {
            push_header(&mut head, "Date", &httpdate::fmt_http_date(SystemTime::now()));
        }
        if !status_forbids_body(self.status) {
            match content_length {
                Some(len) => push_header(&mut head, "Content-Length", &len.to_string()),
                None => push_header(&mut head, "Transfer-Encoding", "chunked"),
            }
        }
        push_header(
            &mut head,
            "Connection",
            if options.keep_alive { "keep-alive" } else { "close" },
        );
        head.push_str("\r\n");
        head.into_bytes()
    }
}

fn push_header(head: &mut String, name: &str, value: &str) {
    // Cookie attributes reach here without passing through `set_header`.
    if !is_valid_header(name, value) {
        warn!(header = %name, "Dropping invalid response header");
        return;
    }
    head.push_str(name);
    head.push_str(": ");
    head.push_str(value);
    head.push_str("\r\n");
}

fn is_valid_header(name: &str, value: &str) -> bool {
    http::HeaderName::from_bytes(name.as_bytes()).is_ok()
        && http::HeaderValue::from_bytes(value.as_bytes()).is_ok()
}

fn is_framing_header(name: &str) -> bool {
    ["content-length", "transfer-encoding", "connection"]
        .iter()
        .any(|h| name.eq_ignore_ascii_case(h))
}

fn status_forbids_body(status: u16) -> bool {
    (100..200).contains(&status) || status == 204 || status == 304
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> FlushOptions {
        FlushOptions {
            head_only: false,
            keep_alive: true,
            cache_ttl: -1,
        }
    }

    #[test]
    fn test_status_reason() {
        assert_eq!(status_reason(200), "OK");
        assert_eq!(status_reason(404), "Not Found");
        assert_eq!(status_reason(416), "Range Not Satisfiable");
        assert_eq!(status_reason(599), "Unknown");
    }

    #[test]
    fn test_set_header_replaces_case_insensitively() {
        let mut r = ResponseComposer::default();
        r.set_header("X-Thing", "a");
        r.set_header("x-thing", "b");
        assert_eq!(r.headers().len(), 1);
        assert_eq!(r.header("X-THING"), Some("b"));
    }

    #[test]
    fn test_serialization_order() {
        let mut r = ResponseComposer::default();
        r.set_status(201);
        r.set_header("X-A", "1");
        r.cookies_mut().set("sid", "abc", Default::default());
        r.set_body("hi");
        let text = String::from_utf8(r.into_wire_bytes(&options())).unwrap();
        assert!(text.starts_with("HTTP/1.1 201 Created\r\n"));
        let a = text.find("X-A: 1").unwrap();
        let cookie = text.find("Set-Cookie: sid=abc; Path=/").unwrap();
        let len = text.find("Content-Length: 2").unwrap();
        assert!(a < cookie && cookie < len);
        assert!(text.contains("Content-Type: text/html; charset=utf-8\r\n"));
        assert!(text.ends_with("\r\n\r\nhi"));
    }

    #[test]
    fn test_head_only_keeps_length_and_drops_body() {
        let mut r = ResponseComposer::default();
        r.set_body("hello");
        let opts = FlushOptions {
            head_only: true,
            ..options()
        };
        let text = String::from_utf8(r.into_wire_bytes(&opts)).unwrap();
        assert!(text.contains("Content-Length: 5\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_cache_ttl_adds_cache_control_unless_set() {
        let opts = options().with_cache_ttl(60);
        let text = String::from_utf8(ResponseComposer::default().into_wire_bytes(&opts)).unwrap();
        assert!(text.contains("Cache-Control: public, max-age=60\r\n"));

        let mut r = ResponseComposer::default();
        r.set_header("Cache-Control", "no-store");
        let text = String::from_utf8(r.into_wire_bytes(&opts)).unwrap();
        assert!(text.contains("Cache-Control: no-store\r\n"));
        assert!(!text.contains("max-age=60"));
    }

    #[test]
    fn test_redirect_modes() {
        let mut r = ResponseComposer::default();
        let body = r.redirect("/a\"b", None, RedirectMode::Meta);
        assert_eq!(r.status(), 301);
        assert_eq!(r.header("location"), Some("/a\"b"));
        assert!(body.to_text().contains("content=\"0; url=/a%22b\""));

        let mut r = ResponseComposer::default();
        let body = r.redirect("/next", Some(302), RedirectMode::Script);
        assert_eq!(r.status(), 302);
        assert_eq!(r.header("location"), None);
        assert!(body.to_text().contains("window.location.href='/next'"));

        let mut r = ResponseComposer::default();
        assert_eq!(r.redirect("/h", None, RedirectMode::Header), Body::Empty);
        assert_eq!(r.header("Location"), Some("/h"));
    }

    #[test]
    fn test_header_values_with_line_breaks_are_dropped() {
        let mut r = ResponseComposer::default();
        let body = r.redirect("/x\r\nSet-Cookie: evil=1", None, RedirectMode::Header);
        assert_eq!(body, Body::Empty);
        assert_eq!(r.header("location"), None);

        r.set_header("X-Trace", "ok");
        r.set_header("X-Trace", "a\nb");
        r.set_header("Bad Name", "v");
        r.push_set_cookie("sid=1\r\nX-Evil: 1");
        r.cookies_mut().set(
            "k",
            "v",
            crate::server::CookieOptions::new().path("/\r\nX-Evil: 2"),
        );
        assert_eq!(r.header("x-trace"), Some("ok"));

        let text = String::from_utf8(r.into_wire_bytes(&options())).unwrap();
        assert!(text.starts_with("HTTP/1.1 301 Moved Permanently\r\n"));
        assert!(!text.contains("evil"));
        assert!(!text.contains("X-Evil"));
        assert!(!text.contains("Bad Name"));
        assert!(!text.contains("Location"));
        assert!(text.contains("X-Trace: ok\r\n"));
    }
}
