//! Request cookie parsing and outbound `Set-Cookie` records.
//!
//! A [`CookieJar`] is built from the request `Cookie` header and owned by the
//! [`ResponseComposer`](super::ResponseComposer). Setting a cookie records it
//! for the response *and* writes it through to the inbound view, so a later
//! `get` in the same request sees the new value.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Cookie `Expires` attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Expires {
    /// Relative to now; negative values lie in the past.
    Days(f64),
    At(SystemTime),
    /// Used verbatim.
    Text(String),
}

impl Expires {
    fn render(&self) -> String {
        match self {
            Expires::Days(days) => {
                let now = SystemTime::now();
                let when = match Duration::try_from_secs_f64((days * SECONDS_PER_DAY).abs()) {
                    Ok(offset) if *days >= 0.0 => now.checked_add(offset),
                    Ok(offset) => now.checked_sub(offset),
                    Err(_) if *days > 0.0 => Some(latest_http_date()),
                    Err(_) => None,
                };
                http_date(when.unwrap_or(UNIX_EPOCH))
            }
            Expires::At(when) => http_date(*when),
            Expires::Text(text) => text.clone(),
        }
    }
}

/// 9999-12-31 23:59:59 UTC, the last instant an HTTP date can express.
const LATEST_HTTP_DATE_SECS: u64 = 253_402_300_799;

fn latest_http_date() -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(LATEST_HTTP_DATE_SECS)
}

/// Format `when` as an HTTP date, clamped to the 1970..=9999 range.
fn http_date(when: SystemTime) -> String {
    let when = when.clamp(UNIX_EPOCH, latest_http_date());
    httpdate::fmt_http_date(when)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        }
    }
}

/// Attributes for [`CookieJar::set`]. `path` defaults to `/`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CookieOptions {
    pub path: Option<String>,
    pub domain: Option<String>,
    pub expires: Option<Expires>,
    /// Seconds; fractional values are floored when rendered.
    pub max_age: Option<f64>,
    pub secure: bool,
    pub http_only: bool,
    pub partitioned: bool,
    pub priority: Option<Priority>,
    pub same_site: Option<SameSite>,
}

impl CookieOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn expires(mut self, expires: Expires) -> Self {
        self.expires = Some(expires);
        self
    }

    pub fn max_age(mut self, seconds: f64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn partitioned(mut self, partitioned: bool) -> Self {
        self.partitioned = partitioned;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }
}

/// One outbound cookie with its name and value already encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    pub path: String,
    pub domain: Option<String>,
    pub expires: Option<String>,
    pub max_age: Option<f64>,
    pub secure: bool,
    pub http_only: bool,
    pub partitioned: bool,
    pub priority: Option<Priority>,
    pub same_site: Option<SameSite>,
}

impl CookieRecord {
    /// Render as a `Set-Cookie` header value.
    ///
    /// Attribute order: Path, Domain, Expires, Secure, HttpOnly, Partitioned,
    /// Max-Age, Priority, SameSite.
    pub fn to_header_line(&self) -> String {
        let mut line = format!("{}={}", self.name, self.value);
        line.push_str("; Path=");
        line.push_str(&self.path);
        if let Some(domain) = &self.domain {
            line.push_str("; Domain=");
            line.push_str(domain);
        }
        if let Some(expires) = &self.expires {
            line.push_str("; Expires=");
            line.push_str(expires);
        }
        if self.secure {
            line.push_str("; Secure");
        }
        if self.http_only {
            line.push_str("; HttpOnly");
        }
        if self.partitioned {
            line.push_str("; Partitioned");
        }
        if let Some(max_age) = self.max_age {
            line.push_str(&format!("; Max-Age={}", max_age.floor() as i64));
        }
        if let Some(priority) = self.priority {
            line.push_str("; Priority=");
            line.push_str(priority.as_str());
        }
        if let Some(same_site) = self.same_site {
            line.push_str("; SameSite=");
            line.push_str(same_site.as_str());
        }
        line
    }
}

/// Request cookies plus the cookies the response will set.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    inbound: HashMap<String, String>,
    outbound: Vec<CookieRecord>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `Cookie` request header.
    ///
    /// Pairs are separated by `;`, the first `=` splits name from value, a
    /// surrounding pair of double quotes is removed and both sides are
    /// percent-decoded. Pairs that fail to decode are skipped and the first
    /// occurrence of a name wins.
    pub fn parse(header: &str) -> Self {
        let mut inbound = HashMap::new();
        for pair in header.split(';').map(str::trim_start) {
            if pair.is_empty() {
                continue;
            }
            let (raw_name, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
            let raw_value = raw_value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(raw_value);
            let (Ok(name), Ok(value)) = (
                urlencoding::decode(raw_name.trim_end()),
                urlencoding::decode(raw_value),
            ) else {
                continue;
            };
            if name.is_empty() || inbound.contains_key(name.as_ref()) {
                continue;
            }
            inbound.insert(name.into_owned(), value.into_owned());
        }
        Self {
            inbound,
            outbound: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.inbound.get(name).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.get(name).unwrap_or(default)
    }

    pub fn has(&self, name: &str) -> bool {
        self.inbound.contains_key(name)
    }

    /// Record a cookie for the response. A later `set` or `remove` of the same
    /// name replaces the earlier record in place.
    pub fn set(&mut self, name: &str, value: &str, options: CookieOptions) {
        let record = CookieRecord {
            name: encode_name(name),
            value: encode_value(value),
            path: options.path.unwrap_or_else(|| "/".to_string()),
            domain: options.domain,
            expires: options.expires.as_ref().map(Expires::render),
            max_age: options.max_age,
            secure: options.secure,
            http_only: options.http_only,
            partitioned: options.partitioned,
            priority: options.priority,
            same_site: options.same_site,
        };
        match self.outbound.iter_mut().find(|r| r.name == record.name) {
            Some(existing) => *existing = record,
            None => self.outbound.push(record),
        }
        self.inbound.insert(name.to_string(), value.to_string());
    }

    /// Expire a cookie: empty value, `Expires` one day in the past.
    pub fn remove(&mut self, name: &str, options: CookieOptions) {
        self.set(name, "", options.expires(Expires::Days(-1.0)));
    }

    /// The `Set-Cookie` value for `name`, or `name=` when nothing was set.
    pub fn to_header_line(&self, name: &str) -> String {
        let encoded = encode_name(name);
        self.outbound
            .iter()
            .find(|r| r.name == encoded)
            .map(CookieRecord::to_header_line)
            .unwrap_or_else(|| format!("{encoded}="))
    }

    /// Outbound records in insertion order.
    pub fn outbound(&self) -> &[CookieRecord] {
        &self.outbound
    }

    pub fn set_cookie_lines(&self) -> impl Iterator<Item = String> + '_ {
        self.outbound.iter().map(CookieRecord::to_header_line)
    }

    /// Inbound cookies (request cookies plus write-through), for remote calls.
    pub fn inbound(&self) -> &HashMap<String, String> {
        &self.inbound
    }
}

/// Characters left readable in cookie names after percent-encoding.
const NAME_KEEP: &[u8] = b"!*'#$&+^`|";
/// Characters left readable in cookie values after percent-encoding.
const VALUE_KEEP: &[u8] = b"!*'()#$&+/:<=>?@[]^`{|}";

fn encode_name(name: &str) -> String {
    restore(&urlencoding::encode(name), NAME_KEEP)
}

fn encode_value(value: &str) -> String {
    restore(&urlencoding::encode(value), VALUE_KEEP)
}

/// Undo percent-encoding for the bytes listed in `keep`.
fn restore(encoded: &Cow<'_, str>, keep: &[u8]) -> String {
    let bytes = encoded.as_bytes();
    let mut out = String::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Some(byte) = hex_pair(bytes[i + 1], bytes[i + 2]) {
                if keep.contains(&byte) {
                    out.push(byte as char);
                    i += 3;
                    continue;
                }
            }
        }
        out.push(bytes[i] as char);
        i += 1;
    }
    out
}

fn hex_pair(hi: u8, lo: u8) -> Option<u8> {
    let hi = (hi as char).to_digit(16)?;
    let lo = (lo as char).to_digit(16)?;
    Some((hi * 16 + lo) as u8)
}
