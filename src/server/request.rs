//! Incoming requests and the per-request context handed to handlers.

use http::Method;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::debug;

use crate::ids::RequestId;
use crate::router::{ParamVec, RouteInfo, RouteMatch};

use super::response::HeaderVec;

/// A request as read off the wire, before routing.
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    pub method: Method,
    /// Request target: path plus optional `?query`.
    pub target: String,
    /// Header names are lowercase.
    pub headers: HeaderVec,
    pub body: Vec<u8>,
    pub peer: Option<SocketAddr>,
    /// Whether the connection may be reused after this response.
    pub keep_alive: bool,
}

impl IncomingRequest {
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            headers: HeaderVec::new(),
            body: Vec::new(),
            peer: None,
            keep_alive: true,
        }
    }

    /// Builder-style header, stored under its lowercase name.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers
            .push((Arc::from(name.to_ascii_lowercase()), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn path(&self) -> &str {
        self.target
            .split_once('?')
            .map(|(path, _)| path)
            .unwrap_or(&self.target)
    }

    pub fn query(&self) -> &str {
        self.target
            .split_once('?')
            .map(|(_, query)| query)
            .unwrap_or("")
    }

    /// First value of a header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }
}

pub(crate) fn header_value<'a>(headers: &'a [(Arc<str>, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn serialize_method<S: Serializer>(method: &Method, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(method.as_str())
}

/// Read-only view of a routed request.
///
/// Serializes to the snapshot sent along with remote action calls.
#[derive(Debug, Clone, Serialize)]
pub struct RequestContext {
    pub request_id: RequestId,
    #[serde(serialize_with = "serialize_method")]
    pub method: Method,
    /// Path without the query string.
    pub url: String,
    /// Raw query string without the leading `?`.
    #[serde(rename = "query")]
    pub query_raw: String,
    /// Decoded query parameters; for repeated keys the last one wins on lookup.
    #[serde(rename = "parameters")]
    pub query_params: ParamVec,
    pub headers: HeaderVec,
    pub params: ParamVec,
    pub client_ip: String,
    pub route: RouteInfo,
}

impl RequestContext {
    pub fn new(incoming: &IncomingRequest, route_match: &RouteMatch, trust_proxy_headers: bool) -> Self {
        let query_raw = incoming.query().to_string();
        let query_params = url::form_urlencoded::parse(query_raw.as_bytes())
            .map(|(k, v)| (Arc::from(k.as_ref()), v.into_owned()))
            .collect();
        let request_id = RequestId::from_header_or_new(incoming.header("x-request-id"));
        let client_ip = resolve_client_ip(
            &incoming.headers,
            incoming.peer.map(|p| p.ip()),
            trust_proxy_headers,
        );
        Self {
            request_id,
            method: incoming.method.clone(),
            url: incoming.path().to_string(),
            query_raw,
            query_params,
            headers: incoming.headers.clone(),
            params: route_match.path_params.clone(),
            client_ip,
            route: route_match.route.info(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Note: allocates.
    pub fn params_map(&self) -> HashMap<String, String> {
        self.params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    /// Note: allocates. Repeated keys keep the last value.
    pub fn query_map(&self) -> HashMap<String, String> {
        self.query_params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.header("user-agent")
    }

    pub fn referer(&self) -> Option<&str> {
        self.header("referer")
    }

    pub fn host(&self) -> Option<&str> {
        self.header("host")
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

const UNKNOWN_CLIENT_IP: &str = "0.0.0.0";

/// Headers consulted, in order, for the client address when proxy headers are trusted.
const CLIENT_IP_HEADERS: &[&str] = &[
    "x-client-ip",
    "x-forwarded-for",
    "cf-connecting-ip",
    "fastly-client-ip",
    "true-client-ip",
    "x-real-ip",
    "x-cluster-client-ip",
    "x-forwarded",
    "forwarded-for",
    "forwarded",
    "x-appengine-user-ip",
    "cf-pseudo-ipv4",
];

/// Determine the client address.
///
/// With `trust_proxy_headers` the first header in the proxy chain carrying a
/// valid IP wins (for `x-forwarded-for` the first valid entry of the list);
/// otherwise, or when no header qualifies, the socket peer address is used.
/// IPv4-mapped IPv6 addresses are reported as IPv4 and other IPv6 addresses in
/// full eight-group form. Falls back to `0.0.0.0` when nothing is known.
pub fn resolve_client_ip(
    headers: &[(Arc<str>, String)],
    peer: Option<IpAddr>,
    trust_proxy_headers: bool,
) -> String {
    if trust_proxy_headers {
        for name in CLIENT_IP_HEADERS {
            let Some(value) = header_value(headers, name) else {
                continue;
            };
            let found = if *name == "x-forwarded-for" {
                value.split(',').find_map(parse_forwarded_entry)
            } else {
                parse_forwarded_entry(value)
            };
            if let Some(ip) = found {
                debug!(header = %name, ip = %ip, "Client IP taken from proxy header");
                return normalize_ip(ip);
            }
        }
    }
    peer.map(normalize_ip).unwrap_or_else(|| UNKNOWN_CLIENT_IP.to_string())
}

fn parse_forwarded_entry(entry: &str) -> Option<IpAddr> {
    let entry = entry.trim();
    if let Ok(ip) = entry.parse::<IpAddr>() {
        return Some(ip);
    }
    // `203.0.113.7:51234` or `[2001:db8::1]:443`
    entry.parse::<SocketAddr>().ok().map(|addr| addr.ip())
}

/// Render an address the way handlers see it.
pub fn normalize_ip(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => v4.to_string(),
            None => v6
                .segments()
                .iter()
                .map(|s| format!("{s:04x}"))
                .collect::<Vec<_>>()
                .join(":"),
        },
    }
}
