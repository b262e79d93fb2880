//! Remote actions: routes whose handler lives behind a [`ServiceBroker`].
//!
//! The broker receives a [`RemoteCall`] and answers with either a plain body
//! string or a [`RenderEnvelope`] carrying status, headers and cookies.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::mime;
use crate::router::RouteInfo;
use crate::server::{
    meta_redirect_body, script_redirect_body, Body, CookieJar, RedirectMode, RequestContext,
    ResponseComposer,
};

/// A REST alias a broker publishes for one of its actions, e.g.
/// `GET /hello` for `rest1.hello`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestRoute {
    pub method: String,
    pub path: String,
    /// Qualified action name (`service.action`).
    pub action: String,
}

impl RestRoute {
    pub fn new(method: impl Into<String>, path: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            action: action.into(),
        }
    }
}

/// External RPC substrate for `#s:` routes.
pub trait ServiceBroker: Send + Sync {
    /// Invoke the qualified action `name`.
    fn call<'a>(&'a self, name: &'a str, call: RemoteCall) -> BoxFuture<'a, anyhow::Result<RemoteReply>>;

    /// REST aliases to register as routes. Empty by default.
    fn rest_routes(&self) -> Vec<RestRoute> {
        Vec::new()
    }
}

/// Arguments of a remote action call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCall {
    pub route: RouteInfo,
    pub request: Arc<RequestContext>,
    /// Raw `Cookie` request header.
    pub cookies: Option<String>,
    /// Request body for methods that carry one.
    pub post_data: Option<String>,
}

/// Structured remote action result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderEnvelope {
    pub result: String,
    pub headers: BTreeMap<String, String>,
    /// Pre-rendered `Set-Cookie` values.
    pub cookies: Vec<String>,
    pub status_code: Option<u16>,
}

impl RenderEnvelope {
    /// Body with a content type derived from `format` (`html` when `None`).
    pub fn render_raw(view: impl Into<String>, status: Option<u16>, format: Option<&str>) -> Self {
        let mut envelope = Self {
            result: view.into(),
            status_code: status,
            ..Self::default()
        };
        envelope.headers.insert(
            "Content-Type".to_string(),
            mime::for_extension(format.unwrap_or("html")).to_string(),
        );
        envelope
    }

    pub fn as_json<T: Serialize>(value: &T, status: u16) -> anyhow::Result<Self> {
        Ok(Self::render_raw(serde_json::to_string(value)?, Some(status), Some("json")))
    }

    /// Redirect envelope. Status defaults to 301; `jar` contributes its
    /// outbound cookies.
    pub fn redirect(
        location: &str,
        status: Option<u16>,
        mode: RedirectMode,
        jar: Option<&CookieJar>,
    ) -> Self {
        let mut envelope = Self {
            status_code: Some(status.unwrap_or(301)),
            ..Self::default()
        };
        envelope.result = match mode {
            RedirectMode::Header => String::new(),
            RedirectMode::Meta => meta_redirect_body(location),
            RedirectMode::Script => script_redirect_body(location),
        };
        if mode != RedirectMode::Script {
            envelope
                .headers
                .insert("Location".to_string(), location.to_string());
        }
        if let Some(jar) = jar {
            envelope = envelope.with_cookies(jar);
        }
        envelope
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_cookies(mut self, jar: &CookieJar) -> Self {
        self.cookies.extend(jar.set_cookie_lines());
        self
    }
}

/// What a broker returns.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteReply {
    Text(String),
    Envelope(RenderEnvelope),
}

impl From<String> for RemoteReply {
    fn from(text: String) -> Self {
        RemoteReply::Text(text)
    }
}

impl From<&str> for RemoteReply {
    fn from(text: &str) -> Self {
        RemoteReply::Text(text.to_string())
    }
}

impl From<RenderEnvelope> for RemoteReply {
    fn from(envelope: RenderEnvelope) -> Self {
        RemoteReply::Envelope(envelope)
    }
}

impl RemoteReply {
    /// A JSON string becomes [`RemoteReply::Text`], an object an envelope;
    /// any other value is sent as its JSON text.
    pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
        match value {
            Value::String(text) => Ok(RemoteReply::Text(text)),
            Value::Object(_) => Ok(RemoteReply::Envelope(serde_json::from_value(value)?)),
            other => Ok(RemoteReply::Text(other.to_string())),
        }
    }

    /// Copy status, headers and cookies onto `response` and return the body.
    pub fn apply(self, response: &mut ResponseComposer) -> Body {
        match self {
            RemoteReply::Text(text) => Body::Text(text),
            RemoteReply::Envelope(envelope) => {
                if let Some(status) = envelope.status_code {
                    response.set_status(status);
                }
                for (name, value) in envelope.headers {
                    response.set_header(&name, value);
                }
                for line in envelope.cookies {
                    response.push_set_cookie(line);
                }
                Body::Text(envelope.result)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::CookieOptions;
    use serde_json::json;

    #[test]
    fn test_from_json_string_and_envelope() {
        assert_eq!(
            RemoteReply::from_json(json!("Hello API Gateway!")).unwrap(),
            RemoteReply::Text("Hello API Gateway!".into())
        );
        let reply = RemoteReply::from_json(json!({
            "result": "{}",
            "headers": {"Content-Type": "application/json"},
            "statusCode": 201
        }))
        .unwrap();
        let RemoteReply::Envelope(envelope) = reply else {
            panic!("expected envelope");
        };
        assert_eq!(envelope.status_code, Some(201));
        assert!(envelope.cookies.is_empty());
    }

    #[test]
    fn test_apply_envelope() {
        let mut jar = CookieJar::default();
        jar.set("sid", "abc", CookieOptions::new());
        let envelope = RenderEnvelope::redirect("/about", None, RedirectMode::Header, Some(&jar));
        let mut response = ResponseComposer::default();
        let body = RemoteReply::Envelope(envelope).apply(&mut response);
        assert!(body.is_empty());
        assert_eq!(response.status(), 301);
        assert_eq!(response.header("location"), Some("/about"));
        assert_eq!(response.set_cookie_lines(), vec!["sid=abc; Path=/".to_string()]);
    }

    #[test]
    fn test_script_redirect_has_no_location() {
        let envelope = RenderEnvelope::redirect("/x", Some(302), RedirectMode::Script, None);
        assert!(!envelope.headers.contains_key("Location"));
        assert!(envelope.result.contains("window.location.href='/x'"));
    }
}
