//! Route-line parsing.
//!
//! Routes are declared one per line:
//!
//! ```text
//! get /hello/:name #c:home.hello
//! post /api/users #s:users.create
//! any /* #c:home.notFound
//! ```
//!
//! The method token is one of `get post put patch del options head connect
//! trace any` (case-insensitive, `del` meaning DELETE). `#c:` targets a local
//! controller action; `#s:` targets an action called through the service broker.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::sync::Arc;

use super::core::{HandlerKind, Route, RouteMethod};
use super::error::RouteCompileError;
use crate::dispatcher::{AfterHook, BeforeHook, HookFlow};
use crate::server::{Body, RequestContext, ResponseComposer};

#[allow(clippy::expect_used)]
static ROUTE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(get|post|any|options|head|put|connect|trace|patch|del) (.*) #([sc]):([a-z][\w-]+)\.([a-z][\w-]+)$",
    )
    .expect("route line regex must compile")
});

/// Per-route options.
#[derive(Clone)]
pub struct RouteOptions {
    /// Cache TTL in seconds; values `<= 0` disable the `Cache-Control` header.
    pub cache: i64,
    pub before: Option<Arc<dyn BeforeHook>>,
    pub after: Option<Arc<dyn AfterHook>>,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self {
            cache: -1,
            before: None,
            after: None,
        }
    }
}

impl fmt::Debug for RouteOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteOptions")
            .field("cache", &self.cache)
            .field("before", &self.before.is_some())
            .field("after", &self.after.is_some())
            .finish()
    }
}

impl RouteOptions {
    pub fn cache(mut self, ttl_seconds: i64) -> Self {
        self.cache = ttl_seconds;
        self
    }

    pub fn on_before(mut self, hook: impl BeforeHook + 'static) -> Self {
        self.before = Some(Arc::new(hook));
        self
    }

    pub fn on_after(mut self, hook: impl AfterHook + 'static) -> Self {
        self.after = Some(Arc::new(hook));
        self
    }

    /// Synchronous before hook from a closure.
    pub fn on_before_fn<F>(self, hook: F) -> Self
    where
        F: Fn(&Route, &RequestContext, &mut ResponseComposer) -> anyhow::Result<HookFlow>
            + Send
            + Sync
            + 'static,
    {
        self.on_before(hook)
    }

    /// Synchronous after hook from a closure.
    pub fn on_after_fn<F>(self, hook: F) -> Self
    where
        F: Fn(&Route, &RequestContext, &mut ResponseComposer, Body) -> anyhow::Result<Body>
            + Send
            + Sync
            + 'static,
    {
        self.on_after(hook)
    }
}

/// An uncompiled route declaration.
#[derive(Debug, Clone)]
pub struct RouteDef {
    pub method: RouteMethod,
    pub path: String,
    pub handler: HandlerKind,
    pub options: RouteOptions,
}

impl RouteDef {
    pub fn new(method: impl Into<RouteMethod>, path: impl Into<String>, handler: HandlerKind) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            handler,
            options: RouteOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RouteOptions) -> Self {
        self.options = options;
        self
    }
}

/// Parse one route line.
///
/// ```rust
/// use corkrouter::router::{parse_route_line, HandlerKind, RouteOptions};
///
/// let def = parse_route_line("get /hello/:name #c:home.hello", RouteOptions::default()).unwrap();
/// assert_eq!(def.path, "/hello/:name");
/// assert_eq!(def.handler, HandlerKind::controller("home", "hello"));
/// ```
pub fn parse_route_line(line: &str, options: RouteOptions) -> Result<RouteDef, RouteCompileError> {
    let line = line.trim();
    let invalid = || RouteCompileError::InvalidRouteLine {
        line: line.to_string(),
    };
    let caps = ROUTE_LINE.captures(line).ok_or_else(invalid)?;
    let field = |i: usize| caps.get(i).map(|m| m.as_str()).unwrap_or_default();

    let method = RouteMethod::parse(field(1)).ok_or_else(invalid)?;
    let path = field(2).trim();
    if path.is_empty() {
        return Err(invalid());
    }
    let (name, action) = (field(4), field(5));
    let handler = if field(3).eq_ignore_ascii_case("c") {
        HandlerKind::controller(name, action)
    } else {
        HandlerKind::remote(format!("{name}.{action}"))
    };

    Ok(RouteDef {
        method,
        path: path.to_string(),
        handler,
        options,
    })
}
