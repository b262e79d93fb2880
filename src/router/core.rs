//! Route table: compiled routes grouped by method, first match wins.

use http::Method;
use serde::Serialize;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use super::dsl::{parse_route_line, RouteDef, RouteOptions};
use super::error::RouteCompileError;
use super::pattern::{compile_pattern, CompileMode, CompiledPattern};
use crate::dispatcher::{AfterHook, BeforeHook, ServiceBroker};

/// Maximum number of path/query parameters before heap allocation.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Parameter storage for matched routes and parsed query strings.
///
/// Names are `Arc<str>` shared with the compiled route; values are per request.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// Method a route is registered for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RouteMethod {
    /// Fallback group consulted after the request method's own group.
    Any,
    Exact(Method),
}

impl RouteMethod {
    /// Parse a route-line method token (case-insensitive). `del` means DELETE.
    pub fn parse(token: &str) -> Option<Self> {
        let method = match token.to_ascii_lowercase().as_str() {
            "any" => return Some(RouteMethod::Any),
            "get" => Method::GET,
            "post" => Method::POST,
            "put" => Method::PUT,
            "patch" => Method::PATCH,
            "options" => Method::OPTIONS,
            "head" => Method::HEAD,
            "connect" => Method::CONNECT,
            "trace" => Method::TRACE,
            "del" | "delete" => Method::DELETE,
            _ => return None,
        };
        Some(RouteMethod::Exact(method))
    }

    pub fn as_str(&self) -> &str {
        match self {
            RouteMethod::Any => "ANY",
            RouteMethod::Exact(method) => method.as_str(),
        }
    }
}

impl fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for RouteMethod {
    fn from(method: Method) -> Self {
        RouteMethod::Exact(method)
    }
}

/// What a route dispatches to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerKind {
    /// `#c:<controller>.<action>`, a locally registered controller action.
    Controller { controller: String, action: String },
    /// `#s:<service>.<action>`, an action invoked through the service broker.
    RemoteAction { action: String },
}

impl HandlerKind {
    pub fn controller(controller: impl Into<String>, action: impl Into<String>) -> Self {
        HandlerKind::Controller {
            controller: controller.into(),
            action: action.into(),
        }
    }

    pub fn remote(action: impl Into<String>) -> Self {
        HandlerKind::RemoteAction {
            action: action.into(),
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerKind::Controller { controller, action } => write!(f, "c:{controller}.{action}"),
            HandlerKind::RemoteAction { action } => write!(f, "s:{action}"),
        }
    }
}

/// Route description handed to remote actions and exposed on the request context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteInfo {
    pub path: String,
    pub method: String,
    pub cache: i64,
}

/// A compiled route.
#[derive(Debug)]
pub struct Route {
    method: RouteMethod,
    pattern: CompiledPattern,
    handler: HandlerKind,
    options: RouteOptions,
}

impl Route {
    pub fn compile(def: RouteDef, mode: CompileMode) -> Result<Self, RouteCompileError> {
        let pattern = compile_pattern(&def.path, mode)?;
        Ok(Self {
            method: def.method,
            pattern,
            handler: def.handler,
            options: def.options,
        })
    }

    pub fn method(&self) -> &RouteMethod {
        &self.method
    }

    /// The template the route was declared with.
    pub fn path(&self) -> &str {
        self.pattern.template()
    }

    pub fn pattern(&self) -> &CompiledPattern {
        &self.pattern
    }

    pub fn handler(&self) -> &HandlerKind {
        &self.handler
    }

    /// Cache TTL in seconds; `-1` when unset.
    pub fn cache_ttl(&self) -> i64 {
        self.options.cache
    }

    pub fn before_hook(&self) -> Option<&Arc<dyn BeforeHook>> {
        self.options.before.as_ref()
    }

    pub fn after_hook(&self) -> Option<&Arc<dyn AfterHook>> {
        self.options.after.as_ref()
    }

    pub fn info(&self) -> RouteInfo {
        RouteInfo {
            path: self.path().to_string(),
            method: self.method.as_str().to_ascii_lowercase(),
            cache: self.options.cache,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} #{}", self.method, self.path(), self.handler)
    }
}

/// Result of successfully matching a request path to a route.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<Route>,
    /// Decoded captures keyed by parameter name (`"0"`, `"1"`, ... for unnamed groups).
    pub path_params: ParamVec,
}

impl RouteMatch {
    /// Get a path parameter by name. The last occurrence wins.
    #[inline]
    #[must_use]
    pub fn get_path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Note: allocates; prefer [`get_path_param`](Self::get_path_param) on the request path.
    #[must_use]
    pub fn path_params_map(&self) -> HashMap<String, String> {
        self.path_params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }
}

/// Immutable routing table built by [`RouteTableBuilder`].
///
/// Routes are grouped by method. A request is matched against its own
/// method's group in declaration order, then against the `any` group.
#[derive(Debug, Default)]
pub struct RouteTable {
    by_method: HashMap<Method, Vec<Arc<Route>>>,
    any: Vec<Arc<Route>>,
    ordered: Vec<Arc<Route>>,
}

impl RouteTable {
    pub fn builder(mode: CompileMode) -> RouteTableBuilder {
        RouteTableBuilder::new(mode)
    }

    #[must_use]
    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        let groups = self
            .by_method
            .get(method)
            .into_iter()
            .chain(std::iter::once(&self.any));
        for group in groups {
            for route in group {
                if let Some(path_params) = route.pattern.captures(path) {
                    debug!(
                        method = %method,
                        path = %path,
                        route_pattern = %route.path(),
                        handler = %route.handler,
                        path_params = ?path_params,
                        "Route matched"
                    );
                    return Some(RouteMatch {
                        route: Arc::clone(route),
                        path_params,
                    });
                }
            }
        }
        debug!(method = %method, path = %path, "No route matched");
        None
    }

    /// Routes in declaration order.
    pub fn routes(&self) -> impl Iterator<Item = &Arc<Route>> {
        self.ordered.iter()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

/// Accumulates route definitions and compiles them into a [`RouteTable`].
#[derive(Debug, Default)]
pub struct RouteTableBuilder {
    mode: CompileMode,
    routes: Vec<Route>,
}

impl RouteTableBuilder {
    pub fn new(mode: CompileMode) -> Self {
        Self {
            mode,
            routes: Vec::new(),
        }
    }

    pub fn mode(&self) -> CompileMode {
        self.mode
    }

    /// Append a route after all existing ones.
    pub fn add(&mut self, def: RouteDef) -> Result<&mut Self, RouteCompileError> {
        let route = Route::compile(def, self.mode)?;
        self.routes.push(route);
        Ok(self)
    }

    /// Insert a route ahead of all existing ones.
    pub fn prepend(&mut self, def: RouteDef) -> Result<&mut Self, RouteCompileError> {
        let route = Route::compile(def, self.mode)?;
        self.routes.insert(0, route);
        Ok(self)
    }

    /// Replace the route with the same method and template, or append.
    pub fn add_or_replace(&mut self, def: RouteDef) -> Result<&mut Self, RouteCompileError> {
        let route = Route::compile(def, self.mode)?;
        match self
            .routes
            .iter_mut()
            .find(|existing| existing.method == route.method && existing.path() == route.path())
        {
            Some(existing) => {
                debug!(route = %route, "Replacing existing route");
                *existing = route;
            }
            None => self.routes.push(route),
        }
        Ok(self)
    }

    /// Parse and append one `<method> <path> #<c|s>:<name>.<action>` line.
    ///
    /// In lenient mode a line that does not parse is logged and skipped.
    pub fn add_line(
        &mut self,
        line: &str,
        options: RouteOptions,
    ) -> Result<&mut Self, RouteCompileError> {
        match parse_route_line(line, options) {
            Ok(def) => self.add(def),
            Err(err) if self.mode == CompileMode::Lenient => {
                tracing::warn!(line = %line, error = %err, "Skipping invalid route line");
                Ok(self)
            }
            Err(err) => Err(err),
        }
    }

    /// Append every route line in `text`. Blank lines and lines starting with
    /// `#` or `//` are ignored.
    pub fn add_lines(&mut self, text: &str) -> Result<&mut Self, RouteCompileError> {
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
                continue;
            }
            self.add_line(line, RouteOptions::default())?;
        }
        Ok(self)
    }

    /// Register a remote-action route for every REST alias the broker publishes.
    pub fn bind_broker_routes(
        &mut self,
        broker: &dyn ServiceBroker,
    ) -> Result<&mut Self, RouteCompileError> {
        for rest in broker.rest_routes() {
            let Some(method) = RouteMethod::parse(&rest.method) else {
                if self.mode == CompileMode::Strict {
                    return Err(RouteCompileError::InvalidRouteLine {
                        line: format!("{} {} #s:{}", rest.method, rest.path, rest.action),
                    });
                }
                tracing::warn!(
                    method = %rest.method,
                    path = %rest.path,
                    action = %rest.action,
                    "Skipping broker route with unknown method"
                );
                continue;
            };
            debug!(method = %method, path = %rest.path, action = %rest.action, "Binding broker route");
            self.add(RouteDef::new(method, rest.path, HandlerKind::remote(rest.action)))?;
        }
        Ok(self)
    }

    pub fn build(self) -> RouteTable {
        let mut table = RouteTable::default();
        for route in self.routes {
            let route = Arc::new(route);
            match &route.method {
                RouteMethod::Any => table.any.push(Arc::clone(&route)),
                RouteMethod::Exact(method) => table
                    .by_method
                    .entry(method.clone())
                    .or_default()
                    .push(Arc::clone(&route)),
            }
            table.ordered.push(route);
        }
        let summary: Vec<String> = table.ordered.iter().take(10).map(|r| r.to_string()).collect();
        info!(
            routes_count = table.ordered.len(),
            methods = table.by_method.len(),
            any_routes = table.any.len(),
            routes_summary = ?summary,
            "Routing table loaded"
        );
        table
    }
}
