//! Local controller actions.
//!
//! A route line `#c:home.index` dispatches to the action registered as
//! `("home", "index")` in the [`ControllerRegistry`]. Actions receive a
//! [`ControllerContext`] holding the request view, the response being composed
//! and the raw request body, and return the body to send.
//!
//! ```rust
//! use corkrouter::dispatcher::{ControllerContext, ControllerRegistry};
//! use corkrouter::server::Body;
//! use futures::future::BoxFuture;
//!
//! fn index(ctx: &mut ControllerContext) -> BoxFuture<'_, anyhow::Result<Body>> {
//!     Box::pin(async move { Ok(ctx.render_raw("hello", None, Some("txt"))) })
//! }
//!
//! let mut registry = ControllerRegistry::new();
//! registry.register("home", "index", index);
//! assert!(registry.contains("home", "index"));
//! ```

use futures::future::BoxFuture;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::core::DispatchError;
use crate::mime;
use crate::router::Route;
use crate::server::{AbortSignal, Body, CookieJar, RedirectMode, RequestContext, ResponseComposer};

/// A controller action.
pub trait Action: Send + Sync {
    fn invoke<'a>(&'a self, ctx: &'a mut ControllerContext) -> BoxFuture<'a, anyhow::Result<Body>>;
}

impl<F> Action for F
where
    F: for<'a> Fn(&'a mut ControllerContext) -> BoxFuture<'a, anyhow::Result<Body>> + Send + Sync,
{
    fn invoke<'a>(&'a self, ctx: &'a mut ControllerContext) -> BoxFuture<'a, anyhow::Result<Body>> {
        self(ctx)
    }
}

/// Controller actions keyed by controller name, then action name.
#[derive(Default, Clone)]
pub struct ControllerRegistry {
    controllers: HashMap<String, HashMap<String, Arc<dyn Action>>>,
}

impl fmt::Debug for ControllerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self
            .controllers
            .iter()
            .flat_map(|(c, actions)| actions.keys().map(move |a| format!("{c}.{a}")))
            .collect();
        names.sort();
        f.debug_struct("ControllerRegistry").field("actions", &names).finish()
    }
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an action.
    pub fn register(
        &mut self,
        controller: &str,
        action: &str,
        handler: impl Action + 'static,
    ) -> &mut Self {
        self.controllers
            .entry(controller.to_string())
            .or_default()
            .insert(action.to_string(), Arc::new(handler));
        self
    }

    pub fn contains(&self, controller: &str, action: &str) -> bool {
        self.controllers
            .get(controller)
            .is_some_and(|actions| actions.contains_key(action))
    }

    pub fn lookup(&self, controller: &str, action: &str) -> Result<Arc<dyn Action>, DispatchError> {
        let actions = self
            .controllers
            .get(controller)
            .ok_or_else(|| DispatchError::ControllerNotFound {
                controller: controller.to_string(),
            })?;
        actions
            .get(action)
            .cloned()
            .ok_or_else(|| DispatchError::ActionNotFound {
                controller: controller.to_string(),
                action: action.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.controllers.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

const CORS_ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
const CORS_ALLOW_HEADERS: &str = "authorization, origin, content-type, accept, x-requested-with";
const CLIENT_HINTS: &[&str] = &[
    "sec-ch-ua-full-version",
    "sec-ch-ua-full-version-list",
    "sec-ch-ua-platform",
    "sec-ch-ua-platform-version",
    "sec-ch-ua-arch",
    "sec-ch-ua-bitness",
    "sec-ch-prefers-color-scheme",
];

/// Everything a controller action works with for one request.
pub struct ControllerContext {
    route: Arc<Route>,
    request: Arc<RequestContext>,
    response: ResponseComposer,
    body: Vec<u8>,
    abort: AbortSignal,
    redirect_mode: RedirectMode,
    /// Default format for [`render_raw`](Self::render_raw) (`"html"`).
    pub format: String,
    started: Instant,
}

impl fmt::Debug for ControllerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerContext")
            .field("route", &self.route.to_string())
            .field("request_id", &self.request.request_id)
            .field("status", &self.response.status())
            .finish()
    }
}

impl ControllerContext {
    pub fn new(
        route: Arc<Route>,
        request: Arc<RequestContext>,
        response: ResponseComposer,
        body: Vec<u8>,
        abort: AbortSignal,
        redirect_mode: RedirectMode,
    ) -> Self {
        Self {
            route,
            request,
            response,
            body,
            abort,
            redirect_mode,
            format: "html".to_string(),
            started: Instant::now(),
        }
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.request.param(name)
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.request.query_param(name)
    }

    pub fn response(&self) -> &ResponseComposer {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut ResponseComposer {
        &mut self.response
    }

    pub fn cookies(&self) -> &CookieJar {
        self.response.cookies()
    }

    pub fn cookies_mut(&mut self) -> &mut CookieJar {
        self.response.cookies_mut()
    }

    /// The full request body as received.
    pub fn read_body(&self) -> &[u8] {
        &self.body
    }

    /// Request body parsed as JSON.
    pub fn read_json<T: serde::de::DeserializeOwned>(&self) -> anyhow::Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }

    /// Time since the action context was created.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn set_status(&mut self, status: u16) {
        self.response.set_status(status);
    }

    pub fn write_header(&mut self, name: &str, value: impl Into<String>) {
        self.response.set_header(name, value);
    }

    pub fn set_cors_headers(&mut self) {
        self.write_header("Access-Control-Allow-Origin", "*");
        self.write_header("Access-Control-Allow-Methods", CORS_ALLOW_METHODS);
        self.write_header("Access-Control-Allow-Headers", CORS_ALLOW_HEADERS);
        self.write_header("Access-Control-Max-Age", "3600");
    }

    pub fn set_client_hints_headers(&mut self) {
        self.write_header("Accept-CH", CLIENT_HINTS.join(", "));
    }

    /// Return `view` as the body, setting the content type from `format`
    /// (defaults to [`format`](Self::format)) and optionally the status.
    pub fn render_raw(&mut self, view: impl Into<Body>, status: Option<u16>, format: Option<&str>) -> Body {
        let format = format.map(str::to_string).unwrap_or_else(|| self.format.clone());
        if !format.is_empty() {
            self.write_header("Content-Type", mime::for_extension(&format));
        }
        if let Some(status) = status {
            self.set_status(status);
        }
        view.into()
    }

    /// Serialize `value` as the JSON body.
    pub fn as_json<T: Serialize>(&mut self, value: &T, status: u16) -> anyhow::Result<Body> {
        let view = serde_json::to_string(value)?;
        Ok(self.render_raw(view, Some(status), Some("json")))
    }

    /// Redirect using the dispatcher's configured mode. Status defaults to 301.
    pub fn redirect(&mut self, location: &str, status: Option<u16>) -> Body {
        let mode = self.redirect_mode;
        self.response.redirect(location, status, mode)
    }

    pub fn redirect_with(&mut self, location: &str, status: Option<u16>, mode: RedirectMode) -> Body {
        self.response.redirect(location, status, mode)
    }

    /// Give the composed response back to the dispatcher.
    pub fn into_response(self) -> ResponseComposer {
        self.response
    }
}
