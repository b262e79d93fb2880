use futures::FutureExt;
use http::Method;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::controller::{ControllerContext, ControllerRegistry};
use super::hooks::HookFlow;
use super::remote::{RemoteCall, ServiceBroker};
use crate::router::{HandlerKind, Route, RouteTable};
use crate::server::{
    AbortSignal, CookieJar, FlushOptions, IncomingRequest, RedirectMode, RequestContext,
    ResponseComposer, Wire, WireError,
};
use crate::static_files::{StaticFiles, StreamOutcome};

/// What the connection should do after a request was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Response written; the connection may carry another request.
    KeepAlive,
    /// Response written (or the write failed); close the connection.
    Close,
    /// The client went away; nothing more may be written.
    Aborted,
}

impl Completion {
    fn after_write(keep_alive: bool) -> Self {
        if keep_alive {
            Completion::KeepAlive
        } else {
            Completion::Close
        }
    }

    fn after_stream(outcome: StreamOutcome, keep_alive: bool) -> Self {
        match outcome {
            StreamOutcome::Aborted => Completion::Aborted,
            outcome if outcome.connection_reusable() => Self::after_write(keep_alive),
            _ => Completion::Close,
        }
    }
}

/// Failures raised by the dispatcher itself while resolving a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    ControllerNotFound { controller: String },
    ActionNotFound { controller: String, action: String },
    /// A remote action route was hit but no broker is configured.
    BrokerMissing { action: String },
    /// A handler panicked.
    HandlerPanicked { message: String },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::ControllerNotFound { controller } => {
                write!(f, "controller {controller} not found")
            }
            DispatchError::ActionNotFound { controller, action } => {
                write!(f, "method {action} for controller {controller} not found")
            }
            DispatchError::BrokerMissing { action } => {
                write!(f, "no service broker configured for remote action {action}")
            }
            DispatchError::HandlerPanicked { message } => write!(f, "Handler panicked: {message}"),
        }
    }
}

impl std::error::Error for DispatchError {}

/// Routes requests to controller actions, remote actions or the static
/// file server, and flushes what they composed.
pub struct Dispatcher {
    routes: RouteTable,
    controllers: ControllerRegistry,
    broker: Option<Arc<dyn ServiceBroker>>,
    static_files: Option<StaticFiles>,
    redirect_mode: RedirectMode,
    trust_proxy_headers: bool,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.routes.len())
            .field("controllers", &self.controllers)
            .field("broker", &self.broker.is_some())
            .field("static_files", &self.static_files)
            .field("redirect_mode", &self.redirect_mode)
            .field("trust_proxy_headers", &self.trust_proxy_headers)
            .finish()
    }
}

/// Assembles a [`Dispatcher`] from an already built route table.
pub struct DispatcherBuilder {
    routes: RouteTable,
    controllers: ControllerRegistry,
    broker: Option<Arc<dyn ServiceBroker>>,
    static_files: Option<StaticFiles>,
    redirect_mode: RedirectMode,
    trust_proxy_headers: bool,
}

impl DispatcherBuilder {
    pub fn controllers(mut self, controllers: ControllerRegistry) -> Self {
        self.controllers = controllers;
        self
    }

    pub fn broker(mut self, broker: Arc<dyn ServiceBroker>) -> Self {
        self.broker = Some(broker);
        self
    }

    pub fn static_files(mut self, static_files: StaticFiles) -> Self {
        self.static_files = Some(static_files);
        self
    }

    pub fn redirect_mode(mut self, mode: RedirectMode) -> Self {
        self.redirect_mode = mode;
        self
    }

    pub fn trust_proxy_headers(mut self, trust: bool) -> Self {
        self.trust_proxy_headers = trust;
        self
    }

    pub fn build(self) -> Dispatcher {
        for route in self.routes.routes() {
            if let HandlerKind::Controller { controller, action } = route.handler() {
                if !self.controllers.contains(controller, action) {
                    warn!(route = %route, "Route points at an unregistered controller action");
                }
            }
        }
        info!(
            routes = self.routes.len(),
            actions = self.controllers.len(),
            broker = self.broker.is_some(),
            static_root = ?self.static_files.as_ref().map(|s| s.root().display().to_string()),
            "Dispatcher ready"
        );
        Dispatcher {
            routes: self.routes,
            controllers: self.controllers,
            broker: self.broker,
            static_files: self.static_files,
            redirect_mode: self.redirect_mode,
            trust_proxy_headers: self.trust_proxy_headers,
        }
    }
}

impl Dispatcher {
    pub fn builder(routes: RouteTable) -> DispatcherBuilder {
        DispatcherBuilder {
            routes,
            controllers: ControllerRegistry::default(),
            broker: None,
            static_files: None,
            redirect_mode: RedirectMode::default(),
            trust_proxy_headers: true,
        }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn controllers(&self) -> &ControllerRegistry {
        &self.controllers
    }

    pub fn static_files(&self) -> Option<&StaticFiles> {
        self.static_files.as_ref()
    }

    /// Handle one request end to end and write the response to `wire`.
    ///
    /// Never fails: handler errors and panics become 500 responses, and once
    /// the wire's abort signal fires nothing more is written.
    pub async fn handle(&self, mut request: IncomingRequest, wire: &mut Wire<'_>) -> Completion {
        let options = FlushOptions::for_request(&request);
        let Some(route_match) = self.routes.match_route(&request.method, request.path()) else {
            return self.handle_miss(&request, wire, options).await;
        };

        let route = Arc::clone(&route_match.route);
        let context = Arc::new(RequestContext::new(
            &request,
            &route_match,
            self.trust_proxy_headers,
        ));
        let cookie_header = request.header("cookie").map(str::to_string);
        let jar = cookie_header
            .as_deref()
            .map(CookieJar::parse)
            .unwrap_or_default();
        let body = std::mem::take(&mut request.body);
        let abort = wire.abort_signal().clone();
        let started = Instant::now();

        debug!(
            request_id = %context.request_id,
            method = %context.method,
            path = %context.url,
            route = %route,
            params = ?context.params,
            "Dispatching request"
        );

        let mut response = ResponseComposer::new(jar);
        let pipeline = self.run_pipeline(&route, &context, &mut response, body, &abort, cookie_header);
        let outcome = abort.guard(AssertUnwindSafe(pipeline).catch_unwind()).await;

        let (response, options) = match outcome {
            None => {
                debug!(request_id = %context.request_id, "Client aborted during handling");
                return Completion::Aborted;
            }
            Some(Ok(Ok(()))) => (response, options.with_cache_ttl(route.cache_ttl())),
            Some(Ok(Err(err))) => {
                error!(
                    request_id = %context.request_id,
                    route = %route,
                    error = %err,
                    "Handler failed"
                );
                (ResponseComposer::text(500, err.to_string()), options)
            }
            Some(Err(panic)) => {
                let err = DispatchError::HandlerPanicked {
                    message: panic_message(panic.as_ref()),
                };
                error!(
                    request_id = %context.request_id,
                    route = %route,
                    error = %err,
                    "Handler panicked"
                );
                (ResponseComposer::text(500, err.to_string()), options)
            }
        };

        if abort.is_aborted() {
            debug!(request_id = %context.request_id, "Client aborted before flush");
            return Completion::Aborted;
        }
        let status = response.status();
        let completion = flush(wire, response, &options).await;
        debug!(
            request_id = %context.request_id,
            status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            completion = ?completion,
            "Request complete"
        );
        completion
    }

    async fn handle_miss(
        &self,
        request: &IncomingRequest,
        wire: &mut Wire<'_>,
        options: FlushOptions,
    ) -> Completion {
        if request.method == Method::GET {
            if let Some(static_files) = &self.static_files {
                let outcome = static_files.serve(request, wire).await;
                return Completion::after_stream(outcome, options.keep_alive);
            }
        }
        debug!(method = %request.method, path = %request.path(), "No route matched");
        let response =
            ResponseComposer::text(404, format!("Cannot {} {}", request.method, request.path()));
        flush(wire, response, &options).await
    }

    /// Before hook, handler, after hook. The handler's body ends up on `response`.
    async fn run_pipeline(
        &self,
        route: &Arc<Route>,
        request: &Arc<RequestContext>,
        response: &mut ResponseComposer,
        body: Vec<u8>,
        abort: &AbortSignal,
        cookie_header: Option<String>,
    ) -> anyhow::Result<()> {
        if let Some(hook) = route.before_hook() {
            if hook.before(route, request, response).await? == HookFlow::Respond {
                debug!(request_id = %request.request_id, "Before hook responded");
                return Ok(());
            }
        }

        let data = match route.handler() {
            HandlerKind::Controller { controller, action } => {
                let handler = self.controllers.lookup(controller, action)?;
                let mut ctx = ControllerContext::new(
                    Arc::clone(route),
                    Arc::clone(request),
                    std::mem::take(response),
                    body,
                    abort.clone(),
                    self.redirect_mode,
                );
                let data = handler.invoke(&mut ctx).await;
                *response = ctx.into_response();
                data?
            }
            HandlerKind::RemoteAction { action } => {
                let broker = self
                    .broker
                    .as_ref()
                    .ok_or_else(|| DispatchError::BrokerMissing {
                        action: action.clone(),
                    })?;
                let call = RemoteCall {
                    route: route.info(),
                    request: Arc::clone(request),
                    cookies: cookie_header,
                    post_data: (!body.is_empty())
                        .then(|| String::from_utf8_lossy(&body).into_owned()),
                };
                broker.call(action, call).await?.apply(response)
            }
        };

        let data = match route.after_hook() {
            Some(hook) => hook.after(route, request, response, data).await?,
            None => data,
        };
        response.set_body(data);
        Ok(())
    }
}

async fn flush(wire: &mut Wire<'_>, response: ResponseComposer, options: &FlushOptions) -> Completion {
    match wire.write_all(response.into_wire_bytes(options)).await {
        Ok(()) => Completion::after_write(options.keep_alive),
        Err(WireError::Aborted) => Completion::Aborted,
        Err(WireError::Io(e)) => {
            debug!(error = %e, "Flush failed");
            Completion::Close
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
