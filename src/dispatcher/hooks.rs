use futures::future::BoxFuture;

use crate::router::Route;
use crate::server::{Body, RequestContext, ResponseComposer};

/// What the pipeline does after a before hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookFlow {
    /// Invoke the handler.
    Continue,
    /// Skip the handler and after hook; flush the response as the hook left it.
    Respond,
}

/// Runs before the handler. May prepare or short-circuit the response.
pub trait BeforeHook: Send + Sync {
    fn before<'a>(
        &'a self,
        route: &'a Route,
        request: &'a RequestContext,
        response: &'a mut ResponseComposer,
    ) -> BoxFuture<'a, anyhow::Result<HookFlow>>;
}

/// Runs after the handler with its output; returns the body to send.
pub trait AfterHook: Send + Sync {
    fn after<'a>(
        &'a self,
        route: &'a Route,
        request: &'a RequestContext,
        response: &'a mut ResponseComposer,
        data: Body,
    ) -> BoxFuture<'a, anyhow::Result<Body>>;
}

impl<F> BeforeHook for F
where
    F: Fn(&Route, &RequestContext, &mut ResponseComposer) -> anyhow::Result<HookFlow> + Send + Sync,
{
    fn before<'a>(
        &'a self,
        route: &'a Route,
        request: &'a RequestContext,
        response: &'a mut ResponseComposer,
    ) -> BoxFuture<'a, anyhow::Result<HookFlow>> {
        Box::pin(futures::future::ready(self(route, request, response)))
    }
}

impl<F> AfterHook for F
where
    F: Fn(&Route, &RequestContext, &mut ResponseComposer, Body) -> anyhow::Result<Body> + Send + Sync,
{
    fn after<'a>(
        &'a self,
        route: &'a Route,
        request: &'a RequestContext,
        response: &'a mut ResponseComposer,
        data: Body,
    ) -> BoxFuture<'a, anyhow::Result<Body>> {
        Box::pin(futures::future::ready(self(route, request, response, data)))
    }
}
