//! Demo application served by `corkrouter serve` when no routes file is given.
//!
//! A `home` controller plus an in-process [`LocalBroker`] that publishes
//! `rest1.hello` under `GET /hello`.

use futures::future::BoxFuture;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use crate::dispatcher::{
    ControllerContext, ControllerRegistry, RemoteCall, RemoteReply, RestRoute, ServiceBroker,
};
use crate::server::Body;

/// Route lines for the demo controller.
pub const DEMO_ROUTES: &str = "\
get / #c:home.index
get /about #c:home.about
get /test/redirect #c:home.test
get /hello2/:x/:y #c:home.hello2
";

const INDEX_VIEW: &str = r#"<!DOCTYPE html>
<html>
  <head><title>Home Page Title</title></head>
  <body>
    <h1>Heading</h1>
    <a href="/test/redirect">redirect to about page</a>
    <a href="/about">about page</a>
  </body>
</html>
"#;

fn index(ctx: &mut ControllerContext) -> BoxFuture<'_, anyhow::Result<Body>> {
    Box::pin(async move { Ok(ctx.render_raw(INDEX_VIEW, Some(201), None)) })
}

fn about(_ctx: &mut ControllerContext) -> BoxFuture<'_, anyhow::Result<Body>> {
    Box::pin(async move { Ok(Body::from("page about")) })
}

fn test(ctx: &mut ControllerContext) -> BoxFuture<'_, anyhow::Result<Body>> {
    Box::pin(async move { Ok(ctx.redirect("/about", None)) })
}

/// Echoes the route parameters and query as JSON.
fn hello2(ctx: &mut ControllerContext) -> BoxFuture<'_, anyhow::Result<Body>> {
    Box::pin(async move {
        let payload = json!({
            "params": ctx.request().params_map(),
            "query": ctx.request().query_map(),
            "request_id": ctx.request().request_id.to_string(),
        });
        ctx.as_json(&payload, 200)
    })
}

pub fn register_home(registry: &mut ControllerRegistry) {
    registry
        .register("home", "index", index)
        .register("home", "about", about)
        .register("home", "test", test)
        .register("home", "hello2", hello2);
}

type LocalAction = Arc<dyn Fn(RemoteCall) -> anyhow::Result<RemoteReply> + Send + Sync>;

/// A [`ServiceBroker`] whose actions are plain closures in this process.
#[derive(Default, Clone)]
pub struct LocalBroker {
    actions: HashMap<String, LocalAction>,
    rest: Vec<RestRoute>,
}

impl std::fmt::Debug for LocalBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.actions.keys().collect();
        names.sort();
        f.debug_struct("LocalBroker")
            .field("actions", &names)
            .field("rest", &self.rest)
            .finish()
    }
}

impl LocalBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name`, optionally published as a REST route such as `"GET /hello"`.
    pub fn action<F>(mut self, name: &str, rest: Option<&str>, handler: F) -> Self
    where
        F: Fn(RemoteCall) -> anyhow::Result<RemoteReply> + Send + Sync + 'static,
    {
        if let Some((method, path)) = rest.and_then(|r| r.trim().split_once(' ')) {
            self.rest.push(RestRoute::new(method, path.trim(), name));
        }
        self.actions.insert(name.to_string(), Arc::new(handler));
        self
    }

    /// The broker used by the demo server.
    pub fn demo() -> Self {
        Self::new()
            .action("rest1.hello", Some("GET /hello"), |_| {
                Ok(RemoteReply::from("Hello API Gateway!"))
            })
            .action("rest1.hello2", Some("GET /rest/:test1/:test2"), |call| {
                Ok(RemoteReply::from(format!(
                    "Hello {} and {}",
                    call.request.param("test1").unwrap_or_default(),
                    call.request.param("test2").unwrap_or_default()
                )))
            })
    }
}

impl ServiceBroker for LocalBroker {
    fn call<'a>(&'a self, name: &'a str, call: RemoteCall) -> BoxFuture<'a, anyhow::Result<RemoteReply>> {
        Box::pin(async move {
            let action = self
                .actions
                .get(name)
                .ok_or_else(|| anyhow::anyhow!("action {name} is not registered"))?;
            action(call)
        })
    }

    fn rest_routes(&self) -> Vec<RestRoute> {
        self.rest.clone()
    }
}
