//! Dispatcher pipeline tests
//!
//! Requests are driven through [`Dispatcher::handle`] into an in-memory sink
//! and the serialized response is parsed back.
//!
//! # Test Coverage
//!
//! - Controller actions: params, status, redirects, cookies
//! - Before/after hooks: short-circuit and body rewrite
//! - Failures: action errors, panics, unknown controllers and actions
//! - Remote actions: plain text, envelopes, missing broker
//! - Route cache TTL, 404 for unmatched requests, HEAD
//! - Client aborts during hooks, actions and remote calls

mod common;

use common::dispatch::{run, run_aborting};
use corkrouter::demo::{register_home, LocalBroker, DEMO_ROUTES};
use corkrouter::dispatcher::{
    BeforeHook, Completion, ControllerContext, ControllerRegistry, Dispatcher, HookFlow,
    RemoteCall, RemoteReply, RenderEnvelope, ServiceBroker,
};
use corkrouter::router::{CompileMode, Route, RouteOptions, RouteTable, RouteTableBuilder};
use corkrouter::server::{
    Body, CookieOptions, IncomingRequest, RedirectMode, RequestContext, ResponseComposer,
};
use futures::future::BoxFuture;
use http::Method;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn demo_dispatcher() -> Dispatcher {
    let broker = Arc::new(LocalBroker::demo());
    let mut builder = RouteTable::builder(CompileMode::Strict);
    builder.bind_broker_routes(broker.as_ref()).unwrap();
    builder.add_lines(DEMO_ROUTES).unwrap();
    let mut controllers = ControllerRegistry::new();
    register_home(&mut controllers);
    Dispatcher::builder(builder.build())
        .controllers(controllers)
        .broker(broker)
        .build()
}

fn with_routes(setup: impl FnOnce(&mut RouteTableBuilder), controllers: ControllerRegistry) -> Dispatcher {
    let mut builder = RouteTable::builder(CompileMode::Strict);
    setup(&mut builder);
    Dispatcher::builder(builder.build())
        .controllers(controllers)
        .build()
}

fn with_lines(lines: &str) -> Dispatcher {
    with_routes(
        |b| {
            b.add_lines(lines).unwrap();
        },
        home_controllers(),
    )
}

fn get(target: &str) -> IncomingRequest {
    IncomingRequest::new(Method::GET, target)
}

fn greet(_ctx: &mut ControllerContext) -> BoxFuture<'_, anyhow::Result<Body>> {
    Box::pin(async move { Ok(Body::from("hello")) })
}

fn fails(_ctx: &mut ControllerContext) -> BoxFuture<'_, anyhow::Result<Body>> {
    Box::pin(async move { Err(anyhow::anyhow!("database unavailable")) })
}

#[allow(clippy::panic)]
fn explodes(ctx: &mut ControllerContext) -> BoxFuture<'_, anyhow::Result<Body>> {
    Box::pin(async move {
        if ctx.param("never").is_none() {
            panic!("boom");
        }
        Ok(Body::Empty)
    })
}

fn login(ctx: &mut ControllerContext) -> BoxFuture<'_, anyhow::Result<Body>> {
    Box::pin(async move {
        let previous = ctx.cookies().get_or("sid", "none").to_string();
        ctx.cookies_mut()
            .set("sid", "fresh", CookieOptions::new().http_only(true));
        ctx.cookies_mut().remove("legacy", CookieOptions::new());
        Ok(Body::from(format!("previous={previous} now={}", ctx.cookies().get_or("sid", ""))))
    })
}

fn echo_body(ctx: &mut ControllerContext) -> BoxFuture<'_, anyhow::Result<Body>> {
    Box::pin(async move {
        let value: Value = ctx.read_json()?;
        ctx.set_cors_headers();
        ctx.as_json(&value, 202)
    })
}

fn home_controllers() -> ControllerRegistry {
    let mut controllers = ControllerRegistry::new();
    controllers
        .register("home", "greet", greet)
        .register("home", "fails", fails)
        .register("home", "explodes", explodes)
        .register("home", "login", login)
        .register("home", "echo", echo_body);
    controllers
}

#[tokio::test]
async fn test_params_reach_the_action() {
    let dispatcher = demo_dispatcher();
    let (resp, completion) = run(&dispatcher, get("/hello2/a/b?lang=en")).await;
    assert_eq!(completion, Completion::KeepAlive);
    assert_eq!(resp.status, 200);
    assert!(resp.header("content-type").unwrap().starts_with("application/json"));
    let json: Value = serde_json::from_slice(&resp.body).unwrap();
    assert_eq!(json["params"]["x"], "a");
    assert_eq!(json["params"]["y"], "b");
    assert_eq!(json["query"]["lang"], "en");
    assert!(json["request_id"].as_str().is_some_and(|id| !id.is_empty()));
}

#[tokio::test]
async fn test_render_raw_status() {
    let dispatcher = demo_dispatcher();
    let (resp, _) = run(&dispatcher, get("/")).await;
    assert_eq!(resp.status, 201);
    assert_eq!(resp.header("content-type"), Some("text/html; charset=utf-8"));
    assert!(resp.text().contains("<h1>Heading</h1>"));

    let (resp, _) = run(&dispatcher, get("/about")).await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.text(), "page about");
}

#[tokio::test]
async fn test_meta_redirect() {
    let dispatcher = demo_dispatcher();
    let (resp, _) = run(&dispatcher, get("/test/redirect")).await;
    assert_eq!(resp.status, 301);
    assert_eq!(resp.header("location"), Some("/about"));
    assert_eq!(
        resp.text(),
        "<!DOCTYPE html><html><head><meta http-equiv=\"refresh\" content=\"0; url=/about\"></head></html>"
    );
}

#[tokio::test]
async fn test_script_redirect_mode_omits_location() {
    let mut builder = RouteTable::builder(CompileMode::Strict);
    builder.add_lines(DEMO_ROUTES).unwrap();
    let mut controllers = ControllerRegistry::new();
    register_home(&mut controllers);
    let dispatcher = Dispatcher::builder(builder.build())
        .controllers(controllers)
        .redirect_mode(RedirectMode::Script)
        .build();
    let (resp, _) = run(&dispatcher, get("/test/redirect")).await;
    assert_eq!(resp.status, 301);
    assert!(resp.header("location").is_none());
    assert!(resp.text().contains("window.location.href='/about'"));
}

#[tokio::test]
async fn test_before_hook_short_circuits() {
    let dispatcher = with_routes(
        |b| {
            b.add_line(
                "get /private #c:home.greet",
                RouteOptions::default().on_before_fn(|_route, _request, response| {
                    response.set_status(401);
                    response.set_body("denied");
                    Ok(HookFlow::Respond)
                }),
            )
            .unwrap();
            b.add_line(
                "get /open #c:home.greet",
                RouteOptions::default().on_before_fn(|_route, _request, response| {
                    response.set_header("X-Checked", "yes");
                    Ok(HookFlow::Continue)
                }),
            )
            .unwrap();
        },
        home_controllers(),
    );

    let (resp, _) = run(&dispatcher, get("/private")).await;
    assert_eq!(resp.status, 401);
    assert_eq!(resp.text(), "denied");

    let (resp, _) = run(&dispatcher, get("/open")).await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.header("x-checked"), Some("yes"));
    assert_eq!(resp.text(), "hello");
}

#[tokio::test]
async fn test_after_hook_rewrites_body() {
    let dispatcher = with_routes(
        |b| {
            b.add_line(
                "get /shout #c:home.greet",
                RouteOptions::default().on_after_fn(|route, _request, response, body| {
                    response.set_header("X-Route", route.path());
                    Ok(Body::from(body.to_text().to_uppercase()))
                }),
            )
            .unwrap();
        },
        home_controllers(),
    );
    let (resp, _) = run(&dispatcher, get("/shout")).await;
    assert_eq!(resp.text(), "HELLO");
    assert_eq!(resp.header("x-route"), Some("/shout"));
}

#[tokio::test]
async fn test_action_error_becomes_500() {
    let dispatcher = with_lines("get /fails #c:home.fails");
    let (resp, completion) = run(&dispatcher, get("/fails")).await;
    assert_eq!(resp.status, 500);
    assert_eq!(resp.text(), "database unavailable");
    assert_eq!(completion, Completion::KeepAlive);
}

#[tokio::test]
async fn test_panic_becomes_500() {
    let dispatcher = with_lines("get /boom #c:home.explodes");
    let (resp, _) = run(&dispatcher, get("/boom")).await;
    assert_eq!(resp.status, 500);
    assert_eq!(resp.text(), "Handler panicked: boom");

    // the dispatcher keeps serving afterwards
    let (resp, _) = run(&dispatcher, get("/boom")).await;
    assert_eq!(resp.status, 500);
}

#[tokio::test]
async fn test_unknown_controller_and_action() {
    let dispatcher = with_routes(
        |b| {
            b.add_lines("get /a #c:ghost.index\nget /b #c:home.missing").unwrap();
        },
        home_controllers(),
    );
    let (resp, _) = run(&dispatcher, get("/a")).await;
    assert_eq!(resp.status, 500);
    assert_eq!(resp.text(), "controller ghost not found");

    let (resp, _) = run(&dispatcher, get("/b")).await;
    assert_eq!(resp.status, 500);
    assert_eq!(resp.text(), "method missing for controller home not found");
}

#[tokio::test]
async fn test_cookies_set_by_action() {
    let dispatcher = with_lines("get /login #c:home.login");
    let request = get("/login").with_header("Cookie", "sid=old; legacy=1");
    let (resp, _) = run(&dispatcher, request).await;
    assert_eq!(resp.text(), "previous=old now=fresh");
    let cookies = resp.headers_named("set-cookie");
    assert_eq!(cookies.len(), 2);
    assert_eq!(cookies[0], "sid=fresh; Path=/; HttpOnly");
    assert!(cookies[1].starts_with("legacy=; Path=/; Expires="));
}

#[tokio::test]
async fn test_json_body_and_cors() {
    let dispatcher = with_lines("post /echo #c:home.echo");
    let request = IncomingRequest::new(Method::POST, "/echo")
        .with_header("Content-Type", "application/json")
        .with_body(br#"{"n":1}"#.to_vec());
    let (resp, _) = run(&dispatcher, request).await;
    assert_eq!(resp.status, 202);
    assert_eq!(resp.text(), r#"{"n":1}"#);
    assert_eq!(resp.header("access-control-allow-origin"), Some("*"));
    assert_eq!(resp.header("access-control-max-age"), Some("3600"));

    let bad = IncomingRequest::new(Method::POST, "/echo").with_body(b"not json".to_vec());
    let (resp, _) = run(&dispatcher, bad).await;
    assert_eq!(resp.status, 500);
}

#[tokio::test]
async fn test_remote_text_reply() {
    let dispatcher = demo_dispatcher();
    let (resp, _) = run(&dispatcher, get("/hello")).await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.text(), "Hello API Gateway!");

    let (resp, _) = run(&dispatcher, get("/rest/a/b")).await;
    assert_eq!(resp.text(), "Hello a and b");
}

#[tokio::test]
async fn test_remote_envelope_and_call_arguments() {
    let broker = LocalBroker::new().action("orders.create", None, |call| {
        let summary = format!(
            "{} {} cookies={} body={}",
            call.route.method,
            call.route.path,
            call.cookies.unwrap_or_default(),
            call.post_data.unwrap_or_default()
        );
        Ok(RenderEnvelope::render_raw(summary, Some(201), Some("txt"))
            .with_header("X-Service", "orders")
            .into())
    });
    let mut builder = RouteTable::builder(CompileMode::Strict);
    builder.add_lines("post /orders #s:orders.create").unwrap();
    let dispatcher = Dispatcher::builder(builder.build())
        .broker(Arc::new(broker))
        .build();

    let request = IncomingRequest::new(Method::POST, "/orders")
        .with_header("Cookie", "sid=1")
        .with_body(b"qty=2".to_vec());
    let (resp, _) = run(&dispatcher, request).await;
    assert_eq!(resp.status, 201);
    assert_eq!(resp.header("content-type"), Some("text/plain; charset=utf-8"));
    assert_eq!(resp.header("x-service"), Some("orders"));
    assert_eq!(resp.text(), "post /orders cookies=sid=1 body=qty=2");
}

#[tokio::test]
async fn test_remote_route_without_broker() {
    let mut builder = RouteTable::builder(CompileMode::Strict);
    builder.add_lines("get /svc #s:users.list").unwrap();
    let dispatcher = Dispatcher::builder(builder.build()).build();
    let (resp, _) = run(&dispatcher, get("/svc")).await;
    assert_eq!(resp.status, 500);
    assert!(resp.text().contains("users.list"));
}

#[tokio::test]
async fn test_cache_ttl_header() {
    let dispatcher = with_routes(
        |b| {
            b.add_line("get /cached #c:home.greet", RouteOptions::default().cache(120))
                .unwrap();
            b.add_lines("get /fresh #c:home.greet").unwrap();
        },
        home_controllers(),
    );
    let (resp, _) = run(&dispatcher, get("/cached")).await;
    assert_eq!(resp.header("cache-control"), Some("public, max-age=120"));
    let (resp, _) = run(&dispatcher, get("/fresh")).await;
    assert!(resp.header("cache-control").is_none());
}

#[tokio::test]
async fn test_unmatched_is_404() {
    let dispatcher = demo_dispatcher();
    let (resp, _) = run(&dispatcher, IncomingRequest::new(Method::POST, "/x")).await;
    assert_eq!(resp.status, 404);
    assert_eq!(resp.text(), "Cannot POST /x");

    let (resp, _) = run(&dispatcher, get("/nothing/here?q=1")).await;
    assert_eq!(resp.text(), "Cannot GET /nothing/here");
}

#[tokio::test]
async fn test_head_has_length_but_no_body() {
    let dispatcher = with_lines("any /greet #c:home.greet");
    let (resp, _) = run(&dispatcher, IncomingRequest::new(Method::HEAD, "/greet")).await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.header("content-length"), Some("5"));
    assert!(resp.body.is_empty());
}

#[tokio::test]
async fn test_connection_close_is_reported() {
    let dispatcher = with_lines("get /greet #c:home.greet");
    let mut request = get("/greet");
    request.keep_alive = false;
    let (_, completion) = run(&dispatcher, request).await;
    assert_eq!(completion, Completion::Close);
}

const STALL: Duration = Duration::from_millis(200);
const HANGUP: Duration = Duration::from_millis(20);

fn stalls(_ctx: &mut ControllerContext) -> BoxFuture<'_, anyhow::Result<Body>> {
    Box::pin(async move {
        tokio::time::sleep(STALL).await;
        Ok(Body::from("too late"))
    })
}

/// Before hook that waits before letting the request through.
struct SlowGate {
    passed: Arc<AtomicBool>,
}

impl BeforeHook for SlowGate {
    fn before<'a>(
        &'a self,
        _route: &'a Route,
        _request: &'a RequestContext,
        response: &'a mut ResponseComposer,
    ) -> BoxFuture<'a, anyhow::Result<HookFlow>> {
        Box::pin(async move {
            tokio::time::sleep(STALL).await;
            self.passed.store(true, Ordering::SeqCst);
            response.set_header("X-Gate", "open");
            Ok(HookFlow::Continue)
        })
    }
}

struct SlowBroker;

impl ServiceBroker for SlowBroker {
    fn call<'a>(&'a self, _name: &'a str, _call: RemoteCall) -> BoxFuture<'a, anyhow::Result<RemoteReply>> {
        Box::pin(async move {
            tokio::time::sleep(STALL).await;
            Ok(RemoteReply::Text("too late".to_string()))
        })
    }
}

#[tokio::test]
async fn test_abort_during_action_writes_nothing() {
    let mut controllers = ControllerRegistry::new();
    controllers.register("home", "stalls", stalls);
    let dispatcher = with_routes(
        |b| {
            b.add_lines("get /slow #c:home.stalls").unwrap();
        },
        controllers,
    );

    let (bytes, completion) = run_aborting(&dispatcher, get("/slow"), HANGUP).await;
    assert_eq!(completion, Completion::Aborted);
    assert!(bytes.is_empty());
}

#[tokio::test]
async fn test_abort_during_before_hook_skips_handler_and_flush() {
    let passed = Arc::new(AtomicBool::new(false));
    let gate = SlowGate {
        passed: Arc::clone(&passed),
    };
    let dispatcher = with_routes(
        |b| {
            b.add_line(
                "get /gated #c:home.greet",
                RouteOptions::default().on_before(gate),
            )
            .unwrap();
        },
        home_controllers(),
    );

    let (bytes, completion) = run_aborting(&dispatcher, get("/gated"), HANGUP).await;
    assert_eq!(completion, Completion::Aborted);
    assert!(bytes.is_empty());
    assert!(!passed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_abort_during_remote_call_writes_nothing() {
    let mut builder = RouteTable::builder(CompileMode::Strict);
    builder.add_lines("get /remote #s:slow.wait").unwrap();
    let dispatcher = Dispatcher::builder(builder.build())
        .broker(Arc::new(SlowBroker))
        .build();

    let (bytes, completion) = run_aborting(&dispatcher, get("/remote"), HANGUP).await;
    assert_eq!(completion, Completion::Aborted);
    assert!(bytes.is_empty());
}

#[tokio::test]
async fn test_slow_action_without_abort_still_responds() {
    let mut controllers = ControllerRegistry::new();
    controllers.register("home", "stalls", stalls);
    let dispatcher = with_routes(
        |b| {
            b.add_lines("get /slow #c:home.stalls").unwrap();
        },
        controllers,
    );

    let (resp, completion) = run(&dispatcher, get("/slow")).await;
    assert_eq!(completion, Completion::KeepAlive);
    assert_eq!(resp.text(), "too late");
}
