//! # Dispatcher Module
//!
//! Takes a parsed request from the socket binding and sees it through to the wire.
//!
//! ## Request Flow
//!
//! 1. The [`RouteTable`](crate::router::RouteTable) matches method and path.
//!    A GET that matches nothing goes to the static file server; any other
//!    miss gets `404 Cannot <METHOD> <path>`.
//! 2. The route's [`BeforeHook`] runs and may answer on its own ([`HookFlow::Respond`]).
//! 3. The handler runs: a controller action from the [`ControllerRegistry`] for
//!    `#c:` routes, or [`ServiceBroker::call`] for `#s:` routes.
//! 4. The route's [`AfterHook`] may rewrite the handler's body.
//! 5. The composed response is serialized and written in one piece.
//!
//! Steps 2 to 4 run as one future raced against the connection's
//! [`AbortSignal`](crate::server::AbortSignal). If the client disconnects the
//! future is dropped and nothing is flushed. Errors and panics anywhere in the
//! pipeline become `500` responses carrying the error text.
//!
//! ## Example
//!
//! ```rust,no_run
//! use corkrouter::dispatcher::{ControllerContext, ControllerRegistry, Dispatcher};
//! use corkrouter::router::{CompileMode, RouteTable};
//! use corkrouter::server::{AppService, Body, HttpServer};
//! use futures::future::BoxFuture;
//!
//! fn about(ctx: &mut ControllerContext) -> BoxFuture<'_, anyhow::Result<Body>> {
//!     Box::pin(async move { Ok(ctx.render_raw("page about", None, None)) })
//! }
//!
//! # async fn run() -> anyhow::Result<()> {
//! let mut builder = RouteTable::builder(CompileMode::Strict);
//! builder.add_lines("get /about #c:home.about")?;
//! let mut controllers = ControllerRegistry::new();
//! controllers.register("home", "about", about);
//!
//! let dispatcher = Dispatcher::builder(builder.build())
//!     .controllers(controllers)
//!     .build();
//! let handle = HttpServer(AppService::new(dispatcher)).start("127.0.0.1:3000").await?;
//! handle.join().await?;
//! # Ok(())
//! # }
//! ```

mod controller;
mod core;
mod hooks;
mod remote;

pub use controller::{Action, ControllerContext, ControllerRegistry};
pub use core::{Completion, DispatchError, Dispatcher, DispatcherBuilder};
pub use hooks::{AfterHook, BeforeHook, HookFlow};
pub use remote::{RemoteCall, RemoteReply, RenderEnvelope, RestRoute, ServiceBroker};
