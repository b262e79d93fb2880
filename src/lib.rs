//! # corkrouter
//!
//! **corkrouter** is an embedded HTTP router and response composer for tokio.
//! Routes are declared as one-line strings, handlers never touch the socket,
//! and unmatched GET requests fall through to a static file server that
//! respects the client's pace.
//!
//! ## Architecture
//!
//! - **[`router`]** - Route DSL, path pattern compiler and the route table
//! - **[`dispatcher`]** - Hooks, controller actions, remote actions and the request pipeline
//! - **[`server`]** - Request/response types, cookies, the flow-controlled wire and the socket binding
//! - **[`static_files`]** - Conditional, ranged and compressed file streaming with backpressure
//! - **[`runtime_config`]** - YAML and environment configuration
//! - **[`logging`]** - `tracing` subscriber setup
//! - **[`cli`]** - The `corkrouter` command line
//!
//! ### Request Handling Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client
//!     participant Server as HttpServer
//!     participant Dispatcher
//!     participant Table as RouteTable
//!     participant Handler as Controller / Broker
//!     participant Static as StaticFiles
//!
//!     Client->>Server: GET /hello2/a/b
//!     Server->>Dispatcher: IncomingRequest + Wire
//!     Dispatcher->>Table: match_route(GET, /hello2/a/b)
//!     alt Route matched
//!         Dispatcher->>Handler: before hook, action, after hook
//!         Handler-->>Dispatcher: Body (status, headers, cookies on the composer)
//!         Dispatcher->>Server: one write of head + body
//!     else GET miss
//!         Dispatcher->>Static: serve(request, wire)
//!         Static->>Server: head, then chunks as the socket drains
//!     else other miss
//!         Dispatcher->>Server: 404 Cannot METHOD path
//!     end
//!     Server-->>Client: HTTP/1.1 response
//! ```
//!
//! If the client disconnects at any point the request's abort signal fires:
//! pending handler futures are dropped, file streams release their handles
//! and nothing further is written.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use corkrouter::demo::{register_home, DEMO_ROUTES};
//! use corkrouter::dispatcher::{ControllerRegistry, Dispatcher};
//! use corkrouter::router::{CompileMode, RouteTable};
//! use corkrouter::server::{AppService, HttpServer};
//! use corkrouter::static_files::StaticFiles;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut routes = RouteTable::builder(CompileMode::Strict);
//!     routes.add_lines(DEMO_ROUTES)?;
//!
//!     let mut controllers = ControllerRegistry::new();
//!     register_home(&mut controllers);
//!
//!     let dispatcher = Dispatcher::builder(routes.build())
//!         .controllers(controllers)
//!         .static_files(StaticFiles::new("./public"))
//!         .build();
//!
//!     let handle = HttpServer(AppService::new(dispatcher))
//!         .start("127.0.0.1:3000")
//!         .await?;
//!     handle.join().await?;
//!     Ok(())
//! }
//! ```
//!
//! ### Route lines
//!
//! ```text
//! get /about #c:home.about               controller action home.about
//! get /hello2/:x/:y #c:home.hello2       named captures x and y
//! get /files/:name.:ext #c:files.show    literal dot between captures
//! get /lang/:code(en|de)? #c:home.lang   optional, constrained capture
//! any /proxy/* #s:gateway.forward        remote action, any method
//! ```

pub mod cli;
pub mod demo;
pub mod dispatcher;
pub mod ids;
pub mod logging;
pub mod mime;
pub mod router;
pub mod runtime_config;
pub mod server;
pub mod static_files;

pub use dispatcher::{Completion, ControllerContext, ControllerRegistry, Dispatcher, ServiceBroker};
pub use router::{CompileMode, RouteTable, RouteTableBuilder};
pub use server::{AppService, HttpServer, ResponseComposer, ServerHandle};
