//! # Server Module
//!
//! HTTP plumbing below the dispatcher:
//!
//! - [`cookies`]: request cookie parsing and outbound `Set-Cookie` records
//! - [`request`]: the incoming request and the per-request [`RequestContext`]
//! - [`response`]: the [`ResponseComposer`] and its wire serialization
//! - [`transport`]: the flow-controlled [`Wire`] and the [`AbortSignal`]
//! - [`http_server`]: the tokio socket binding

pub mod cookies;
pub mod http_server;
pub mod request;
pub mod response;
pub mod service;
pub mod transport;

pub use cookies::{CookieJar, CookieOptions, CookieRecord, Expires, Priority, SameSite};
pub use http_server::{HttpServer, ServerHandle};
pub use request::{normalize_ip, resolve_client_ip, IncomingRequest, RequestContext};
pub use response::{
    meta_redirect_body, script_redirect_body, status_reason, Body, FlushOptions, HeaderVec,
    RedirectMode, ResponseComposer, DEFAULT_CONTENT_TYPE,
};
pub use service::{AppService, ServiceLimits, DEFAULT_MAX_BODY_BYTES, DEFAULT_MAX_HEAD_BYTES};
pub use transport::{AbortSignal, FlowState, Sink, Wire, WireError};
