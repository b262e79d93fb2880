//! # Router Module
//!
//! Path matching and route resolution.
//!
//! ## Overview
//!
//! The router is responsible for:
//! - Compiling route templates (`/user/:id(\d+)`, `/files/*`) into anchored regexes
//! - Parsing route lines (`get /hello/:name #c:home.hello`) into route definitions
//! - Matching incoming requests, method group first, then the `any` group
//! - Extracting and percent-decoding path parameters
//!
//! ## Architecture
//!
//! The router uses a two-phase approach:
//!
//! 1. **Compilation**: at startup every template becomes a [`CompiledPattern`]. In
//!    [`CompileMode::Strict`] a malformed template is an error; in
//!    [`CompileMode::Lenient`] it is logged and matched as literal text.
//!
//! 2. **Matching**: for each request, the routes registered for the request
//!    method are tested in declaration order, then the `any` routes. The first
//!    match wins.
//!
//! ## Example
//!
//! ```rust
//! use corkrouter::router::{CompileMode, RouteOptions, RouteTable};
//! use http::Method;
//!
//! let mut builder = RouteTable::builder(CompileMode::Strict);
//! builder
//!     .add_line("get /user/:id(\\d+) #c:users.show", RouteOptions::default())
//!     .unwrap();
//! let table = builder.build();
//!
//! let hit = table.match_route(&Method::GET, "/user/42").unwrap();
//! assert_eq!(hit.get_path_param("id"), Some("42"));
//! assert!(table.match_route(&Method::GET, "/user/bob").is_none());
//! ```

mod core;
mod dsl;
mod error;
mod pattern;

pub use core::{
    HandlerKind, ParamVec, Route, RouteInfo, RouteMatch, RouteMethod, RouteTable,
    RouteTableBuilder, MAX_INLINE_PARAMS,
};
pub use dsl::{parse_route_line, RouteDef, RouteOptions};
pub use error::RouteCompileError;
pub use pattern::{compile_pattern, CompileMode, CompiledPattern};
