//! # CLI Module
//!
//! The `corkrouter` binary.
//!
//! ## Commands
//!
//! ### `serve`
//!
//! ```bash
//! corkrouter serve --addr 0.0.0.0:8080 --public-dir ./public --index index.html
//! corkrouter serve --config config.yaml --routes routes.txt --strict
//! ```
//!
//! Flags override the config file, which is itself overridden by `CORK_*`
//! environment variables (see [`crate::runtime_config`]). Without `--routes`
//! the demo controller routes are served.
//!
//! ### `routes`
//!
//! ```bash
//! corkrouter routes --routes routes.txt --strict
//! ```
//!
//! Compiles the file and prints the table in match order. In strict mode a
//! malformed line or template exits non-zero.

mod commands;


pub use commands::{run_cli, serve, Cli, Commands};
