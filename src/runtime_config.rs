//! # Runtime Configuration Module
//!
//! Server settings come from three layers, later ones winning:
//!
//! 1. built-in defaults ([`ServerConfig::default`])
//! 2. an optional YAML file ([`ServerConfig::load`])
//! 3. environment variables ([`ServerConfig::apply_env`])
//!
//! The CLI applies its own flags on top of that.
//!
//! ## Environment Variables
//!
//! | Variable             | Field                |
//! |----------------------|----------------------|
//! | `CORK_ADDR`          | `addr`               |
//! | `CORK_PUBLIC_DIR`    | `public_dir`         |
//! | `CORK_PUBLIC_INDEX`  | `public_index`       |
//! | `CORK_STREAM_CHUNK`  | `stream_chunk_size`  |
//! | `CORK_STRICT_ROUTES` | `strict_routes`      |
//!
//! `CORK_STREAM_CHUNK` accepts decimal (`65536`) or hexadecimal (`0x10000`).
//!
//! ## Example
//!
//! ```yaml
//! addr: 0.0.0.0:8080
//! public_dir: ./public
//! public_index: index.html
//! compression_priority: [br, gzip]
//! redirect_mode: header
//! ```

use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::router::CompileMode;
use crate::server::{RedirectMode, ServiceLimits, DEFAULT_MAX_BODY_BYTES, DEFAULT_MAX_HEAD_BYTES};
use crate::static_files::{Codec, StaticFiles, DEFAULT_CHUNK_SIZE, DEFAULT_PRIORITY};

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: serde_yaml::Error },
    /// An environment variable held a value the field cannot take.
    InvalidEnv { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "cannot read config {}: {source}", path.display())
            }
            ConfigError::Parse { path, source } => {
                write!(f, "invalid config {}: {source}", path.display())
            }
            ConfigError::InvalidEnv { key, value } => write!(f, "invalid value for {key}: {value:?}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::InvalidEnv { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    /// Directory served for unmatched GET requests; none disables static files.
    pub public_dir: Option<PathBuf>,
    pub public_index: Option<String>,
    pub static_compress: bool,
    pub static_last_modified: bool,
    pub compression_priority: Vec<Codec>,
    pub stream_chunk_size: usize,
    /// File of route lines, one `<method> <path> #<c|s>:<name>.<action>` per line.
    pub routes_file: Option<PathBuf>,
    pub strict_routes: bool,
    pub trust_proxy_headers: bool,
    pub max_body_bytes: usize,
    pub redirect_mode: RedirectMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:3000".to_string(),
            public_dir: None,
            public_index: None,
            static_compress: true,
            static_last_modified: true,
            compression_priority: DEFAULT_PRIORITY.to_vec(),
            stream_chunk_size: DEFAULT_CHUNK_SIZE,
            routes_file: None,
            strict_routes: false,
            trust_proxy_headers: true,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            redirect_mode: RedirectMode::Meta,
        }
    }
}

impl ServerConfig {
    /// Read a YAML config file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Override fields from `CORK_*` environment variables.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_vars(|key| env::var(key).ok())
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(addr) = var("CORK_ADDR") {
            self.addr = addr;
        }
        if let Some(dir) = var("CORK_PUBLIC_DIR") {
            self.public_dir = Some(PathBuf::from(dir));
        }
        if let Some(index) = var("CORK_PUBLIC_INDEX") {
            self.public_index = Some(index);
        }
        if let Some(value) = var("CORK_STREAM_CHUNK") {
            self.stream_chunk_size = parse_size(&value)
                .filter(|n| *n > 0)
                .ok_or(ConfigError::InvalidEnv {
                    key: "CORK_STREAM_CHUNK",
                    value,
                })?;
        }
        if let Some(value) = var("CORK_STRICT_ROUTES") {
            self.strict_routes = parse_bool(&value).ok_or(ConfigError::InvalidEnv {
                key: "CORK_STRICT_ROUTES",
                value,
            })?;
        }
        Ok(())
    }

    pub fn compile_mode(&self) -> CompileMode {
        CompileMode::from_strict(self.strict_routes)
    }

    pub fn limits(&self) -> ServiceLimits {
        ServiceLimits {
            max_body_bytes: self.max_body_bytes,
            max_head_bytes: DEFAULT_MAX_HEAD_BYTES,
        }
    }

    /// The static file server, when a public directory is configured.
    pub fn static_files(&self) -> Option<StaticFiles> {
        let root = self.public_dir.as_ref()?;
        Some(
            StaticFiles::new(root)
                .index(self.public_index.clone())
                .compress(self.static_compress)
                .last_modified(self.static_last_modified)
                .priority(self.compression_priority.clone())
                .chunk_size(self.stream_chunk_size),
        )
    }
}

/// Decimal or `0x`-prefixed hexadecimal byte count.
pub fn parse_size(value: &str) -> Option<usize> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
