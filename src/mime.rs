//! Extension to content-type lookup.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::Path;

pub const OCTET_STREAM: &str = "application/octet-stream";

static MIME_TYPES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("html", "text/html; charset=utf-8"),
        ("htm", "text/html; charset=utf-8"),
        ("css", "text/css; charset=utf-8"),
        ("js", "text/javascript; charset=utf-8"),
        ("mjs", "text/javascript; charset=utf-8"),
        ("json", "application/json; charset=utf-8"),
        ("map", "application/json; charset=utf-8"),
        ("xml", "application/xml; charset=utf-8"),
        ("txt", "text/plain; charset=utf-8"),
        ("text", "text/plain; charset=utf-8"),
        ("csv", "text/csv; charset=utf-8"),
        ("md", "text/markdown; charset=utf-8"),
        ("ico", "image/x-icon"),
        ("png", "image/png"),
        ("jpg", "image/jpeg"),
        ("jpeg", "image/jpeg"),
        ("gif", "image/gif"),
        ("webp", "image/webp"),
        ("avif", "image/avif"),
        ("svg", "image/svg+xml"),
        ("pdf", "application/pdf"),
        ("wasm", "application/wasm"),
        ("zip", "application/zip"),
        ("gz", "application/gzip"),
        ("mp3", "audio/mpeg"),
        ("mp4", "video/mp4"),
        ("webm", "video/webm"),
        ("woff", "font/woff"),
        ("woff2", "font/woff2"),
        ("ttf", "font/ttf"),
        ("otf", "font/otf"),
        ("eot", "application/vnd.ms-fontobject"),
    ]
    .into_iter()
    .collect()
});

/// Content type for a bare extension or format name (`"json"`, `"html"`).
pub fn for_extension(extension: &str) -> &'static str {
    MIME_TYPES
        .get(extension.trim_start_matches('.').to_ascii_lowercase().as_str())
        .copied()
        .unwrap_or(OCTET_STREAM)
}

/// Content type for a file path, by extension.
pub fn for_path(path: &Path) -> &'static str {
    path.extension()
        .and_then(|s| s.to_str())
        .map(for_extension)
        .unwrap_or(OCTET_STREAM)
}
