//! Gzip policy and encoder.

use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::{self, Write};

/// Types that always benefit from gzip.
const ALWAYS: &[&str] = &[
    "text/plain",
    "text/css",
    "text/html",
    "text/javascript",
    "application/javascript",
    "application/x-javascript",
    "application/json",
    "application/xml",
    "image/svg+xml",
    "application/xhtml+xml",
    "application/wasm",
];

/// Types that are already compressed.
const NEVER: &[&str] = &[
    "video/mp4",
    "audio/mpeg",
    "audio/ogg",
    "video/webm",
    "image/png",
    "image/jpeg",
    "image/gif",
    "font/woff2",
    "application/zip",
    "application/x-gzip",
];

/// Whether a payload of type `mime` should be stored gzipped.
///
/// Parameters (`; charset=utf-8`) and case are ignored. Types on neither
/// list are compressed when they are textual: `text/*`, `*+xml`, `*+json`.
pub fn should_compress(mime: &str) -> bool {
    let essence = mime
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if NEVER.contains(&essence.as_str()) {
        return false;
    }
    if ALWAYS.contains(&essence.as_str()) {
        return true;
    }
    essence.starts_with("text/") || essence.ends_with("+xml") || essence.ends_with("+json")
}

/// Gzip `data` at the default compression level.
pub fn gzip(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}
