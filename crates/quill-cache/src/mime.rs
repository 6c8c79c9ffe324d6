//! MIME detection: file extension first, content sniffing second.

use std::path::Path;

const OCTET_STREAM: &str = "application/octet-stream";

/// Magic prefixes for common binary formats.
const SIGNATURES: &[(&[u8], &str)] = &[
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xff\xd8\xff", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"%PDF-", "application/pdf"),
    (b"\x1f\x8b\x08", "application/x-gzip"),
    (b"PK\x03\x04", "application/zip"),
    (b"wOF2", "font/woff2"),
    (b"\x00asm", "application/wasm"),
];

/// Detect the MIME type of `data` stored under `key`.
///
/// The extension wins when it is known. Otherwise the leading bytes are
/// matched against a few binary signatures and HTML markers, and anything
/// else that is valid UTF-8 without control bytes is `text/plain`.
pub fn detect_mime(key: &str, data: &[u8]) -> String {
    if Path::new(key).extension().is_some()
        && let Some(by_ext) = mime_guess::from_path(key).first()
    {
        return by_ext.essence_str().to_owned();
    }
    sniff(data).to_owned()
}

fn sniff(data: &[u8]) -> &'static str {
    let head = &data[..data.len().min(512)];
    if let Some((_, mime)) = SIGNATURES.iter().find(|(magic, _)| head.starts_with(magic)) {
        return mime;
    }

    let trimmed = head.trim_ascii_start();
    let lower = trimmed
        .iter()
        .take(14)
        .map(u8::to_ascii_lowercase)
        .collect::<Vec<_>>();
    if lower.starts_with(b"<!doctype html") || lower.starts_with(b"<html") {
        return "text/html";
    }
    if lower.starts_with(b"<?xml") {
        return "text/xml";
    }

    let textual = head
        .iter()
        .all(|&b| b >= 0x20 || matches!(b, b'\t' | b'\n' | b'\r' | 0x0c | 0x1b));
    // A multi-byte sequence may be cut at the sniff boundary.
    let utf8 = match std::str::from_utf8(head) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    };
    if textual && utf8 { "text/plain" } else { OCTET_STREAM }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_wins() {
        assert_eq!(detect_mime("page.html", b"\x89PNG\r\n\x1a\n"), "text/html");
        assert_eq!(detect_mime("style.css", b""), "text/css");
        assert_eq!(detect_mime("logo.svg", b"<svg/>"), "image/svg+xml");
        assert_eq!(detect_mime("photo.PNG", b""), "image/png");
    }

    #[test]
    fn test_sniff_without_extension() {
        assert_eq!(detect_mime("LICENSE", b"MIT License\n"), "text/plain");
        assert_eq!(
            detect_mime("blob", b"\x89PNG\r\n\x1a\n\x00\x00"),
            "image/png"
        );
        assert_eq!(
            detect_mime("index", b"  <!DOCTYPE html><html></html>"),
            "text/html"
        );
        assert_eq!(detect_mime("data", &[0, 1, 2, 3]), OCTET_STREAM);
    }

    #[test]
    fn test_unknown_extension_sniffs() {
        assert_eq!(detect_mime("notes.zzqx", b"plain words"), "text/plain");
    }
}
