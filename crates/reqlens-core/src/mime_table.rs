//! Short-name to MIME type table
//!
//! `is()`, `accepts()` and the upload extension fallback all resolve names
//! like `html` or `.png` through this one table.

/// Extension / short name paired with its canonical media type.
///
/// When several extensions share a media type the first one listed is the
/// one [`extension_for`] returns.
static TABLE: &[(&str, &str)] = &[
    // Text
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("js", "text/javascript"),
    ("mjs", "text/javascript"),
    ("txt", "text/plain"),
    ("text", "text/plain"),
    ("md", "text/markdown"),
    ("csv", "text/csv"),
    ("xml", "application/xml"),
    ("json", "application/json"),
    ("jsonld", "application/ld+json"),
    ("yaml", "application/yaml"),
    ("yml", "application/yaml"),
    // Forms
    ("urlencoded", "application/x-www-form-urlencoded"),
    ("form", "application/x-www-form-urlencoded"),
    ("multipart", "multipart/*"),
    // Images
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
    ("ico", "image/x-icon"),
    ("bmp", "image/bmp"),
    ("avif", "image/avif"),
    // Fonts
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("ttf", "font/ttf"),
    ("otf", "font/otf"),
    // Audio/Video
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("ogg", "audio/ogg"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    // Documents and archives
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    ("tar", "application/x-tar"),
    ("gz", "application/gzip"),
    ("bin", "application/octet-stream"),
    ("wasm", "application/wasm"),
];

/// Resolve a short name or extension (`html`, `.PNG`) to its media type.
pub fn lookup(name: &str) -> Option<&'static str> {
    let name = name.trim_start_matches('.');
    TABLE
        .iter()
        .find(|(ext, _)| ext.eq_ignore_ascii_case(name))
        .map(|(_, mime)| *mime)
}

/// Preferred extension for a media type (`image/jpeg` -> `jpg`).
pub fn extension_for(media_type: &str) -> Option<&'static str> {
    TABLE
        .iter()
        .find(|(_, mime)| mime.eq_ignore_ascii_case(media_type))
        .map(|(ext, _)| *ext)
}
