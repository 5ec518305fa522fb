//! Extension → MIME type lookup. Read-only after first use.

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;

static MIME_TABLE: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("txt", "text/plain"),
        ("md", "text/markdown"),
        ("html", "text/html"),
        ("htm", "text/html"),
        ("css", "text/css"),
        ("csv", "text/csv"),
        ("xml", "application/xml"),
        ("js", "text/javascript"),
        ("mjs", "text/javascript"),
        ("ts", "text/typescript"),
        ("json", "application/json"),
        ("jsonl", "application/jsonl"),
        ("toml", "application/toml"),
        ("yaml", "application/yaml"),
        ("yml", "application/yaml"),
        ("rs", "text/x-rust"),
        ("py", "text/x-python"),
        ("go", "text/x-go"),
        ("c", "text/x-c"),
        ("h", "text/x-c"),
        ("cpp", "text/x-c++"),
        ("hpp", "text/x-c++"),
        ("java", "text/x-java"),
        ("sh", "application/x-sh"),
        ("rb", "text/x-ruby"),
        ("php", "text/x-php"),
        ("sql", "application/sql"),
        ("pdf", "application/pdf"),
        ("zip", "application/zip"),
        ("gz", "application/gzip"),
        ("tar", "application/x-tar"),
        ("png", "image/png"),
        ("jpg", "image/jpeg"),
        ("jpeg", "image/jpeg"),
        ("gif", "image/gif"),
        ("webp", "image/webp"),
        ("svg", "image/svg+xml"),
        ("ico", "image/vnd.microsoft.icon"),
        ("bmp", "image/bmp"),
        ("mp3", "audio/mpeg"),
        ("wav", "audio/wav"),
        ("ogg", "audio/ogg"),
        ("mp4", "video/mp4"),
        ("webm", "video/webm"),
        ("woff", "font/woff"),
        ("woff2", "font/woff2"),
        ("ttf", "font/ttf"),
        ("wasm", "application/wasm"),
    ])
});

/// Look up the MIME type for a path by extension, case-insensitively.
pub fn mime_type_for(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    MIME_TABLE.get(extension.as_str()).copied()
}
