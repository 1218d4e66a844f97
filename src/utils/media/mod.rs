/// Content type recorded when neither the download nor the lookup reports one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Strip parameters from a MIME type (`audio/ogg; codecs=opus` -> `audio/ogg`).
///
/// Returns `None` for blank input.
pub fn base_mime(ct: &str) -> Option<String> {
    let base = ct.split(';').next().unwrap_or("").trim();
    if base.is_empty() {
        None
    } else {
        Some(base.to_ascii_lowercase())
    }
}

/// Image MIME type identified from leading magic bytes, if any.
pub fn sniff_image_mime(data: &[u8]) -> Option<&'static str> {
    if data.len() < 4 {
        return None;
    }
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        return Some("image/png");
    }
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    // GIF87a or GIF89a
    if data.starts_with(b"GIF8") {
        return Some("image/gif");
    }
    // RIFF....WEBP
    if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    None
}
