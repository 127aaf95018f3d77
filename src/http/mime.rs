//! MIME type detection based on file extensions.

pub const UTF_8: &str = "UTF-8";
pub const US_ASCII: &str = "US-ASCII";

/// Picks the charset advertised for text content.
///
/// US-ASCII is used only when the client asked for exactly that (ignoring
/// case); everything else, including no `Accept-Charset` at all, gets UTF-8.
pub fn negotiate_charset(accept_charset: Option<&str>) -> &'static str {
    match accept_charset {
        Some(cs) if cs.trim().eq_ignore_ascii_case(US_ASCII) => US_ASCII,
        _ => UTF_8,
    }
}

/// Content type for a file extension (without the dot).
///
/// Text types carry the given charset parameter.
///
/// ```
/// # use lantern::http::mime::content_type;
/// assert_eq!(content_type("HTML", "UTF-8"), "text/html; charset=UTF-8");
/// assert_eq!(content_type("jpeg", "UTF-8"), "image/jpg");
/// assert_eq!(content_type("", "UTF-8"), "application/octet-stream");
/// ```
pub fn content_type(extension: &str, charset: &str) -> String {
    match extension.to_ascii_lowercase().as_str() {
        "txt" | "html" => format!("text/html; charset={}", charset),
        "js" => format!("application/javascript; charset={}", charset),
        "jpg" | "jpeg" => "image/jpg".to_string(),
        _ => "application/octet-stream".to_string(),
    }
}
