use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use url::Url;

use crate::http::request::{Method, Request};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed request: request contains non-ASCII bytes")]
    NotAscii,
    #[error("malformed request: request does not match the HTTP/1.x grammar")]
    InvalidRequest,
    #[error("malformed request: unsupported method {0}")]
    InvalidMethod(String),
    #[error("malformed request: invalid target {0}")]
    InvalidUri(String),
}

/// Request line, header lines (one of which must be `Host`), blank line.
///
/// Capture groups:
///
/// ```text
/// 1 = method      "GET"
/// 2 = path        "/dir/file"
/// 3 = version     "1.1"
/// 4 = header block (every header line, each ending in CRLF)
/// 5 = host        "hostname"
/// ```
static REQUEST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"\A([A-Z]+) +([^ \r\n]+) +HTTP/([0-9.]+)\r\n",
        r"((?:[^\r\n]+\r\n)*?Host: ([^ \r\n]+)\r\n(?:[^\r\n]+\r\n)*)",
        r"\r\n\z",
    ))
    .expect("request grammar is a valid regex")
});

/// Returns true once the received bytes end with the blank line that
/// terminates the header block.
///
/// Bodies are not supported, so this is the only completion signal.
pub fn is_complete(buf: &[u8]) -> bool {
    buf.len() >= 4 && buf.ends_with(b"\r\n\r\n")
}

/// Parses a completely received request.
///
/// The whole buffer must match the request grammar; leading or trailing
/// bytes outside of it reject the request.
pub fn parse(buf: &[u8]) -> Result<Request, ParseError> {
    if !buf.is_ascii() {
        return Err(ParseError::NotAscii);
    }
    // ASCII is always valid UTF-8.
    let text = std::str::from_utf8(buf).map_err(|_| ParseError::NotAscii)?;

    let caps = REQUEST_RE
        .captures(text)
        .ok_or(ParseError::InvalidRequest)?;

    let method_str = &caps[1];
    let method =
        Method::from_str(method_str).ok_or_else(|| ParseError::InvalidMethod(method_str.to_string()))?;

    let path = &caps[2];
    let host = &caps[5];
    if !path.starts_with('/') {
        return Err(ParseError::InvalidUri(path.to_string()));
    }
    let target = format!("http://{}{}", host, path);
    let uri = Url::parse(&target).map_err(|_| ParseError::InvalidUri(target.clone()))?;

    let headers = parse_headers(&caps[4]);
    let accept_charset = headers.get("accept-charset").cloned();
    let etag = headers
        .get("if-none-match")
        .map(|v| v.replace('"', ""))
        .filter(|v| !v.is_empty());

    Ok(Request {
        method,
        version: caps[3].to_string(),
        uri,
        headers,
        accept_charset,
        etag,
    })
}

fn parse_headers(block: &str) -> HashMap<String, String> {
    let mut headers = HashMap::new();

    for line in block.split("\r\n") {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if key.trim().is_empty() {
            continue;
        }
        headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    headers
}
