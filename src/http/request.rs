use std::collections::HashMap;
use std::fmt;

use url::Url;

/// HTTP request methods.
///
/// All four are recognized by the parser, but only GET is served; the others
/// are answered with 405 Method Not Allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// PUT - Replace a resource
    PUT,
    /// POST - Create or submit data
    POST,
    /// HEAD - Like GET but without the response body
    HEAD,
}

impl Method {
    /// Parses an HTTP method from a string.
    ///
    /// # Arguments
    ///
    /// * `s` - String representation of the method (case-sensitive, uppercase)
    ///
    /// # Returns
    ///
    /// `Some(Method)` if the string matches a known method, `None` otherwise.
    ///
    /// # Example
    ///
    /// ```
    /// # use lantern::http::request::Method;
    /// assert_eq!(Method::from_str("GET"), Some(Method::GET));
    /// assert_eq!(Method::from_str("get"), None);
    /// assert_eq!(Method::from_str("DELETE"), None);
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::GET),
            "PUT" => Some(Method::PUT),
            "POST" => Some(Method::POST),
            "HEAD" => Some(Method::HEAD),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::PUT => "PUT",
            Method::POST => "POST",
            Method::HEAD => "HEAD",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully received and parsed request.
///
/// Built only by [`crate::http::parser::parse`]; there is no way to obtain a
/// partially parsed `Request`.
#[derive(Debug, Clone)]
pub struct Request {
    /// The HTTP method
    pub method: Method,
    /// Version number following `HTTP/` in the request line (e.g. "1.1")
    pub version: String,
    /// Target URI, synthesized as `http://<Host><path>`
    pub uri: Url,
    /// Header lines other than the request line, keyed by lower-cased name
    pub headers: HashMap<String, String>,
    /// Value of the `Accept-Charset` header, if any
    pub accept_charset: Option<String>,
    /// `If-None-Match` value with quote characters removed; `None` means no
    /// conditional check was requested
    pub etag: Option<String>,
}

impl Request {
    /// Retrieves a header value by name, case-insensitively.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .get(&key.to_ascii_lowercase())
            .map(|v| v.as_str())
    }

    pub fn is_conditional(&self) -> bool {
        self.etag.is_some()
    }

    /// Path component of the target URI, still percent-encoded.
    pub fn path(&self) -> &str {
        self.uri.path()
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} HTTP/{}", self.method, self.uri, self.version)
    }
}
