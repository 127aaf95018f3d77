use std::io;

use bytes::{BufMut, Bytes, BytesMut};

use crate::http::content::{Content, StringContent};
use crate::server::channel::ChannelIo;

const HTTP_VERSION: &str = "HTTP/1.1";
const SERVER: &str = concat!("lantern/", env!("CARGO_PKG_VERSION"));

/// HTTP status codes the server replies with.
///
/// - `Ok` (200): File found and sent
/// - `NotModified` (304): Client's cached copy is still current
/// - `BadRequest` (400): Malformed request
/// - `NotFound` (404): Resource not found
/// - `MethodNotAllowed` (405): Anything but GET
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 304 Not Modified
    NotModified,
    /// 400 Bad Request
    BadRequest,
    /// 404 Not Found
    NotFound,
    /// 405 Method Not Allowed
    MethodNotAllowed,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use lantern::http::reply::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::NotModified.as_u16(), 304);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::NotModified => 304,
            StatusCode::BadRequest => 400,
            StatusCode::NotFound => 404,
            StatusCode::MethodNotAllowed => 405,
        }
    }

    /// Returns the standard HTTP reason phrase for this status code.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::NotModified => "Not Modified",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
        }
    }

    /// 304 replies never carry a body.
    pub fn has_body(&self) -> bool {
        !matches!(self, StatusCode::NotModified)
    }
}

/// A status code paired with the content to send.
///
/// `prepare` must run once before the first `send`.
#[derive(Debug)]
pub struct Reply {
    status: StatusCode,
    content: Content,
    head: Option<Bytes>,
    written: usize,
}

impl Reply {
    pub fn new(status: StatusCode, content: impl Into<Content>) -> Self {
        Self {
            status,
            content: content.into(),
            head: None,
            written: 0,
        }
    }

    /// A text reply that is already prepared. Encoding text cannot fail, so
    /// this never needs the fallible [`Reply::prepare`].
    pub fn text(status: StatusCode, mut content: StringContent) -> Self {
        content.prepare();
        let mut reply = Self::new(status, content);
        reply.head = Some(reply.serialize_head());
        reply
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn etag(&self) -> &str {
        self.content.etag()
    }

    /// Serialized status line and headers, once prepared.
    pub fn head(&self) -> Option<&[u8]> {
        self.head.as_deref()
    }

    /// Prepares the content and serializes the head. Calling it again
    /// rewinds both.
    pub fn prepare(&mut self) -> io::Result<()> {
        self.content.prepare()?;
        self.head = Some(self.serialize_head());
        self.written = 0;
        Ok(())
    }

    fn serialize_head(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(256);

        // Status line
        buf.put_slice(
            format!(
                "{} {} {}\r\n",
                HTTP_VERSION,
                self.status.as_u16(),
                self.status.reason_phrase()
            )
            .as_bytes(),
        );

        // Headers
        let mut header = |k: &str, v: &str| {
            buf.put_slice(k.as_bytes());
            buf.put_slice(b": ");
            buf.put_slice(v.as_bytes());
            buf.put_slice(b"\r\n");
        };
        header("Server", SERVER);
        header("Content-Type", self.content.content_type());
        if self.status.has_body() {
            let length = self.content.length().unwrap_or(0);
            header("Content-Length", &length.to_string());
        }
        if !self.content.etag().is_empty() {
            header("ETag", &format!("\"{}\"", self.content.etag()));
        }
        header("Connection", "close");

        // Header/body separator
        buf.put_slice(b"\r\n");

        buf.freeze()
    }

    /// Writes the head, then as much of the body as the channel accepts.
    /// Returns true while unsent bytes remain.
    pub fn send<C: ChannelIo + ?Sized>(&mut self, channel: &mut C) -> io::Result<bool> {
        let Some(head) = self.head.as_ref() else {
            return Err(io::Error::other("reply sent before prepare"));
        };

        while self.written < head.len() {
            match channel.write(&head[self.written..]) {
                Ok(0) => return Ok(true),
                Ok(n) => self.written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(true),
                Err(e) => return Err(e),
            }
        }

        if !self.status.has_body() {
            return Ok(false);
        }
        self.content.send(channel)
    }

    pub fn release(&mut self) {
        self.content.release();
    }
}
