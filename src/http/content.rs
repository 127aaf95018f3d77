//! Reply bodies.
//!
//! [`Content`] is either a memory-mapped file or an in-memory text message.
//! Both follow the same protocol: `prepare` once (idempotent), then `send`
//! until it reports that nothing remains, then `release`.

use std::error::Error;
use std::fmt::Write as _;
use std::io;
use std::sync::Arc;

use bytes::Bytes;

use crate::cache::Region;
use crate::http::mime;
use crate::server::channel::ChannelIo;

#[derive(Debug)]
pub enum Content {
    File(FileContent),
    Text(StringContent),
}

impl Content {
    pub fn content_type(&self) -> &str {
        match self {
            Content::File(c) => c.content_type(),
            Content::Text(c) => c.content_type(),
        }
    }

    /// Entity tag, empty when the content has none.
    pub fn etag(&self) -> &str {
        match self {
            Content::File(c) => c.etag(),
            Content::Text(_) => "",
        }
    }

    /// Byte length; `None` until [`Content::prepare`] has run.
    pub fn length(&self) -> Option<usize> {
        match self {
            Content::File(c) => c.length(),
            Content::Text(c) => c.length(),
        }
    }

    pub fn prepare(&mut self) -> io::Result<()> {
        match self {
            Content::File(c) => c.prepare(),
            Content::Text(c) => {
                c.prepare();
                Ok(())
            }
        }
    }

    /// Writes as much as the channel accepts. Returns true while unsent bytes
    /// remain.
    pub fn send<C: ChannelIo + ?Sized>(&mut self, channel: &mut C) -> io::Result<bool> {
        match self {
            Content::File(c) => c.send(channel),
            Content::Text(c) => c.send(channel),
        }
    }

    pub fn release(&mut self) {
        match self {
            Content::File(c) => c.release(),
            Content::Text(c) => c.release(),
        }
    }
}

impl From<FileContent> for Content {
    fn from(c: FileContent) -> Self {
        Content::File(c)
    }
}

impl From<StringContent> for Content {
    fn from(c: StringContent) -> Self {
        Content::Text(c)
    }
}

/// A file served straight out of its memory mapping.
#[derive(Debug)]
pub struct FileContent {
    region: Arc<Region>,
    content_type: String,
    cursor: Option<usize>,
}

impl FileContent {
    /// `extension` picks the MIME type; `accept_charset` is the client's
    /// `Accept-Charset` header, if it sent one.
    pub fn new(region: Arc<Region>, extension: &str, accept_charset: Option<&str>) -> Self {
        let charset = mime::negotiate_charset(accept_charset);
        Self {
            region,
            content_type: mime::content_type(extension, charset),
            cursor: None,
        }
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn etag(&self) -> &str {
        self.region.etag()
    }

    pub fn length(&self) -> Option<usize> {
        self.cursor.map(|_| self.region.len())
    }

    /// Rewinds to the start of the mapping.
    ///
    /// Fails if the backing file has disappeared or shrunk below the mapped
    /// length since it was mapped.
    pub fn prepare(&mut self) -> io::Result<()> {
        let on_disk = std::fs::metadata(self.region.path())?.len();
        if on_disk < self.region.len() as u64 {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} changed on disk", self.region.path().display()),
            ));
        }
        self.cursor = Some(0);
        Ok(())
    }

    pub fn send<C: ChannelIo + ?Sized>(&mut self, channel: &mut C) -> io::Result<bool> {
        let Some(mut pos) = self.cursor else {
            return Err(not_prepared());
        };

        let total = self.region.len();
        while pos < total {
            match channel.transfer_file(&self.region, pos) {
                Ok(0) => break,
                Ok(n) => pos += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    self.cursor = Some(pos);
                    return Err(e);
                }
            }
        }

        self.cursor = Some(pos);
        Ok(pos < total)
    }

    pub fn release(&mut self) {}
}

/// A short text message, used for status and error bodies.
#[derive(Debug)]
pub struct StringContent {
    text: String,
    content_type: String,
    encoded: Option<Bytes>,
    cursor: usize,
}

impl StringContent {
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_type(text, "text/plain")
    }

    /// Text with an explicit MIME type; a UTF-8 charset parameter is
    /// appended and the text always ends in a newline.
    pub fn with_type(text: impl Into<String>, mime_type: &str) -> Self {
        let mut text = text.into();
        if !text.ends_with('\n') {
            text.push('\n');
        }
        Self {
            text,
            content_type: format!("{}; charset=utf-8", mime_type),
            encoded: None,
            cursor: 0,
        }
    }

    /// Describes `err` and every error in its source chain, one per line.
    pub fn from_error(err: &(dyn Error + 'static)) -> Self {
        let mut text = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            let _ = write!(text, "\ncaused by: {}", cause);
            source = cause.source();
        }
        Self::new(text)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn length(&self) -> Option<usize> {
        self.encoded.as_ref().map(Bytes::len)
    }

    /// Encodes the text on first use and rewinds.
    pub fn prepare(&mut self) {
        if self.encoded.is_none() {
            self.encoded = Some(Bytes::copy_from_slice(self.text.as_bytes()));
        }
        self.cursor = 0;
    }

    pub fn send<C: ChannelIo + ?Sized>(&mut self, channel: &mut C) -> io::Result<bool> {
        let Some(encoded) = self.encoded.as_ref() else {
            return Err(not_prepared());
        };

        while self.cursor < encoded.len() {
            match channel.write(&encoded[self.cursor..]) {
                Ok(0) => break,
                Ok(n) => self.cursor += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }

        Ok(self.cursor < encoded.len())
    }

    pub fn release(&mut self) {}
}

fn not_prepared() -> io::Error {
    io::Error::other("content sent before prepare")
}
