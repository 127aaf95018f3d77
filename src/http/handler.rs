use std::io;
use std::path::Path;
use std::sync::Arc;

use mio::{Interest, Registry, Token};
use percent_encoding::percent_decode_str;
use tracing::{debug, error};

use crate::cache::{CacheError, FileCache};
use crate::http::content::{FileContent, StringContent};
use crate::http::parser::{self, ParseError};
use crate::http::reply::{Reply, StatusCode};
use crate::http::request::{Method, Request};
use crate::server::channel::{ChannelIo, PlainChannel, ReadOutcome};
use crate::server::dispatcher::{Handler, SelectionKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Registered, no event seen yet
    Idle,
    /// Accumulating request bytes
    Receiving,
    /// Request complete, reply not built yet
    Parsed,
    /// Reply built, not prepared yet
    Replying,
    /// Sending the reply and shutting the transport down
    Draining,
    Closed,
}

/// Drives one connection from the first readable event to close.
///
/// Exactly one request is read and exactly one reply is produced; there is no
/// keep-alive. The dispatcher calls [`Handler::handle`] for every readiness
/// event, and the handler advances as far as it can without blocking.
pub struct RequestHandler<C: ChannelIo = PlainChannel> {
    channel: C,
    cache: Arc<FileCache>,
    state: ConnectionState,
    request_received: bool,
    request: Option<Request>,
    reply: Option<Reply>,
}

impl<C: ChannelIo> RequestHandler<C> {
    pub fn new(channel: C, cache: Arc<FileCache>) -> Self {
        Self {
            channel,
            cache,
            state: ConnectionState::Idle,
            request_received: false,
            request: None,
            reply: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn request(&self) -> Option<&Request> {
        self.request.as_ref()
    }

    pub fn reply(&self) -> Option<&Reply> {
        self.reply.as_ref()
    }

    fn advance(&mut self, key: &SelectionKey<'_>) -> io::Result<()> {
        loop {
            match self.state {
                ConnectionState::Idle | ConnectionState::Receiving => {
                    if !self.receive(key)? {
                        self.state = ConnectionState::Receiving;
                        return Ok(());
                    }
                    self.state = ConnectionState::Parsed;
                }

                ConnectionState::Parsed => {
                    self.build();
                    self.state = ConnectionState::Replying;
                }

                ConnectionState::Replying => {
                    self.prepare();
                    self.state = ConnectionState::Draining;
                }

                ConnectionState::Draining => {
                    if self.send()? || !self.channel.flush_pending()? {
                        return self.want_write(key);
                    }
                    if !self.channel.shutdown()? {
                        // Retried on the next write-ready event.
                        return self.want_write(key);
                    }
                    self.channel.close();
                    if let Some(reply) = self.reply.as_mut() {
                        reply.release();
                    }
                    self.state = ConnectionState::Closed;
                    return Ok(());
                }

                ConnectionState::Closed => return Ok(()),
            }
        }
    }

    /// Returns true once the whole request is in the buffer or the peer
    /// stopped sending.
    fn receive(&mut self, key: &SelectionKey<'_>) -> io::Result<bool> {
        if self.request_received {
            return Ok(true);
        }

        if !self.channel.handshake_ready(key)? {
            return Ok(false);
        }

        // Readiness is edge-triggered: keep reading until the socket runs dry.
        loop {
            match self.channel.read()? {
                ReadOutcome::Closed => break,
                ReadOutcome::Data(_) if parser::is_complete(self.channel.read_buf()) => break,
                ReadOutcome::Data(_) => continue,
                ReadOutcome::Idle => return Ok(false),
            }
        }

        self.request_received = true;
        Ok(true)
    }

    /// Always leaves a reply behind.
    fn build(&mut self) {
        let reply = match parser::parse(self.channel.read_buf()) {
            Ok(request) => {
                let reply = build_reply(&request, &self.cache);
                debug!(request = %request, status = reply.status().as_u16(), "Reply built");
                self.request = Some(request);
                reply
            }
            Err(e) => {
                debug!(error = %e, "Malformed request");
                bad_request(&e)
            }
        };
        self.reply = Some(reply);
    }

    /// Prepares the reply, replacing it with a 404 if that fails.
    fn prepare(&mut self) {
        let Some(reply) = self.reply.as_mut() else {
            return;
        };

        if let Err(e) = reply.prepare() {
            debug!(error = %e, "Reply prepare failed");
            reply.release();
            self.reply = Some(Reply::text(
                StatusCode::NotFound,
                StringContent::from_error(&e),
            ));
        }
    }

    fn send(&mut self) -> io::Result<bool> {
        let Some(reply) = self.reply.as_mut() else {
            return Ok(false);
        };
        match reply.send(&mut self.channel) {
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(true),
            other => other,
        }
    }

    /// Re-arms write interest on every call. Readiness is edge-triggered, so
    /// a socket that is already writable reports nothing new unless the
    /// registration is renewed.
    fn want_write(&mut self, key: &SelectionKey<'_>) -> io::Result<()> {
        self.channel
            .reregister(key.registry(), key.token(), Interest::WRITABLE)
    }

    /// Any I/O fault ends the connection.
    fn abort(&mut self, err: io::Error) {
        if is_disconnect(&err) {
            debug!(error = %err, "Peer disconnected");
        } else {
            error!(error = %err, "RequestHandler failed");
        }

        let _ = self.channel.shutdown();
        self.channel.close();
        if let Some(reply) = self.reply.as_mut() {
            reply.release();
        }
        self.state = ConnectionState::Closed;
    }
}

impl<C: ChannelIo> Handler for RequestHandler<C> {
    fn register(&mut self, registry: &Registry, token: Token, interest: Interest) -> io::Result<()> {
        self.channel.register(registry, token, interest)
    }

    fn handle(&mut self, key: &SelectionKey<'_>) {
        if let Err(e) = self.advance(key) {
            self.abort(e);
        }
    }

    fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }
}

/// Ordinary ways for a client to go away mid-conversation.
fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset
    )
}

/// Resolves a parsed request against the cache.
///
/// - anything but GET: 405 echoing the request
/// - path not servable: 404 echoing the error
/// - `If-None-Match` equal to the file's ETag: 304
/// - otherwise: 200 with the file
pub fn build_reply(request: &Request, cache: &FileCache) -> Reply {
    if request.method != Method::GET {
        return Reply::new(
            StatusCode::MethodNotAllowed,
            StringContent::new(request.to_string()),
        );
    }

    let path = match percent_decode_str(request.path()).decode_utf8() {
        Ok(path) => path.into_owned(),
        Err(_) => {
            let err = CacheError::InvalidPath(request.path().to_string());
            return not_found(&err);
        }
    };

    let region = match cache.get(&path) {
        Ok(region) => region,
        Err(e) => return not_found(&e),
    };

    let extension = Path::new(&path)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("");
    let content = FileContent::new(region, extension, request.accept_charset.as_deref());

    if let Some(etag) = request.etag.as_deref() {
        if etag == content.etag() {
            return Reply::new(
                StatusCode::NotModified,
                StringContent::new(request.to_string()),
            );
        }
    }

    Reply::new(StatusCode::Ok, content)
}

pub fn bad_request(err: &ParseError) -> Reply {
    Reply::new(StatusCode::BadRequest, StringContent::from_error(err))
}

fn not_found(err: &CacheError) -> Reply {
    Reply::new(StatusCode::NotFound, StringContent::from_error(err))
}
