//! Byte-stream adapter between the reactor and a connection.
//!
//! [`ChannelIo`] is the seam a secure transport plugs into: the handshake,
//! flush and shutdown hooks are no-ops for [`PlainChannel`], while a TLS
//! channel would negotiate there and report `false` until it is done. The
//! request state machine only ever talks to the trait.

use std::io::{self, Read, Write};

use mio::net::TcpStream;
use mio::{Interest, Registry, Token};

use crate::cache::Region;
use crate::server::dispatcher::SelectionKey;

/// Initial capacity of the inbound request buffer.
pub const REQUEST_BUF_SIZE: usize = 4096;

/// Result of a single non-blocking read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// This many bytes were appended to the request buffer
    Data(usize),
    /// Nothing to read right now
    Idle,
    /// The peer closed its side of the connection
    Closed,
}

/// Growable inbound buffer.
///
/// Capacity doubles whenever less than 5% of it is free; it never shrinks
/// and has no upper bound.
#[derive(Debug)]
pub struct RequestBuffer {
    data: Vec<u8>,
    filled: usize,
}

impl RequestBuffer {
    pub fn new() -> Self {
        Self::with_capacity(REQUEST_BUF_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity.max(1)],
            filled: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes received so far.
    pub fn filled(&self) -> &[u8] {
        &self.data[..self.filled]
    }

    fn reserve(&mut self) {
        let free = self.data.len() - self.filled;
        if free < self.data.len() / 20 || free == 0 {
            let mut grown = vec![0; self.data.len() * 2];
            grown[..self.filled].copy_from_slice(&self.data[..self.filled]);
            self.data = grown;
        }
    }

    /// Performs one read from `src` into the free tail of the buffer.
    pub fn read_from<R: Read + ?Sized>(&mut self, src: &mut R) -> io::Result<ReadOutcome> {
        self.reserve();
        loop {
            match src.read(&mut self.data[self.filled..]) {
                Ok(0) => return Ok(ReadOutcome::Closed),
                Ok(n) => {
                    self.filled += n;
                    return Ok(ReadOutcome::Data(n));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(ReadOutcome::Idle),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RequestBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// I/O capability of one accepted connection.
pub trait ChannelIo: Send {
    /// Reads once into the inbound buffer, growing it first if needed.
    fn read(&mut self) -> io::Result<ReadOutcome>;

    /// Everything read so far.
    fn read_buf(&self) -> &[u8];

    /// Writes as much of `src` as the connection accepts right now.
    fn write(&mut self, src: &[u8]) -> io::Result<usize>;

    /// Sends file bytes starting at `offset` straight from the mapped region,
    /// without staging them in an intermediate buffer.
    fn transfer_file(&mut self, region: &Region, offset: usize) -> io::Result<usize> {
        let bytes: &[u8] = region;
        self.write(&bytes[offset.min(bytes.len())..])
    }

    /// Handshake step for blocking use. Returns true when done.
    fn handshake(&mut self) -> io::Result<bool> {
        Ok(true)
    }

    /// Handshake step driven by a readiness event. Returns true when done;
    /// an implementation that needs the other direction re-registers through
    /// `key` and returns false.
    fn handshake_ready(&mut self, _key: &SelectionKey<'_>) -> io::Result<bool> {
        Ok(true)
    }

    /// Pushes out transport-buffered bytes. Returns true once nothing is
    /// pending.
    fn flush_pending(&mut self) -> io::Result<bool> {
        Ok(true)
    }

    /// Starts transport teardown. Returns true once the channel may be closed.
    fn shutdown(&mut self) -> io::Result<bool> {
        Ok(true)
    }

    /// Releases the underlying connection. Calling it again is a no-op.
    fn close(&mut self);

    fn register(&mut self, registry: &Registry, token: Token, interest: Interest) -> io::Result<()>;

    fn reregister(&mut self, registry: &Registry, token: Token, interest: Interest)
    -> io::Result<()>;
}

/// Plaintext TCP channel.
#[derive(Debug)]
pub struct PlainChannel {
    stream: Option<TcpStream>,
    request: RequestBuffer,
}

impl PlainChannel {
    /// Wraps an already non-blocking stream.
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream: Some(stream),
            request: RequestBuffer::new(),
        }
    }

    /// Converts a freshly accepted blocking stream.
    pub fn from_std(stream: std::net::TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Self::new(TcpStream::from_std(stream)))
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn stream(&mut self) -> io::Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "channel is closed"))
    }
}

impl ChannelIo for PlainChannel {
    fn read(&mut self) -> io::Result<ReadOutcome> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "channel is closed"))?;
        self.request.read_from(stream)
    }

    fn read_buf(&self) -> &[u8] {
        self.request.filled()
    }

    fn write(&mut self, src: &[u8]) -> io::Result<usize> {
        self.stream()?.write(src)
    }

    fn close(&mut self) {
        // Dropping the stream closes the socket and removes it from the poller.
        self.stream.take();
    }

    fn register(&mut self, registry: &Registry, token: Token, interest: Interest) -> io::Result<()> {
        registry.register(self.stream()?, token, interest)
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interest: Interest,
    ) -> io::Result<()> {
        registry.reregister(self.stream()?, token, interest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn buffer_doubles_when_nearly_full() {
        let mut buf = RequestBuffer::with_capacity(100);
        let mut src = Cursor::new(vec![b'a'; 96]);

        assert_eq!(buf.read_from(&mut src).unwrap(), ReadOutcome::Data(96));
        assert_eq!(buf.capacity(), 100);

        // 4 bytes free is under 5% of 100
        let mut more = Cursor::new(b"bcdefg".to_vec());
        assert_eq!(buf.read_from(&mut more).unwrap(), ReadOutcome::Data(6));
        assert_eq!(buf.capacity(), 200);
        assert_eq!(buf.filled().len(), 102);
        assert!(buf.filled().starts_with(&[b'a'; 96]));
        assert!(buf.filled().ends_with(b"bcdefg"));
    }

    #[test]
    fn buffer_reports_eof() {
        let mut buf = RequestBuffer::new();
        let mut src = Cursor::new(Vec::new());

        assert_eq!(buf.read_from(&mut src).unwrap(), ReadOutcome::Closed);
        assert!(buf.filled().is_empty());
    }

    #[test]
    fn closed_channel_refuses_io() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let _client = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (socket, _) = listener.accept().unwrap();
        let mut channel = PlainChannel::from_std(socket).unwrap();

        assert!(channel.is_open());
        assert_eq!(channel.read().unwrap(), ReadOutcome::Idle);

        channel.close();
        channel.close();
        assert!(!channel.is_open());
        assert_eq!(
            channel.write(b"x").unwrap_err().kind(),
            io::ErrorKind::NotConnected
        );
    }
}
