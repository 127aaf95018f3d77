//! Test doubles shared by the integration tests.
#![allow(dead_code)]

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use lantern::server::channel::{ChannelIo, ReadOutcome, RequestBuffer};
use mio::{Interest, Registry, Token};

/// Bytes the peer has sent that have not been read yet.
#[derive(Default)]
pub struct Wire {
    available: Vec<u8>,
    eof: bool,
}

impl Read for Wire {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.available.is_empty() {
            return if self.eof {
                Ok(0)
            } else {
                Err(io::ErrorKind::WouldBlock.into())
            };
        }
        let n = buf.len().min(self.available.len());
        buf[..n].copy_from_slice(&self.available[..n]);
        self.available.drain(..n);
        Ok(n)
    }
}

/// In-memory `ChannelIo` with a controllable write budget.
#[derive(Default)]
pub struct MockChannel {
    pub wire: Wire,
    pub request: RequestBuffer,
    pub read_error: Option<io::ErrorKind>,
    pub written: Vec<u8>,
    /// Bytes accepted before writes start failing with `WouldBlock`;
    /// `None` accepts everything.
    pub write_budget: Option<usize>,
    pub write_error: Option<io::ErrorKind>,
    pub shutdown_fails: bool,
    pub shutdowns: usize,
    pub closed: bool,
    pub interest: Option<Interest>,
    pub reregisters: usize,
    /// Number of `flush_pending` calls that report bytes still buffered.
    pub pending_flushes: usize,
    pub flushes: usize,
}

impl MockChannel {
    pub fn with_request(bytes: &[u8]) -> Self {
        let mut channel = Self::default();
        channel.feed(bytes);
        channel
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.wire.available.extend_from_slice(bytes);
    }

    pub fn hang_up(&mut self) {
        self.wire.eof = true;
    }

    pub fn written_str(&self) -> String {
        String::from_utf8_lossy(&self.written).into_owned()
    }

    /// Body of the written reply, after the blank line.
    pub fn body(&self) -> &[u8] {
        let end = self
            .written
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("reply head written");
        &self.written[end + 4..]
    }
}

impl ChannelIo for MockChannel {
    fn read(&mut self) -> io::Result<ReadOutcome> {
        if let Some(kind) = self.read_error.take() {
            return Err(kind.into());
        }
        self.request.read_from(&mut self.wire)
    }

    fn read_buf(&self) -> &[u8] {
        self.request.filled()
    }

    fn write(&mut self, src: &[u8]) -> io::Result<usize> {
        if let Some(kind) = self.write_error.take() {
            return Err(kind.into());
        }
        if self.closed {
            return Err(io::ErrorKind::NotConnected.into());
        }
        let n = match self.write_budget {
            Some(budget) => budget.min(src.len()),
            None => src.len(),
        };
        if n == 0 && !src.is_empty() {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        if let Some(budget) = self.write_budget.as_mut() {
            *budget -= n;
        }
        self.written.extend_from_slice(&src[..n]);
        Ok(n)
    }

    fn flush_pending(&mut self) -> io::Result<bool> {
        self.flushes += 1;
        if self.pending_flushes > 0 {
            self.pending_flushes -= 1;
            return Ok(false);
        }
        Ok(true)
    }

    fn shutdown(&mut self) -> io::Result<bool> {
        self.shutdowns += 1;
        Ok(!self.shutdown_fails)
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn register(&mut self, _: &Registry, _: Token, interest: Interest) -> io::Result<()> {
        self.interest = Some(interest);
        Ok(())
    }

    fn reregister(&mut self, _: &Registry, _: Token, interest: Interest) -> io::Result<()> {
        self.interest = Some(interest);
        self.reregisters += 1;
        Ok(())
    }
}

/// Creates a content root with the given `(relative path, contents)` files.
pub fn content_root(files: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    for (name, contents) in files {
        write_file(dir.path(), name, contents);
    }
    dir
}

pub fn write_file(root: &Path, name: &str, contents: impl AsRef<[u8]>) {
    let path = root.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, contents).expect("write file");
}
