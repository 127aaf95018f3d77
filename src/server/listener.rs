use std::net::TcpListener;
use std::sync::Arc;

use anyhow::Context;
use mio::Interest;
use tracing::debug;

use crate::cache::FileCache;
use crate::http::handler::RequestHandler;
use crate::server::channel::PlainChannel;
use crate::server::dispatcher::Registrar;
use crate::server::heartbeat::HEARTBEAT;

/// Blocking accept loop feeding the dispatcher.
pub struct Acceptor {
    listener: TcpListener,
    registrar: Registrar,
    cache: Arc<FileCache>,
}

impl Acceptor {
    pub fn new(listener: TcpListener, registrar: Registrar, cache: Arc<FileCache>) -> Self {
        Self {
            listener,
            registrar,
            cache,
        }
    }

    /// Accepts connections until the listening socket fails.
    ///
    /// There is no retry: the first accept or registration error ends the
    /// loop and is returned to the caller.
    pub fn run(self) -> anyhow::Result<()> {
        loop {
            let (socket, peer) = self.listener.accept().context("accept failed")?;
            debug!(peer = %peer, "Accepted connection");

            let channel = PlainChannel::from_std(socket)
                .with_context(|| format!("cannot configure connection from {}", peer))?;
            let handler = RequestHandler::new(channel, Arc::clone(&self.cache));
            self.registrar
                .register(Box::new(handler), Interest::READABLE)
                .context("cannot register connection")?;

            HEARTBEAT.tick();
        }
    }
}
