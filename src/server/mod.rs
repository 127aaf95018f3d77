//! Connection reactor.
//!
//! Two threads: the acceptor blocks in `accept` and hands every new
//! connection to the dispatcher, which blocks in the readiness wait and runs
//! the per-connection handlers.

pub mod channel;
pub mod dispatcher;
pub mod heartbeat;
pub mod listener;

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread;

use anyhow::Context;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::cache::FileCache;
use crate::config::ServerConfig;
use crate::server::dispatcher::Dispatcher;
use crate::server::listener::Acceptor;

pub struct Server {
    listener: TcpListener,
    cache: Arc<FileCache>,
}

impl Server {
    /// Binds the listening socket with `SO_REUSEADDR` and the configured
    /// backlog. The socket stays blocking; only accepted connections are
    /// switched to non-blocking mode.
    pub fn bind(cfg: &ServerConfig, cache: Arc<FileCache>) -> anyhow::Result<Self> {
        let addr = SocketAddr::new(cfg.bind, cfg.port);
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket
            .bind(&addr.into())
            .with_context(|| format!("cannot bind {}", addr))?;
        socket.listen(cfg.backlog)?;

        Ok(Self {
            listener: socket.into(),
            cache,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Starts the dispatcher and acceptor threads.
    pub fn start(self) -> anyhow::Result<ServerHandle> {
        let addr = self.local_addr()?;
        let dispatcher = Dispatcher::new().context("cannot create poller")?;
        let acceptor = Acceptor::new(self.listener, dispatcher.registrar(), self.cache);

        thread::Builder::new()
            .name("dispatcher".into())
            .spawn(move || dispatcher.run())
            .context("cannot spawn dispatcher thread")?;

        let (stopped_tx, stopped_rx) = oneshot::channel();
        thread::Builder::new()
            .name("acceptor".into())
            .spawn(move || {
                let res = acceptor.run();
                if let Err(e) = &res {
                    error!(error = %e, "Acceptor stopped");
                }
                let _ = stopped_tx.send(res);
            })
            .context("cannot spawn acceptor thread")?;

        info!(addr = %addr, "Server started");
        Ok(ServerHandle {
            addr,
            stopped: stopped_rx,
        })
    }
}

/// Running server.
pub struct ServerHandle {
    addr: SocketAddr,
    stopped: oneshot::Receiver<anyhow::Result<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Resolves when the acceptor thread exits, with the error that ended it.
    pub async fn stopped(self) -> anyhow::Result<()> {
        self.stopped
            .await
            .context("acceptor thread vanished")?
    }
}
