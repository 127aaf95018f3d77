//! Readiness loop.
//!
//! One thread blocks in [`Poll::poll`] and hands every ready connection to its
//! [`Handler`]. Other threads hand new connections over through a
//! [`Registrar`]: under the gate they queue the handler and wake the poller;
//! the poller drains the queue under the same gate once it has dispatched the
//! current batch of events. Registration therefore never waits on a blocked
//! `poll`, and handlers are only ever touched by the dispatcher thread.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mio::event::Event;
use mio::{Events, Interest, Poll, Registry, Token, Waker};
use tracing::{debug, error, trace, warn};

const WAKER: Token = Token(0);
const EVENTS_CAPACITY: usize = 1024;

/// Readiness of one registered connection, as seen by its handler.
pub struct SelectionKey<'a> {
    registry: &'a Registry,
    token: Token,
    readable: bool,
    writable: bool,
}

impl<'a> SelectionKey<'a> {
    pub fn new(registry: &'a Registry, token: Token, readable: bool, writable: bool) -> Self {
        Self {
            registry,
            token,
            readable,
            writable,
        }
    }

    fn from_event(registry: &'a Registry, event: &Event) -> Self {
        Self::new(
            registry,
            event.token(),
            event.is_readable() || event.is_read_closed() || event.is_error(),
            event.is_writable() || event.is_write_closed(),
        )
    }

    pub fn registry(&self) -> &'a Registry {
        self.registry
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn is_readable(&self) -> bool {
        self.readable
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }
}

/// Per-connection event handler driven by the dispatcher thread.
pub trait Handler: Send {
    /// Registers the handler's connection with the poller.
    fn register(&mut self, registry: &Registry, token: Token, interest: Interest) -> io::Result<()>;

    /// Reacts to a readiness event. Must not block.
    fn handle(&mut self, key: &SelectionKey<'_>);

    /// Once true, the dispatcher drops the handler.
    fn is_closed(&self) -> bool;
}

type Pending = Vec<(Box<dyn Handler>, Interest)>;

struct Gate {
    pending: Mutex<Pending>,
    waker: Waker,
}

impl Gate {
    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable handle for registering connections from other threads.
#[derive(Clone)]
pub struct Registrar {
    gate: Arc<Gate>,
}

impl Registrar {
    pub fn register(&self, handler: Box<dyn Handler>, interest: Interest) -> io::Result<()> {
        let mut pending = self.gate.lock();
        self.gate.waker.wake()?;
        pending.push((handler, interest));
        Ok(())
    }
}

pub struct Dispatcher {
    poll: Poll,
    events: Events,
    handlers: HashMap<Token, Box<dyn Handler>>,
    gate: Arc<Gate>,
    next_token: usize,
}

impl Dispatcher {
    pub fn new() -> io::Result<Self> {
        let poll = Poll::new()?;
        let waker = Waker::new(poll.registry(), WAKER)?;
        Ok(Self {
            poll,
            events: Events::with_capacity(EVENTS_CAPACITY),
            handlers: HashMap::new(),
            gate: Arc::new(Gate {
                pending: Mutex::new(Vec::new()),
                waker,
            }),
            next_token: WAKER.0 + 1,
        })
    }

    pub fn registrar(&self) -> Registrar {
        Registrar {
            gate: Arc::clone(&self.gate),
        }
    }

    /// Number of connections currently owned by the dispatcher.
    pub fn connections(&self) -> usize {
        self.handlers.len()
    }

    /// Runs the readiness loop forever. Errors are logged and the loop
    /// carries on.
    pub fn run(mut self) {
        loop {
            if let Err(e) = self.dispatch() {
                error!(error = %e, "Dispatcher error");
            }
        }
    }

    /// One iteration: wait, dispatch every ready connection, then take in
    /// connections queued by the registrar.
    pub fn dispatch(&mut self) -> io::Result<()> {
        match self.poll.poll(&mut self.events, None) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(e),
        }

        let registry = self.poll.registry();
        for event in self.events.iter() {
            let token = event.token();
            if token == WAKER {
                continue;
            }

            let closed = match self.handlers.get_mut(&token) {
                Some(handler) => {
                    handler.handle(&SelectionKey::from_event(registry, event));
                    handler.is_closed()
                }
                None => {
                    trace!(token = token.0, "Event for unknown connection");
                    false
                }
            };

            if closed {
                self.handlers.remove(&token);
                trace!(token = token.0, "Connection released");
            }
        }

        let mut pending = self.gate.lock();
        for (mut handler, interest) in pending.drain(..) {
            let token = Token(self.next_token);
            self.next_token = self.next_token.wrapping_add(1).max(WAKER.0 + 1);

            match handler.register(registry, token, interest) {
                Ok(()) => {
                    debug!(token = token.0, "Connection registered");
                    self.handlers.insert(token, handler);
                }
                Err(e) => warn!(error = %e, "Failed to register connection"),
            }
        }

        Ok(())
    }
}
