//! Accepted-connection heartbeat.
//!
//! A process-wide counter bumped once per accepted connection. Every
//! `period` connections it logs a line and starts over from zero, so the
//! count never grows without bound and the log shows the server is alive.

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::info;

pub const HEARTBEAT_PERIOD: usize = 50;

/// Shared by every acceptor in the process.
pub static HEARTBEAT: Heartbeat = Heartbeat::new(HEARTBEAT_PERIOD);

#[derive(Debug)]
pub struct Heartbeat {
    count: AtomicUsize,
    period: usize,
}

impl Heartbeat {
    pub const fn new(period: usize) -> Self {
        Self {
            count: AtomicUsize::new(0),
            period,
        }
    }

    /// Records one connection. Returns true when this call completed a
    /// period and reset the counter.
    pub fn tick(&self) -> bool {
        let period = self.period.max(1);
        let previous = self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(if n + 1 >= period { 0 } else { n + 1 })
            })
            .unwrap_or_default();

        let wrapped = previous + 1 >= period;
        if wrapped {
            info!(connections = period, "Heartbeat");
        }
        wrapped
    }

    /// Connections seen since the last reset.
    pub fn current(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resets_every_period() {
        let beat = Heartbeat::new(3);

        assert!(!beat.tick());
        assert!(!beat.tick());
        assert_eq!(beat.current(), 2);
        assert!(beat.tick());
        assert_eq!(beat.current(), 0);
        assert!(!beat.tick());
        assert_eq!(beat.current(), 1);
    }
}
