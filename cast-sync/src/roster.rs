//! Slave roster bookkeeping
//!
//! Tracks the receivers registered with a master session along with their
//! measured round-trip delays. The roster is rebuilt wholesale by each
//! add-slaves operation; no incremental mutation happens while a start
//! schedule is in flight.

use crate::link::LinkHandle;
use std::net::SocketAddr;
use std::time::Duration;

/// Client-supplied description of one receiver to register
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlaveSpec {
    /// Human-readable receiver name, used in logs and error reasons
    pub name: String,
    /// Receiver address (v4 or v6)
    pub addr: SocketAddr,
}

/// A connected, probed receiver
#[derive(Debug, Clone)]
pub struct SlaveRemote {
    pub name: String,
    pub addr: SocketAddr,
    pub handle: LinkHandle,
    /// Measured round-trip delay to this receiver
    pub delay: Duration,
}

/// Ordered list of registered receivers plus the max observed delay
#[derive(Debug, Default)]
pub struct SlaveRoster {
    slaves: Vec<SlaveRemote>,
    max_delay: Duration,
}

impl SlaveRoster {
    pub fn new() -> Self {
        SlaveRoster::default()
    }

    pub fn len(&self) -> usize {
        self.slaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slaves.is_empty()
    }

    /// Largest measured delay across the roster
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn iter(&self) -> impl Iterator<Item = &SlaveRemote> {
        self.slaves.iter()
    }

    /// Register a probed receiver, keeping `max_delay` current.
    pub fn push(&mut self, slave: SlaveRemote) {
        if slave.delay > self.max_delay {
            self.max_delay = slave.delay;
        }
        self.slaves.push(slave);
    }

    /// Drop every receiver and reset the max delay.
    pub fn clear(&mut self) -> Vec<SlaveRemote> {
        self.max_delay = Duration::ZERO;
        std::mem::take(&mut self.slaves)
    }
}
