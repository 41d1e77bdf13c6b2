//! Staggered start coordination
//!
//! The master registers its receivers (connect + probe, all-or-nothing),
//! then computes a staggered, latency-compensated start schedule: a shared
//! countdown starts at `max_delay * slave_count`, each receiver is told to
//! begin after `countdown - delay/2`, and the time each dispatch itself
//! consumed is subtracted from the countdown before the next one. The
//! master finally waits out the remaining countdown locally, so every
//! node's start converges on the same instant instead of drifting later
//! with each receiver processed.
//!
//! Registration is fail-fast (a partially-synced roster is worse than
//! failing outright); start dispatch and control fan-out are best-effort
//! per receiver (one unreachable node must not stall the group). The two
//! policies are deliberately distinct.

use crate::link::{LinkError, RemoteLink};
use crate::probe::{probe, ProbeError};
use crate::roster::{SlaveRemote, SlaveRoster, SlaveSpec};
use cast_io::Timestamp;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Coordination errors (registration path)
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("failed to connect slave '{name}': {source}")]
    Connect {
        name: String,
        #[source]
        source: LinkError,
    },

    #[error("failed to probe slave '{name}': {source}")]
    Probe {
        name: String,
        #[source]
        source: ProbeError,
    },
}

/// One dispatched start instruction
#[derive(Debug, Clone)]
pub struct DispatchedStart {
    pub name: String,
    /// Delay the receiver was told to wait before starting
    pub delay: Duration,
}

/// Outcome of a start schedule
#[derive(Debug, Clone)]
pub struct StartReport {
    /// Per-receiver dispatched delays, in dispatch order
    pub dispatched: Vec<DispatchedStart>,
    /// Receivers whose start call failed (tolerated, logged)
    pub failed: Vec<String>,
    /// How long the master waited locally after the last dispatch
    pub local_wait: Duration,
}

/// Master-side start coordinator
///
/// Owns the slave roster and drives receivers through a [`RemoteLink`].
pub struct StartCoordinator {
    link: Arc<dyn RemoteLink>,
    roster: SlaveRoster,
}

impl StartCoordinator {
    pub fn new(link: Arc<dyn RemoteLink>) -> Self {
        StartCoordinator {
            link,
            roster: SlaveRoster::new(),
        }
    }

    pub fn roster(&self) -> &SlaveRoster {
        &self.roster
    }

    pub fn slave_count(&self) -> usize {
        self.roster.len()
    }

    /// Replace the roster with a freshly connected, freshly probed set.
    ///
    /// Any previously registered receivers are disconnected first. A
    /// single connect or probe failure aborts the whole operation and
    /// rolls the partial set back, leaving the roster empty.
    pub fn add_slaves(&mut self, specs: &[SlaveSpec]) -> Result<(), SyncError> {
        self.disconnect_all();

        for spec in specs {
            let handle = match self.link.connect(spec.addr) {
                Ok(handle) => handle,
                Err(source) => {
                    warn!(slave = %spec.name, error = %source, "slave connect failed, rolling back");
                    self.disconnect_all();
                    return Err(SyncError::Connect {
                        name: spec.name.clone(),
                        source,
                    });
                }
            };

            let delay = match probe(self.link.as_ref(), handle) {
                Ok(delay) => delay,
                Err(source) => {
                    warn!(slave = %spec.name, error = %source, "slave probe failed, rolling back");
                    if let Err(e) = self.link.disconnect(handle) {
                        warn!(slave = %spec.name, error = %e, "rollback disconnect failed");
                    }
                    self.disconnect_all();
                    return Err(SyncError::Probe {
                        name: spec.name.clone(),
                        source,
                    });
                }
            };

            info!(
                slave = %spec.name,
                delay_us = delay.as_micros() as u64,
                "slave registered"
            );

            self.roster.push(SlaveRemote {
                name: spec.name.clone(),
                addr: spec.addr,
                handle,
                delay,
            });
        }

        Ok(())
    }

    /// Disconnect every registered receiver (best-effort) and clear the
    /// roster.
    pub fn disconnect_all(&mut self) {
        for slave in self.roster.clear() {
            debug!(slave = %slave.name, "disconnecting slave");
            if let Err(e) = self.link.disconnect(slave.handle) {
                warn!(slave = %slave.name, error = %e, "slave disconnect failed");
            }
        }
    }

    /// Dispatch the staggered start schedule and block until the local
    /// portion of the countdown elapses.
    ///
    /// Dispatch is strictly sequential and in roster order: the
    /// compensation arithmetic depends on measuring each dispatch's own
    /// round-trip against the shared countdown. A failed start call is
    /// logged and tolerated.
    pub fn schedule_start(&self) -> StartReport {
        let mut countdown =
            self.roster.max_delay().as_micros() as i64 * self.roster.len() as i64;
        debug!(countdown_us = countdown, "start schedule begins");

        let mut dispatched = Vec::with_capacity(self.roster.len());
        let mut failed = Vec::new();

        for slave in self.roster.iter() {
            let this_delay = (countdown - slave.delay.as_micros() as i64 / 2).max(0);
            let sent = Timestamp::now();
            match self
                .link
                .start(slave.handle, Duration::from_micros(this_delay as u64))
            {
                Ok(()) => {
                    dispatched.push(DispatchedStart {
                        name: slave.name.clone(),
                        delay: Duration::from_micros(this_delay as u64),
                    });
                }
                Err(e) => {
                    warn!(slave = %slave.name, error = %e, "start dispatch failed, continuing");
                    failed.push(slave.name.clone());
                }
            }
            // The dispatch round-trip consumed part of the shared budget.
            countdown -= sent.elapsed().as_micros() as i64;
        }

        let local_wait = Duration::from_micros(countdown.max(0) as u64);
        debug!(local_wait_us = local_wait.as_micros() as u64, "waiting out local countdown");
        thread::sleep(local_wait);

        StartReport {
            dispatched,
            failed,
            local_wait,
        }
    }

    /// Tell every receiver to discard its buffered stream data, in
    /// lock-step with the master's own buffer reset on seek.
    pub fn broadcast_buffer_reset(&self) -> Vec<String> {
        self.fan_out("buffer reset", |link, slave| link.buffer_reset(slave.handle))
    }

    /// Forward a stream data chunk to every receiver.
    pub fn send_data_all(&self, chunk: &[u8], last: bool) -> Vec<String> {
        self.fan_out("data", |link, slave| link.send_data(slave.handle, chunk, last))
    }

    pub fn set_volume_all(&self, volume: u8) -> Vec<String> {
        self.fan_out("volume", |link, slave| link.set_volume(slave.handle, volume))
    }

    pub fn pause_all(&self) -> Vec<String> {
        self.fan_out("pause", |link, slave| link.pause(slave.handle))
    }

    pub fn resume_all(&self) -> Vec<String> {
        self.fan_out("resume", |link, slave| link.resume(slave.handle))
    }

    pub fn seek_all(&self, offset: u64) -> Vec<String> {
        self.fan_out("seek", |link, slave| link.seek_to(slave.handle, offset))
    }

    pub fn track_change_all(&self) -> Vec<String> {
        self.fan_out("track change", |link, slave| link.track_change(slave.handle))
    }

    /// Best-effort per-receiver fan-out; returns the names that failed.
    fn fan_out<F>(&self, what: &str, op: F) -> Vec<String>
    where
        F: Fn(&dyn RemoteLink, &SlaveRemote) -> Result<(), LinkError>,
    {
        let mut failed = Vec::new();
        for slave in self.roster.iter() {
            if let Err(e) = op(self.link.as_ref(), slave) {
                warn!(slave = %slave.name, error = %e, what, "fan-out call failed");
                failed.push(slave.name.clone());
            }
        }
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LinkHandle;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Connect(SocketAddr),
        Disconnect(LinkHandle),
        ConnectMaster(LinkHandle),
        Start(LinkHandle, Duration),
        BufferReset(LinkHandle),
    }

    /// Scriptable link: per-address probe latency, optional failure
    /// injection, full call log.
    #[derive(Default)]
    struct MockLink {
        next_handle: AtomicU32,
        calls: Mutex<Vec<Call>>,
        probe_latency: Mutex<HashMap<LinkHandle, Duration>>,
        latency_by_order: Mutex<Vec<Duration>>,
        fail_connect_to: Mutex<Option<SocketAddr>>,
        fail_start_on: Mutex<Option<LinkHandle>>,
        dispatch_latency: Mutex<Duration>,
    }

    impl MockLink {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }
    }

    impl RemoteLink for MockLink {
        fn connect(&self, addr: SocketAddr) -> Result<LinkHandle, LinkError> {
            self.calls.lock().push(Call::Connect(addr));
            if *self.fail_connect_to.lock() == Some(addr) {
                return Err(LinkError::Connect {
                    addr,
                    reason: "connection refused".to_string(),
                });
            }
            let handle = self.next_handle.fetch_add(1, Ordering::SeqCst) + 1;
            let mut by_order = self.latency_by_order.lock();
            if !by_order.is_empty() {
                let latency = by_order.remove(0);
                self.probe_latency.lock().insert(handle, latency);
            }
            Ok(handle)
        }

        fn disconnect(&self, handle: LinkHandle) -> Result<(), LinkError> {
            self.calls.lock().push(Call::Disconnect(handle));
            Ok(())
        }

        fn connect_master(&self, handle: LinkHandle, _micros: i64) -> Result<i64, LinkError> {
            self.calls.lock().push(Call::ConnectMaster(handle));
            if let Some(latency) = self.probe_latency.lock().get(&handle) {
                thread::sleep(*latency);
            }
            Ok(1)
        }

        fn start(&self, handle: LinkHandle, delay: Duration) -> Result<(), LinkError> {
            self.calls.lock().push(Call::Start(handle, delay));
            thread::sleep(*self.dispatch_latency.lock());
            if *self.fail_start_on.lock() == Some(handle) {
                return Err(LinkError::Timeout);
            }
            Ok(())
        }

        fn buffer_reset(&self, handle: LinkHandle) -> Result<(), LinkError> {
            self.calls.lock().push(Call::BufferReset(handle));
            Ok(())
        }

        fn send_data(&self, _: LinkHandle, _: &[u8], _: bool) -> Result<(), LinkError> {
            Ok(())
        }
        fn set_volume(&self, _: LinkHandle, _: u8) -> Result<(), LinkError> {
            Ok(())
        }
        fn pause(&self, _: LinkHandle) -> Result<(), LinkError> {
            Ok(())
        }
        fn resume(&self, _: LinkHandle) -> Result<(), LinkError> {
            Ok(())
        }
        fn seek_to(&self, _: LinkHandle, _: u64) -> Result<(), LinkError> {
            Ok(())
        }
        fn track_change(&self, _: LinkHandle) -> Result<(), LinkError> {
            Ok(())
        }
    }

    fn specs(names: &[&str]) -> Vec<SlaveSpec> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| SlaveSpec {
                name: name.to_string(),
                addr: format!("127.0.0.1:{}", 4004 + i).parse().unwrap(),
            })
            .collect()
    }

    #[test]
    fn test_add_slaves_registers_and_probes() {
        let link = Arc::new(MockLink::default());
        let mut coord = StartCoordinator::new(link.clone());

        coord.add_slaves(&specs(&["a", "b"])).unwrap();
        assert_eq!(coord.slave_count(), 2);

        let calls = link.calls();
        assert!(calls.contains(&Call::ConnectMaster(1)));
        assert!(calls.contains(&Call::ConnectMaster(2)));
    }

    #[test]
    fn test_roster_rollback_on_connect_failure() {
        let link = Arc::new(MockLink::default());
        let bad_addr: SocketAddr = "127.0.0.1:4005".parse().unwrap();
        *link.fail_connect_to.lock() = Some(bad_addr);

        let mut coord = StartCoordinator::new(link.clone());
        let result = coord.add_slaves(&specs(&["one", "two", "three"]));

        assert!(matches!(result, Err(SyncError::Connect { ref name, .. }) if name == "two"));
        // Slave one was connected (handle 1) and must have been rolled
        // back; the roster ends up empty, not partially populated.
        assert_eq!(coord.slave_count(), 0);
        assert!(link.calls().contains(&Call::Disconnect(1)));
    }

    #[test]
    fn test_add_slaves_replaces_previous_roster() {
        let link = Arc::new(MockLink::default());
        let mut coord = StartCoordinator::new(link.clone());

        coord.add_slaves(&specs(&["a"])).unwrap();
        coord.add_slaves(&specs(&["b", "c"])).unwrap();

        assert_eq!(coord.slave_count(), 2);
        // The first roster's connection (handle 1) was torn down.
        assert!(link.calls().contains(&Call::Disconnect(1)));
    }

    #[test]
    fn test_schedule_start_compensates_dispatch_time() {
        let link = Arc::new(MockLink::default());
        // Probe latencies 20 ms, 60 ms, 100 ms -> max_delay 100 ms.
        *link.latency_by_order.lock() = vec![
            Duration::from_millis(20),
            Duration::from_millis(60),
            Duration::from_millis(100),
        ];
        *link.dispatch_latency.lock() = Duration::from_millis(10);

        let mut coord = StartCoordinator::new(link.clone());
        coord.add_slaves(&specs(&["fast", "mid", "slow"])).unwrap();

        let countdown_initial = coord.roster().max_delay() * 3;
        let begun = Timestamp::now();
        let report = coord.schedule_start();
        let total = begun.elapsed();

        assert_eq!(report.dispatched.len(), 3);
        assert!(report.failed.is_empty());

        // Delays strictly decrease as dispatch consumes the budget.
        for pair in report.dispatched.windows(2) {
            assert!(pair[0].delay > pair[1].delay);
        }

        // Dispatch elapsed plus the final local wait converges on the
        // initial countdown, modulo scheduling jitter.
        assert!(total >= countdown_initial - Duration::from_millis(5));
        assert!(total < countdown_initial + Duration::from_millis(100));
    }

    #[test]
    fn test_schedule_start_tolerates_per_slave_failure() {
        let link = Arc::new(MockLink::default());
        *link.latency_by_order.lock() =
            vec![Duration::from_millis(5), Duration::from_millis(5)];
        *link.fail_start_on.lock() = Some(1);

        let mut coord = StartCoordinator::new(link.clone());
        coord.add_slaves(&specs(&["bad", "good"])).unwrap();

        let report = coord.schedule_start();
        assert_eq!(report.failed, vec!["bad".to_string()]);
        assert_eq!(report.dispatched.len(), 1);
        assert_eq!(report.dispatched[0].name, "good");
        // The failed dispatch did not keep the good one from happening.
        assert!(link.calls().iter().any(|c| matches!(c, Call::Start(2, _))));
    }

    #[test]
    fn test_broadcast_buffer_reset_reaches_all() {
        let link = Arc::new(MockLink::default());
        let mut coord = StartCoordinator::new(link.clone());
        coord.add_slaves(&specs(&["a", "b"])).unwrap();

        let failed = coord.broadcast_buffer_reset();
        assert!(failed.is_empty());

        let resets: Vec<_> = link
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::BufferReset(_)))
            .collect();
        assert_eq!(resets.len(), 2);
    }

    #[test]
    fn test_schedule_start_empty_roster_is_immediate() {
        let link = Arc::new(MockLink::default());
        let coord = StartCoordinator::new(link);

        let begun = Timestamp::now();
        let report = coord.schedule_start();
        assert!(report.dispatched.is_empty());
        assert_eq!(report.local_wait, Duration::ZERO);
        assert!(begun.elapsed() < Duration::from_millis(20));
    }
}
