//! One-shot latency probe
//!
//! Measures the approximate round-trip delay to one receiver via a single
//! timestamp exchange: the connect-master call carries the local wall
//! clock, and the elapsed monotonic time around the call is taken as the
//! delay. This deliberately does not correct for clock skew between the
//! nodes; the scheduler only ever uses the round-trip value.

use crate::link::{LinkError, LinkHandle, RemoteLink};
use cast_io::{epoch_micros, Timestamp};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Probe errors
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("link error: {0}")]
    Link(#[from] LinkError),

    #[error("remote refused slave mode (local playback active)")]
    Refused,
}

/// Probe the round-trip delay to one receiver.
///
/// As a side effect the remote switches into slave mode; a zero timestamp
/// reply means it refused.
pub fn probe(link: &dyn RemoteLink, handle: LinkHandle) -> Result<Duration, ProbeError> {
    let t0 = Timestamp::now();
    let theirs = link.connect_master(handle, epoch_micros())?;
    let round_trip = t0.elapsed();

    if theirs == 0 {
        return Err(ProbeError::Refused);
    }

    debug!(
        handle,
        round_trip_us = round_trip.as_micros() as u64,
        "latency probe complete"
    );

    Ok(round_trip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::net::SocketAddr;
    use std::thread;

    /// Link stub whose connect-master call sleeps to simulate latency.
    struct StubLink {
        latency: Duration,
        reply: i64,
        calls: Mutex<Vec<LinkHandle>>,
    }

    impl RemoteLink for StubLink {
        fn connect(&self, _addr: SocketAddr) -> Result<LinkHandle, LinkError> {
            Ok(1)
        }
        fn disconnect(&self, _handle: LinkHandle) -> Result<(), LinkError> {
            Ok(())
        }
        fn connect_master(&self, handle: LinkHandle, _micros: i64) -> Result<i64, LinkError> {
            self.calls.lock().push(handle);
            thread::sleep(self.latency);
            Ok(self.reply)
        }
        fn start(&self, _: LinkHandle, _: Duration) -> Result<(), LinkError> {
            Ok(())
        }
        fn buffer_reset(&self, _: LinkHandle) -> Result<(), LinkError> {
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

    #[test]
    fn test_probe_measures_round_trip() {
        let link = StubLink {
            latency: Duration::from_millis(30),
            reply: 1_000_000,
            calls: Mutex::new(Vec::new()),
        };

        let delay = probe(&link, 5).unwrap();
        assert!(delay >= Duration::from_millis(30));
        assert!(delay < Duration::from_millis(300));
        assert_eq!(link.calls.lock().as_slice(), &[5]);
    }

    #[test]
    fn test_probe_zero_reply_is_refusal() {
        let link = StubLink {
            latency: Duration::ZERO,
            reply: 0,
            calls: Mutex::new(Vec::new()),
        };

        assert!(matches!(probe(&link, 1), Err(ProbeError::Refused)));
    }
}
