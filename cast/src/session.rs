//! Playback session glue
//!
//! Binds the stream buffer, the session role state machine, the playback
//! collaborator, and the master coordinator into one node-local session.
//! The buffer's demand-data callback is surfaced here as a crossbeam
//! channel so the transport side can pull chunk requests off a plain
//! receiver instead of running inside the buffer's callback.

use cast_buffer::{BufferConfig, BufferError, SeekOrigin, SessionHandle, StreamBuffer};
use cast_sync::{
    ModeError, RemoteLink, SessionMode, SessionState, SlaveSpec, StartCoordinator, StartReport,
    SyncError,
};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Session errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("mode error: {0}")]
    Mode(#[from] ModeError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("buffer error: {0}")]
    Buffer(#[from] BufferError),
}

/// Playback collaborator: the decode/render side of a node.
///
/// Decoding and rendering live outside this crate; the session only
/// starts, stops, and steers whatever implementation it is given.
pub trait Player: Send + Sync {
    fn begin(&self);
    fn stop(&self);
    fn set_volume(&self, volume: u8);
    fn pause(&self);
    fn resume(&self);
    fn is_active(&self) -> bool;
}

/// One buffer refill request, emitted when free space crosses the
/// refill threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemandRequest {
    pub session: SessionHandle,
    pub requested: usize,
}

/// Node-local playback session
///
/// Owns its stream buffer outright; nothing here is process-global, so a
/// node can run several sessions side by side (or a test several nodes in
/// one process).
pub struct PlaybackSession {
    buffer: Arc<StreamBuffer>,
    state: Arc<SessionState>,
    player: Arc<dyn Player>,
    coordinator: Mutex<StartCoordinator>,
    demand_rx: Receiver<DemandRequest>,
}

impl PlaybackSession {
    pub fn new(
        cfg: BufferConfig,
        player: Arc<dyn Player>,
        link: Arc<dyn RemoteLink>,
    ) -> Self {
        let buffer = Arc::new(StreamBuffer::new(cfg));

        let (demand_tx, demand_rx): (Sender<DemandRequest>, Receiver<DemandRequest>) =
            channel::unbounded();
        buffer.set_demand_data(move |session, requested| {
            // A full channel cannot happen (unbounded); a disconnected
            // one means the consumer is gone and the signal is moot.
            let _ = demand_tx.send(DemandRequest { session, requested });
        });

        PlaybackSession {
            buffer,
            state: Arc::new(SessionState::new()),
            player,
            coordinator: Mutex::new(StartCoordinator::new(link)),
            demand_rx,
        }
    }

    pub fn buffer(&self) -> &Arc<StreamBuffer> {
        &self.buffer
    }

    pub fn state(&self) -> &Arc<SessionState> {
        &self.state
    }

    pub fn player(&self) -> &Arc<dyn Player> {
        &self.player
    }

    /// Receiver for buffer refill requests.
    pub fn demand_requests(&self) -> Receiver<DemandRequest> {
        self.demand_rx.clone()
    }

    // ---- slave-side inbound surface -------------------------------------

    /// A remote master claims this node. Returns the local wall clock in
    /// epoch microseconds, or zero for refusal.
    pub fn on_connect_master(&self, master_micros: i64) -> i64 {
        match self.state.become_slave() {
            Ok(()) => {
                debug!(master_micros, "claimed as slave");
                cast_io::epoch_micros()
            }
            Err(e) => {
                info!(error = %e, "refused master claim");
                0
            }
        }
    }

    /// Start playback after `delay`. The caller acks before waiting; the
    /// wait itself belongs to the server's one-shot timer thread.
    pub fn on_start(&self, delay: Duration) {
        info!(delay_us = delay.as_micros() as u64, "playback start scheduled");
    }

    /// Begin playback now. Invoked by the server's timer thread once the
    /// start delay has elapsed, and directly for standalone playback.
    pub fn begin_playback(&self) {
        self.state.set_playback_active(true);
        self.player.begin();
    }

    /// Accept one stream chunk from the master.
    pub fn on_receive_data(&self, chunk: &[u8], last: bool) -> usize {
        let written = self.buffer.write(chunk);
        if last {
            self.buffer.set_eof(true);
        }
        written
    }

    /// Discard buffered stream data (master seeked).
    pub fn on_buffer_reset(&self) {
        self.buffer.reset();
    }

    /// The master seeked to `offset`; local buffered data is stale. The
    /// master streams from the new position next, so a reset suffices.
    pub fn on_seek_to(&self, offset: u64) {
        debug!(offset, "master seek, dropping buffered data");
        self.buffer.reset();
    }

    /// The master moved to the next track; everything buffered belongs
    /// to the previous one.
    pub fn on_track_change(&self) {
        debug!("track change, dropping buffered data");
        self.buffer.reset();
    }

    /// The master is gone; stop and return to standalone.
    pub fn on_master_disconnect(&self) {
        if self.state.mode() == SessionMode::Slave {
            info!("master disconnected, returning to standalone");
            self.player.stop();
            self.state.set_playback_active(false);
            self.state.to_standalone();
        }
    }

    // ---- master-side surface --------------------------------------------

    /// Register receivers and take the master role. Fail-fast: a partial
    /// roster is rolled back and the node stays (or returns to) its prior
    /// mode.
    pub fn add_slaves(&self, specs: &[SlaveSpec]) -> Result<(), SessionError> {
        if self.state.mode() != SessionMode::Master {
            self.state.become_master()?;
        }

        let mut coordinator = self.coordinator.lock();
        if let Err(e) = coordinator.add_slaves(specs) {
            self.state.to_standalone();
            return Err(e.into());
        }

        info!(slaves = coordinator.slave_count(), "master session formed");
        Ok(())
    }

    /// Dispatch the synchronized start and begin local playback once the
    /// compensated countdown elapses.
    pub fn start_playback(&self) -> StartReport {
        let report = self.coordinator.lock().schedule_start();
        if !report.failed.is_empty() {
            warn!(failed = ?report.failed, "some receivers missed the start");
        }
        self.begin_playback();
        report
    }

    /// Write a chunk locally and fan it out to every receiver.
    pub fn forward_chunk(&self, chunk: &[u8], last: bool) -> usize {
        let written = self.buffer.write(chunk);
        if last {
            self.buffer.set_eof(true);
        }
        let failed = self.coordinator.lock().send_data_all(chunk, last);
        if !failed.is_empty() {
            warn!(failed = ?failed, "chunk fan-out incomplete");
        }
        written
    }

    /// Seek the local buffer and reset every receiver's.
    pub fn seek(&self, origin: SeekOrigin, offset: i64) -> Result<u64, SessionError> {
        let coordinator = self.coordinator.lock();
        coordinator.broadcast_buffer_reset();
        let target = self.buffer.seek(origin, offset)?;
        coordinator.seek_all(target);
        Ok(target)
    }

    pub fn set_volume(&self, volume: u8) {
        self.player.set_volume(volume);
        self.coordinator.lock().set_volume_all(volume);
    }

    pub fn pause(&self) {
        self.player.pause();
        self.coordinator.lock().pause_all();
    }

    pub fn resume(&self) {
        self.player.resume();
        self.coordinator.lock().resume_all();
    }

    /// Switch to the next track: flush the local buffer and announce the
    /// change to every receiver before streaming the new content.
    pub fn track_change(&self) {
        self.buffer.reset();
        let failed = self.coordinator.lock().track_change_all();
        if !failed.is_empty() {
            warn!(failed = ?failed, "track change fan-out incomplete");
        }
    }

    /// Tear the session down: stop playback, disconnect any receivers,
    /// return to standalone.
    pub fn end_session(&self) {
        self.player.stop();
        self.state.set_playback_active(false);
        self.coordinator.lock().disconnect_all();
        self.state.to_standalone();
        info!("session ended");
    }
}
