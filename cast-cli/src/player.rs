//! Logging playback collaborator
//!
//! Stand-in for a real decode/render pipeline: records the playback state
//! and logs every transition. Useful for running nodes headless and for
//! exercising the synchronization path end to end.

use cast::Player;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Player that logs transitions and tracks state
#[derive(Debug, Default)]
pub struct LogPlayer {
    active: AtomicBool,
    paused: AtomicBool,
    volume: AtomicU32,
}

impl LogPlayer {
    pub fn new() -> Self {
        LogPlayer::default()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn volume(&self) -> u8 {
        self.volume.load(Ordering::Acquire) as u8
    }
}

impl Player for LogPlayer {
    fn begin(&self) {
        self.active.store(true, Ordering::Release);
        self.paused.store(false, Ordering::Release);
        tracing::info!("playback begun");
    }

    fn stop(&self) {
        self.active.store(false, Ordering::Release);
        tracing::info!("playback stopped");
    }

    fn set_volume(&self, volume: u8) {
        self.volume.store(volume as u32, Ordering::Release);
        tracing::info!(volume, "volume set");
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::Release);
        tracing::info!("playback paused");
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        tracing::info!("playback resumed");
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}
