//! Shared helpers for castsync integration tests

use cast::Player;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

/// Player that records when playback began, for start-time assertions.
#[derive(Default)]
pub struct RecordingPlayer {
    active: AtomicBool,
    paused: AtomicBool,
    volume: AtomicU32,
    begun_at: Mutex<Option<Instant>>,
}

impl RecordingPlayer {
    pub fn new() -> Self {
        RecordingPlayer::default()
    }

    pub fn begun_at(&self) -> Option<Instant> {
        *self.begun_at.lock()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn volume(&self) -> u8 {
        self.volume.load(Ordering::Acquire) as u8
    }
}

impl Player for RecordingPlayer {
    fn begin(&self) {
        self.active.store(true, Ordering::Release);
        self.begun_at.lock().get_or_insert_with(Instant::now);
    }

    fn stop(&self) {
        self.active.store(false, Ordering::Release);
    }

    fn set_volume(&self, volume: u8) {
        self.volume.store(volume as u32, Ordering::Release);
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::Release);
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}
