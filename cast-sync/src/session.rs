//! Session role state machine
//!
//! A node is Standalone, Master, or Slave, and the roles are mutually
//! exclusive: a node already serving one role (or playing locally) must
//! refuse to be claimed for another. Transitions go through
//! [`SessionState`]; the checks and the flip happen under one lock so two
//! masters racing to claim the same node cannot both win.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::info;

/// Playback role of this node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Plays locally, not part of any group
    Standalone,
    /// Coordinates a group of slave receivers
    Master,
    /// Claimed by a remote master
    Slave,
}

/// Mode transition errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ModeError {
    #[error("node is already {0:?}")]
    AlreadyClaimed(SessionMode),

    #[error("local playback is active")]
    PlaybackActive,
}

/// Shared session role plus the local playback-active flag
#[derive(Debug)]
pub struct SessionState {
    mode: RwLock<SessionMode>,
    playback_active: AtomicBool,
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState {
            mode: RwLock::new(SessionMode::Standalone),
            playback_active: AtomicBool::new(false),
        }
    }
}

impl SessionState {
    pub fn new() -> Self {
        SessionState::default()
    }

    pub fn mode(&self) -> SessionMode {
        *self.mode.read()
    }

    pub fn is_playback_active(&self) -> bool {
        self.playback_active.load(Ordering::Acquire)
    }

    pub fn set_playback_active(&self, active: bool) {
        self.playback_active.store(active, Ordering::Release);
    }

    /// Accept a remote master's claim. Refused while local playback runs
    /// or while the node serves another role.
    pub fn become_slave(&self) -> Result<(), ModeError> {
        let mut mode = self.mode.write();
        if *mode != SessionMode::Standalone {
            return Err(ModeError::AlreadyClaimed(*mode));
        }
        if self.is_playback_active() {
            return Err(ModeError::PlaybackActive);
        }
        *mode = SessionMode::Slave;
        info!("session mode: slave");
        Ok(())
    }

    /// Take the master role. Only reachable from Standalone.
    pub fn become_master(&self) -> Result<(), ModeError> {
        let mut mode = self.mode.write();
        if *mode != SessionMode::Standalone {
            return Err(ModeError::AlreadyClaimed(*mode));
        }
        *mode = SessionMode::Master;
        info!("session mode: master");
        Ok(())
    }

    /// Drop back to Standalone. Always permitted; session teardown must
    /// not be refusable.
    pub fn to_standalone(&self) {
        let mut mode = self.mode.write();
        if *mode != SessionMode::Standalone {
            info!(from = ?*mode, "session mode: standalone");
        }
        *mode = SessionMode::Standalone;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_standalone() {
        let state = SessionState::new();
        assert_eq!(state.mode(), SessionMode::Standalone);
        assert!(!state.is_playback_active());
    }

    #[test]
    fn test_roles_are_exclusive() {
        let state = SessionState::new();
        state.become_slave().unwrap();

        assert_eq!(
            state.become_master(),
            Err(ModeError::AlreadyClaimed(SessionMode::Slave))
        );
        // A second master claiming an already-claimed slave loses too.
        assert_eq!(
            state.become_slave(),
            Err(ModeError::AlreadyClaimed(SessionMode::Slave))
        );
    }

    #[test]
    fn test_active_playback_refuses_slave_claim() {
        let state = SessionState::new();
        state.set_playback_active(true);

        assert_eq!(state.become_slave(), Err(ModeError::PlaybackActive));
        assert_eq!(state.mode(), SessionMode::Standalone);

        // A master can still start a group from a playing node.
        state.become_master().unwrap();
    }

    #[test]
    fn test_standalone_reset_reopens_claims() {
        let state = SessionState::new();
        state.become_master().unwrap();
        state.to_standalone();

        state.become_slave().unwrap();
        assert_eq!(state.mode(), SessionMode::Slave);
    }
}
