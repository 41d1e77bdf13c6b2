//! Castsync Synchronization Core
//!
//! Master/slave playback synchronization: per-receiver latency probing,
//! roster bookkeeping, the staggered latency-compensated start scheduler,
//! and the session role state machine.

pub mod coordinator;
pub mod link;
pub mod probe;
pub mod roster;
pub mod session;

pub use coordinator::{StartCoordinator, StartReport, SyncError};
pub use link::{LinkError, LinkHandle, RemoteLink};
pub use probe::{probe, ProbeError};
pub use roster::{SlaveRemote, SlaveRoster, SlaveSpec};
pub use session::{ModeError, SessionMode, SessionState};
