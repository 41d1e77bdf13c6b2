//! Castsync I/O layer
//!
//! Blocking, frame-oriented TCP sockets for the castsync control/data
//! protocol, plus the microsecond time utilities the synchronization
//! coordinator builds on.

pub mod socket;
pub mod time;

pub use socket::{LinkListener, LinkSocket, SocketError};
pub use time::{epoch_micros, Timestamp};
