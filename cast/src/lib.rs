//! Castsync Node
//!
//! Ties the wire protocol, stream buffer, and synchronization core into a
//! runnable node: the TCP-backed remote link a master drives slaves with,
//! the inbound RPC server a receiver node runs, and the playback session
//! that binds buffer, role state, and the playback collaborator together.

pub mod link;
pub mod server;
pub mod session;

pub use link::{TcpRemoteLink, DEFAULT_CALL_TIMEOUT};
pub use server::{NodeServer, ServerHandle, DEFAULT_SERVE_TIMEOUT};
pub use session::{DemandRequest, PlaybackSession, Player, SessionError};
