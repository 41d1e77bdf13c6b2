//! RemoteLink trait: the RPC seam between coordinator and transport
//!
//! The coordinator drives slave receivers exclusively through this trait.
//! Every method is synchronous and blocking; implementations must bound
//! each call with a transport timeout so a hung remote can never park a
//! coordinator thread indefinitely.

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Opaque handle to one connected remote receiver
pub type LinkHandle = u32;

/// Link errors
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("failed to connect to {addr}: {reason}")]
    Connect { addr: SocketAddr, reason: String },

    #[error("unknown link handle: {0}")]
    UnknownHandle(LinkHandle),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("call timed out")]
    Timeout,

    #[error("remote rejected the request (status {0})")]
    Rejected(u8),
}

/// RPC channel to slave receivers
///
/// `connect` yields a handle used by all subsequent calls; handles stay
/// valid until `disconnect`. The remaining methods map one-to-one onto the
/// inbound RPC surface a receiver node serves.
pub trait RemoteLink: Send + Sync {
    fn connect(&self, addr: SocketAddr) -> Result<LinkHandle, LinkError>;

    fn disconnect(&self, handle: LinkHandle) -> Result<(), LinkError>;

    /// Claim the remote as a slave. Sends the local wall clock in epoch
    /// microseconds; returns the remote's, or zero when the remote
    /// refused (its playback is already active).
    fn connect_master(&self, handle: LinkHandle, epoch_micros: i64) -> Result<i64, LinkError>;

    /// Tell the remote to begin playback after `delay`.
    fn start(&self, handle: LinkHandle, delay: Duration) -> Result<(), LinkError>;

    /// Tell the remote to discard its buffered stream data.
    fn buffer_reset(&self, handle: LinkHandle) -> Result<(), LinkError>;

    /// Forward a chunk of stream data; `last` marks end of stream.
    fn send_data(&self, handle: LinkHandle, chunk: &[u8], last: bool) -> Result<(), LinkError>;

    fn set_volume(&self, handle: LinkHandle, volume: u8) -> Result<(), LinkError>;

    fn pause(&self, handle: LinkHandle) -> Result<(), LinkError>;

    fn resume(&self, handle: LinkHandle) -> Result<(), LinkError>;

    /// Forward a seek to an absolute byte offset.
    fn seek_to(&self, handle: LinkHandle, offset: u64) -> Result<(), LinkError>;

    /// Announce a track change; the remote discards buffered data and
    /// awaits the new stream.
    fn track_change(&self, handle: LinkHandle) -> Result<(), LinkError>;
}
