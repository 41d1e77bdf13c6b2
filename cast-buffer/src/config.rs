//! Stream buffer configuration

use std::time::Duration;

/// Default refill block size: one demand-data request asks the producer
/// for roughly this many bytes.
pub const DEFAULT_BLOCK_SIZE: usize = 200 * 1024;

/// Default bound on how long a read blocks waiting for demanded data.
pub const DEFAULT_DATA_WAIT: Duration = Duration::from_millis(150);

/// Default bound on how long a seek waits for the satisfying write.
pub const DEFAULT_SEEK_TIMEOUT: Duration = Duration::from_secs(1);

/// Startup configuration for a [`StreamBuffer`](crate::StreamBuffer)
///
/// All values are fixed at construction; the buffer owns no persisted
/// state.
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Total ring capacity in bytes
    pub capacity: usize,
    /// Refill threshold: a demand-data signal fires once free space
    /// exceeds this many bytes
    pub block_size: usize,
    /// Buffering-ahead policy: proactively request data when free space
    /// allows, rather than only on underrun
    pub read_ahead: bool,
    /// Upper bound on a read's wait for demanded data
    pub data_wait: Duration,
    /// Upper bound on a seek's wait for the satisfying write
    pub seek_timeout: Duration,
}

impl BufferConfig {
    /// Configuration with the given capacity and default policy values.
    pub fn with_capacity(capacity: usize) -> Self {
        BufferConfig {
            capacity,
            block_size: DEFAULT_BLOCK_SIZE,
            read_ahead: true,
            data_wait: DEFAULT_DATA_WAIT,
            seek_timeout: DEFAULT_SEEK_TIMEOUT,
        }
    }
}
