//! Castsync Stream Buffer
//!
//! This crate implements the per-session ring buffer that decouples a
//! push-based, chunked network data source from the pull-based, seekable
//! byte consumer feeding a decoder: bounded blocking reads, demand-driven
//! backpressure, and a two-phase seek-through-the-network protocol.

pub mod buffer;
pub mod config;

pub use buffer::{BufferError, BufferState, SeekOrigin, SessionHandle, StreamBuffer};
pub use config::BufferConfig;
