//! Castsync Wire Protocol
//!
//! This crate implements the framed control/data protocol spoken between a
//! master node and its slave receivers: method identifiers, request and
//! reply frames, and their serialization.

pub mod frame;

pub use frame::{
    DecodeError, Frame, FrameHeader, Method, Reply, Request, FRAME_HEADER_SIZE, MAX_CHUNK_SIZE,
    STATUS_ERROR, STATUS_OK,
};
