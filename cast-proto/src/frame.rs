//! Frame Structures and Serialization
//!
//! Every message on a castsync link is a frame: a 6-byte header (32-bit
//! payload length, flags byte, method byte) followed by the method-specific
//! payload. Requests and replies share method identifiers and are
//! distinguished by the reply bit in the flags byte.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Size of the frame header in bytes (u32 length + flags + method)
pub const FRAME_HEADER_SIZE: usize = 6;

/// Maximum payload carried by a single data frame.
///
/// Masters size chunks to the receiver's refill block (200 KiB by default),
/// so anything beyond this bound indicates a corrupt or hostile peer.
pub const MAX_CHUNK_SIZE: usize = 512 * 1024;

/// Reply flag (bit 0 of the flags byte)
const REPLY_FLAG: u8 = 0x01;

/// Mask of flag bits a conforming peer may set
const KNOWN_FLAGS: u8 = REPLY_FLAG;

/// Status byte for a successful operation
pub const STATUS_OK: u8 = 0;

/// Status byte for a rejected or failed operation
pub const STATUS_ERROR: u8 = 1;

/// Frame decoding errors
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("unknown method id: {0}")]
    UnknownMethod(u8),

    #[error("unknown flag bits: {0:#04x}")]
    UnknownFlags(u8),

    #[error("truncated frame: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("payload of {0} bytes exceeds the frame limit")]
    PayloadTooLarge(usize),

    #[error("trailing bytes after {method:?} payload")]
    TrailingBytes { method: Method },
}

/// Protocol methods
///
/// `ConnectMaster`, `Start`, `BufferReset` and `ReceiveData` form the
/// synchronization surface; the remaining methods fan playback control out
/// from the master to its slaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Method {
    /// Master claims this node as a slave; carries the master's clock
    ConnectMaster = 0,
    /// Begin playback after the carried delay
    Start = 1,
    /// Discard all buffered stream data
    BufferReset = 2,
    /// Stream data chunk
    ReceiveData = 3,
    /// Set playback volume
    SetVolume = 4,
    /// Pause playback
    Pause = 5,
    /// Resume paused playback
    Resume = 6,
    /// Jump to an absolute byte offset in the stream
    SeekTo = 7,
    /// Session teardown
    Disconnect = 8,
    /// Switch to the next track; buffered data becomes stale
    TrackChange = 9,
}

impl Method {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Method::ConnectMaster),
            1 => Some(Method::Start),
            2 => Some(Method::BufferReset),
            3 => Some(Method::ReceiveData),
            4 => Some(Method::SetVolume),
            5 => Some(Method::Pause),
            6 => Some(Method::Resume),
            7 => Some(Method::SeekTo),
            8 => Some(Method::Disconnect),
            9 => Some(Method::TrackChange),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Request frames (master → slave)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Claim the receiving node as a slave. Carries the master's wall clock
    /// in epoch microseconds; the reply carries the slave's, or zero when
    /// the node refuses (local playback already active).
    ConnectMaster { timestamp_micros: i64 },
    /// Begin playback `delay_micros` after receipt.
    Start { delay_micros: i64 },
    /// Discard buffered stream data before resumed data flow.
    BufferReset,
    /// A chunk of stream data; `last` marks end of stream.
    ReceiveData { chunk: Bytes, last: bool },
    SetVolume { volume: u8 },
    Pause,
    Resume,
    SeekTo { offset: u64 },
    Disconnect,
    /// The master moved to the next track; discard buffered data and
    /// await the new stream.
    TrackChange,
}

impl Request {
    pub fn method(&self) -> Method {
        match self {
            Request::ConnectMaster { .. } => Method::ConnectMaster,
            Request::Start { .. } => Method::Start,
            Request::BufferReset => Method::BufferReset,
            Request::ReceiveData { .. } => Method::ReceiveData,
            Request::SetVolume { .. } => Method::SetVolume,
            Request::Pause => Method::Pause,
            Request::Resume => Method::Resume,
            Request::SeekTo { .. } => Method::SeekTo,
            Request::Disconnect => Method::Disconnect,
            Request::TrackChange => Method::TrackChange,
        }
    }
}

/// Reply frames (slave → master)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Reply to `ConnectMaster`: the slave's epoch microseconds, or zero
    /// when slave mode was refused.
    Timestamp { timestamp_micros: i64 },
    /// Status reply for every other method.
    Ack { method: Method, status: u8 },
}

impl Reply {
    pub fn method(&self) -> Method {
        match self {
            Reply::Timestamp { .. } => Method::ConnectMaster,
            Reply::Ack { method, .. } => *method,
        }
    }

    /// Convenience constructor for a successful ack
    pub fn ok(method: Method) -> Self {
        Reply::Ack {
            method,
            status: STATUS_OK,
        }
    }

    /// Convenience constructor for a failed ack
    pub fn error(method: Method) -> Self {
        Reply::Ack {
            method,
            status: STATUS_ERROR,
        }
    }
}

/// A complete frame, request or reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Request(Request),
    Reply(Reply),
}

/// Decoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Payload length in bytes (excludes the header itself)
    pub payload_len: usize,
    /// True when the reply bit is set
    pub is_reply: bool,
    /// Frame method
    pub method: Method,
}

impl FrameHeader {
    /// Parse a frame header from exactly [`FRAME_HEADER_SIZE`] bytes.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Err(DecodeError::Truncated {
                expected: FRAME_HEADER_SIZE,
                got: buf.len(),
            });
        }

        let mut cursor = buf;
        let payload_len = cursor.get_u32() as usize;
        let flags = cursor.get_u8();
        let raw_method = cursor.get_u8();

        if flags & !KNOWN_FLAGS != 0 {
            return Err(DecodeError::UnknownFlags(flags));
        }
        if payload_len > MAX_CHUNK_SIZE + 16 {
            return Err(DecodeError::PayloadTooLarge(payload_len));
        }

        let method = Method::from_u8(raw_method).ok_or(DecodeError::UnknownMethod(raw_method))?;

        Ok(FrameHeader {
            payload_len,
            is_reply: flags & REPLY_FLAG != 0,
            method,
        })
    }
}

impl Frame {
    /// Serialize the frame, header included.
    pub fn encode(&self) -> Bytes {
        let (is_reply, method) = match self {
            Frame::Request(req) => (false, req.method()),
            Frame::Reply(rep) => (true, rep.method()),
        };

        let mut payload = BytesMut::new();
        match self {
            Frame::Request(Request::ConnectMaster { timestamp_micros }) => {
                payload.put_i64(*timestamp_micros);
            }
            Frame::Request(Request::Start { delay_micros }) => {
                payload.put_i64(*delay_micros);
            }
            Frame::Request(Request::ReceiveData { chunk, last }) => {
                payload.put_u8(u8::from(*last));
                payload.put_slice(chunk);
            }
            Frame::Request(Request::SetVolume { volume }) => {
                payload.put_u8(*volume);
            }
            Frame::Request(Request::SeekTo { offset }) => {
                payload.put_u64(*offset);
            }
            Frame::Request(Request::BufferReset)
            | Frame::Request(Request::Pause)
            | Frame::Request(Request::Resume)
            | Frame::Request(Request::Disconnect)
            | Frame::Request(Request::TrackChange) => {}
            Frame::Reply(Reply::Timestamp { timestamp_micros }) => {
                payload.put_i64(*timestamp_micros);
            }
            Frame::Reply(Reply::Ack { status, .. }) => {
                payload.put_u8(*status);
            }
        }

        let mut out = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
        out.put_u32(payload.len() as u32);
        out.put_u8(if is_reply { REPLY_FLAG } else { 0 });
        out.put_u8(method.as_u8());
        out.put_slice(&payload);
        out.freeze()
    }

    /// Decode the payload of a frame whose header has already been parsed.
    pub fn decode_payload(header: FrameHeader, payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.len() != header.payload_len {
            return Err(DecodeError::Truncated {
                expected: header.payload_len,
                got: payload.len(),
            });
        }

        let mut cursor = payload;

        if header.is_reply {
            let reply = match header.method {
                Method::ConnectMaster => {
                    expect_len(payload, 8, header.method)?;
                    Reply::Timestamp {
                        timestamp_micros: cursor.get_i64(),
                    }
                }
                method => {
                    expect_len(payload, 1, method)?;
                    Reply::Ack {
                        method,
                        status: cursor.get_u8(),
                    }
                }
            };
            return Ok(Frame::Reply(reply));
        }

        let request = match header.method {
            Method::ConnectMaster => {
                expect_len(payload, 8, header.method)?;
                Request::ConnectMaster {
                    timestamp_micros: cursor.get_i64(),
                }
            }
            Method::Start => {
                expect_len(payload, 8, header.method)?;
                Request::Start {
                    delay_micros: cursor.get_i64(),
                }
            }
            Method::BufferReset => {
                expect_len(payload, 0, header.method)?;
                Request::BufferReset
            }
            Method::ReceiveData => {
                if payload.is_empty() {
                    return Err(DecodeError::Truncated {
                        expected: 1,
                        got: 0,
                    });
                }
                let last = cursor.get_u8() != 0;
                if cursor.len() > MAX_CHUNK_SIZE {
                    return Err(DecodeError::PayloadTooLarge(cursor.len()));
                }
                Request::ReceiveData {
                    chunk: Bytes::copy_from_slice(cursor),
                    last,
                }
            }
            Method::SetVolume => {
                expect_len(payload, 1, header.method)?;
                Request::SetVolume {
                    volume: cursor.get_u8(),
                }
            }
            Method::Pause => {
                expect_len(payload, 0, header.method)?;
                Request::Pause
            }
            Method::Resume => {
                expect_len(payload, 0, header.method)?;
                Request::Resume
            }
            Method::SeekTo => {
                expect_len(payload, 8, header.method)?;
                Request::SeekTo {
                    offset: cursor.get_u64(),
                }
            }
            Method::Disconnect => {
                expect_len(payload, 0, header.method)?;
                Request::Disconnect
            }
            Method::TrackChange => {
                expect_len(payload, 0, header.method)?;
                Request::TrackChange
            }
        };

        Ok(Frame::Request(request))
    }

    /// Decode a complete frame from a byte slice (header + payload).
    ///
    /// Convenience for tests and benchmarks; the socket layer reads the
    /// header and payload separately.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let header = FrameHeader::decode(buf)?;
        let payload = &buf[FRAME_HEADER_SIZE..];
        Frame::decode_payload(header, payload)
    }
}

fn expect_len(payload: &[u8], expected: usize, method: Method) -> Result<(), DecodeError> {
    use std::cmp::Ordering;
    match payload.len().cmp(&expected) {
        Ordering::Less => Err(DecodeError::Truncated {
            expected,
            got: payload.len(),
        }),
        Ordering::Greater => Err(DecodeError::TrailingBytes { method }),
        Ordering::Equal => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(frame: Frame) {
        let bytes = frame.encode();
        let decoded = Frame::decode(&bytes).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_connect_master_roundtrip() {
        roundtrip(Frame::Request(Request::ConnectMaster {
            timestamp_micros: 1_693_000_123_456_789,
        }));
        roundtrip(Frame::Reply(Reply::Timestamp {
            timestamp_micros: 0,
        }));
    }

    #[test]
    fn test_start_roundtrip() {
        roundtrip(Frame::Request(Request::Start {
            delay_micros: 250_000,
        }));
        roundtrip(Frame::Reply(Reply::ok(Method::Start)));
    }

    #[test]
    fn test_receive_data_roundtrip() {
        roundtrip(Frame::Request(Request::ReceiveData {
            chunk: Bytes::from_static(b"stream data chunk"),
            last: false,
        }));
        roundtrip(Frame::Request(Request::ReceiveData {
            chunk: Bytes::new(),
            last: true,
        }));
    }

    #[test]
    fn test_control_roundtrips() {
        roundtrip(Frame::Request(Request::BufferReset));
        roundtrip(Frame::Request(Request::SetVolume { volume: 128 }));
        roundtrip(Frame::Request(Request::Pause));
        roundtrip(Frame::Request(Request::Resume));
        roundtrip(Frame::Request(Request::SeekTo { offset: 1 << 33 }));
        roundtrip(Frame::Request(Request::Disconnect));
        roundtrip(Frame::Request(Request::TrackChange));
        roundtrip(Frame::Reply(Reply::error(Method::SeekTo)));
    }

    #[test]
    fn test_unknown_method_rejected() {
        let mut bytes = Frame::Request(Request::Pause).encode().to_vec();
        bytes[5] = 0xEE;
        assert!(matches!(
            Frame::decode(&bytes),
            Err(DecodeError::UnknownMethod(0xEE))
        ));
    }

    #[test]
    fn test_unknown_flags_rejected() {
        let mut bytes = Frame::Request(Request::Pause).encode().to_vec();
        bytes[4] = 0x82;
        assert!(matches!(
            Frame::decode(&bytes),
            Err(DecodeError::UnknownFlags(0x82))
        ));
    }

    #[test]
    fn test_truncated_header_rejected() {
        let bytes = Frame::Request(Request::Pause).encode();
        assert!(matches!(
            FrameHeader::decode(&bytes[..3]),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        // Start payload is exactly 8 bytes; pad one extra.
        let mut bytes = Frame::Request(Request::Start { delay_micros: 1 })
            .encode()
            .to_vec();
        bytes.push(0);
        let len = (bytes.len() - FRAME_HEADER_SIZE) as u32;
        bytes[..4].copy_from_slice(&len.to_be_bytes());
        assert!(matches!(
            Frame::decode(&bytes),
            Err(DecodeError::TrailingBytes {
                method: Method::Start
            })
        ));
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        header[..4].copy_from_slice(&(16 * 1024 * 1024u32).to_be_bytes());
        header[5] = Method::ReceiveData.as_u8();
        assert!(matches!(
            FrameHeader::decode(&header),
            Err(DecodeError::PayloadTooLarge(_))
        ));
    }
}
