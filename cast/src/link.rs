//! TCP-backed RemoteLink
//!
//! Maps the coordinator-facing [`RemoteLink`] trait onto framed TCP
//! connections. One socket per registered receiver, kept in a handle
//! table; calls serialize per handle behind a mutex, different handles
//! proceed in parallel.

use cast_io::{LinkSocket, SocketError};
use cast_proto::{Method, Reply, Request, STATUS_OK};
use cast_sync::{LinkError, LinkHandle, RemoteLink};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default bound on connect and per-call round-trips
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle table of framed TCP connections to receiver nodes
pub struct TcpRemoteLink {
    call_timeout: Duration,
    next_handle: AtomicU32,
    links: RwLock<HashMap<LinkHandle, Arc<Mutex<LinkSocket>>>>,
}

impl Default for TcpRemoteLink {
    fn default() -> Self {
        TcpRemoteLink::new(DEFAULT_CALL_TIMEOUT)
    }
}

impl TcpRemoteLink {
    pub fn new(call_timeout: Duration) -> Self {
        TcpRemoteLink {
            call_timeout,
            next_handle: AtomicU32::new(1),
            links: RwLock::new(HashMap::new()),
        }
    }

    fn socket(&self, handle: LinkHandle) -> Result<Arc<Mutex<LinkSocket>>, LinkError> {
        self.links
            .read()
            .get(&handle)
            .cloned()
            .ok_or(LinkError::UnknownHandle(handle))
    }

    /// Issue a request and require an OK ack for `method` back.
    fn call_ack(&self, handle: LinkHandle, request: Request, method: Method) -> Result<(), LinkError> {
        let socket = self.socket(handle)?;
        let reply = socket
            .lock()
            .call(request)
            .map_err(|e| transport_error(handle, e))?;
        match reply {
            Reply::Ack { method: m, status } if m == method && status == STATUS_OK => Ok(()),
            Reply::Ack { status, .. } => Err(LinkError::Rejected(status)),
            Reply::Timestamp { .. } => Err(LinkError::Transport(
                "timestamp reply to a control request".to_string(),
            )),
        }
    }
}

fn transport_error(handle: LinkHandle, e: SocketError) -> LinkError {
    if e.is_timeout() {
        warn!(handle, "link call timed out");
        LinkError::Timeout
    } else {
        LinkError::Transport(e.to_string())
    }
}

impl RemoteLink for TcpRemoteLink {
    fn connect(&self, addr: SocketAddr) -> Result<LinkHandle, LinkError> {
        let socket = LinkSocket::connect(addr, self.call_timeout).map_err(|e| {
            LinkError::Connect {
                addr,
                reason: e.to_string(),
            }
        })?;

        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        self.links
            .write()
            .insert(handle, Arc::new(Mutex::new(socket)));
        debug!(handle, %addr, "link connected");
        Ok(handle)
    }

    fn disconnect(&self, handle: LinkHandle) -> Result<(), LinkError> {
        let socket = self
            .links
            .write()
            .remove(&handle)
            .ok_or(LinkError::UnknownHandle(handle))?;

        let mut socket = socket.lock();
        // The goodbye is advisory; the shutdown is what matters.
        if let Err(e) = socket.send_frame(&cast_proto::Frame::Request(Request::Disconnect)) {
            debug!(handle, error = %e, "disconnect notify failed");
        }
        socket.shutdown();
        debug!(handle, "link disconnected");
        Ok(())
    }

    fn connect_master(&self, handle: LinkHandle, epoch_micros: i64) -> Result<i64, LinkError> {
        let socket = self.socket(handle)?;
        let reply = socket
            .lock()
            .call(Request::ConnectMaster {
                timestamp_micros: epoch_micros,
            })
            .map_err(|e| transport_error(handle, e))?;
        match reply {
            Reply::Timestamp { timestamp_micros } => Ok(timestamp_micros),
            Reply::Ack { status, .. } => Err(LinkError::Rejected(status)),
        }
    }

    fn start(&self, handle: LinkHandle, delay: Duration) -> Result<(), LinkError> {
        self.call_ack(
            handle,
            Request::Start {
                delay_micros: delay.as_micros() as i64,
            },
            Method::Start,
        )
    }

    fn buffer_reset(&self, handle: LinkHandle) -> Result<(), LinkError> {
        self.call_ack(handle, Request::BufferReset, Method::BufferReset)
    }

    fn send_data(&self, handle: LinkHandle, chunk: &[u8], last: bool) -> Result<(), LinkError> {
        self.call_ack(
            handle,
            Request::ReceiveData {
                chunk: bytes::Bytes::copy_from_slice(chunk),
                last,
            },
            Method::ReceiveData,
        )
    }

    fn set_volume(&self, handle: LinkHandle, volume: u8) -> Result<(), LinkError> {
        self.call_ack(handle, Request::SetVolume { volume }, Method::SetVolume)
    }

    fn pause(&self, handle: LinkHandle) -> Result<(), LinkError> {
        self.call_ack(handle, Request::Pause, Method::Pause)
    }

    fn resume(&self, handle: LinkHandle) -> Result<(), LinkError> {
        self.call_ack(handle, Request::Resume, Method::Resume)
    }

    fn seek_to(&self, handle: LinkHandle, offset: u64) -> Result<(), LinkError> {
        self.call_ack(handle, Request::SeekTo { offset }, Method::SeekTo)
    }

    fn track_change(&self, handle: LinkHandle) -> Result<(), LinkError> {
        self.call_ack(handle, Request::TrackChange, Method::TrackChange)
    }
}
