//! TCP socket wrapper for castsync links
//!
//! Provides a frame-oriented blocking socket with explicit connect and
//! per-call timeouts, and the non-blocking listener the node server's
//! accept loop polls.

use cast_proto::{DecodeError, Frame, FrameHeader, Reply, Request, FRAME_HEADER_SIZE};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Socket errors
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("frame decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("invalid socket address")]
    InvalidAddress,

    #[error("peer sent a request where a reply was expected")]
    UnexpectedRequest,

    #[error("peer closed the connection")]
    Closed,
}

impl SocketError {
    /// True when the error is a read/write timeout rather than a hard
    /// transport failure.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            SocketError::Io(e)
                if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut
        )
    }
}

/// Frame-oriented castsync link socket
///
/// Wraps a TCP stream with read/write timeouts so a hung remote can never
/// block a coordinator thread indefinitely.
pub struct LinkSocket {
    stream: TcpStream,
}

impl LinkSocket {
    /// Connect to a remote node, bounding both the connect itself and all
    /// subsequent calls by `timeout`.
    pub fn connect(addr: SocketAddr, timeout: Duration) -> Result<Self, SocketError> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
        socket.connect_timeout(&addr.into(), timeout)?;
        socket.set_nodelay(true)?;

        let stream: TcpStream = socket.into();
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;

        debug!(%addr, timeout_ms = timeout.as_millis() as u64, "link socket connected");
        Ok(LinkSocket { stream })
    }

    /// Wrap an accepted stream, applying the per-call timeout.
    pub fn from_stream(stream: TcpStream, timeout: Duration) -> Result<Self, SocketError> {
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        Ok(LinkSocket { stream })
    }

    /// Address of the remote peer
    pub fn peer_addr(&self) -> Result<SocketAddr, SocketError> {
        Ok(self.stream.peer_addr()?)
    }

    /// Send a single frame.
    pub fn send_frame(&mut self, frame: &Frame) -> Result<(), SocketError> {
        let bytes = frame.encode();
        self.stream.write_all(&bytes)?;
        Ok(())
    }

    /// Receive a single frame.
    pub fn recv_frame(&mut self) -> Result<Frame, SocketError> {
        let mut header_buf = [0u8; FRAME_HEADER_SIZE];
        read_exact_or_closed(&mut self.stream, &mut header_buf)?;
        let header = FrameHeader::decode(&header_buf)?;

        let mut payload = vec![0u8; header.payload_len];
        if header.payload_len > 0 {
            read_exact_or_closed(&mut self.stream, &mut payload)?;
        }

        Ok(Frame::decode_payload(header, &payload)?)
    }

    /// Issue a request and block for its reply.
    pub fn call(&mut self, request: Request) -> Result<Reply, SocketError> {
        self.send_frame(&Frame::Request(request))?;
        match self.recv_frame()? {
            Frame::Reply(reply) => Ok(reply),
            Frame::Request(_) => Err(SocketError::UnexpectedRequest),
        }
    }

    /// Shut down both directions of the stream.
    pub fn shutdown(&self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

fn read_exact_or_closed(stream: &mut TcpStream, buf: &mut [u8]) -> Result<(), SocketError> {
    match stream.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(SocketError::Closed),
        Err(e) => Err(SocketError::Io(e)),
    }
}

/// Non-blocking TCP listener for the node server
pub struct LinkListener {
    inner: std::net::TcpListener,
}

impl LinkListener {
    /// Bind a listener on the given address.
    pub fn bind(addr: SocketAddr) -> Result<Self, SocketError> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(16)?;

        let listener: std::net::TcpListener = socket.into();
        listener.set_nonblocking(true)?;

        debug!(%addr, "link listener bound");
        Ok(LinkListener { inner: listener })
    }

    /// Get the local address this listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr, SocketError> {
        Ok(self.inner.local_addr()?)
    }

    /// Accept a pending connection, applying `call_timeout` to writes.
    ///
    /// Returns `WouldBlock` wrapped in `SocketError::Io` when no connection
    /// is pending; the accept loop sleeps and retries.
    pub fn accept(&self, call_timeout: Duration) -> Result<(LinkSocket, SocketAddr), SocketError> {
        let (stream, addr) = self.inner.accept()?;
        stream.set_nonblocking(false)?;
        let socket = LinkSocket::from_stream(stream, call_timeout)?;
        Ok((socket, addr))
    }
}
