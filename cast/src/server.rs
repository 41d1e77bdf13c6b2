//! Node RPC server
//!
//! Serves the inbound surface a receiver node exposes to masters: the
//! slave-claiming timestamp exchange, the delayed start, buffer resets,
//! stream data, and playback control. One OS thread per connection over a
//! non-blocking accept loop; read timeouts double as shutdown poll points
//! so a stop request is observed within one timeout interval.
//!
//! A start request is acked immediately and its delay is waited out on a
//! detached one-shot timer thread, so the master's dispatch round-trip
//! measures transport cost only, never the delay itself.

use crate::session::PlaybackSession;
use cast_io::{LinkListener, LinkSocket, SocketError};
use cast_proto::{Frame, Method, Reply, Request};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Accept-loop poll interval when no connection is pending
const ACCEPT_IDLE_SLEEP: Duration = Duration::from_millis(10);

/// Per-connection read/write timeout, which is also the shutdown poll
/// interval for handler threads
pub const DEFAULT_SERVE_TIMEOUT: Duration = Duration::from_millis(500);

/// Inbound RPC server for one playback session
pub struct NodeServer {
    listener: LinkListener,
    session: Arc<PlaybackSession>,
    serve_timeout: Duration,
    shutdown: Arc<AtomicBool>,
}

/// Handle to a spawned server; dropping it without `stop` leaves the
/// server running detached.
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal shutdown and wait for the accept loop to exit.
    pub fn stop(self) {
        self.shutdown.store(true, Ordering::Release);
        if self.thread.join().is_err() {
            warn!("server thread panicked");
        }
    }
}

impl NodeServer {
    pub fn bind(
        addr: SocketAddr,
        session: Arc<PlaybackSession>,
    ) -> Result<Self, SocketError> {
        let listener = LinkListener::bind(addr)?;
        info!(addr = %listener.local_addr()?, "node server listening");
        Ok(NodeServer {
            listener,
            session,
            serve_timeout: DEFAULT_SERVE_TIMEOUT,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, SocketError> {
        self.listener.local_addr()
    }

    /// Run the accept loop on a background thread.
    pub fn spawn(self) -> Result<ServerHandle, SocketError> {
        let addr = self.local_addr()?;
        let shutdown = self.shutdown.clone();
        let thread = thread::Builder::new()
            .name("cast-server".to_string())
            .spawn(move || self.run())?;
        Ok(ServerHandle {
            addr,
            shutdown,
            thread,
        })
    }

    /// Accept loop: hand each inbound connection to its own thread.
    pub fn run(self) {
        while !self.shutdown.load(Ordering::Acquire) {
            match self.listener.accept(self.serve_timeout) {
                Ok((socket, peer)) => {
                    debug!(%peer, "connection accepted");
                    let session = self.session.clone();
                    let shutdown = self.shutdown.clone();
                    let spawned = thread::Builder::new()
                        .name(format!("cast-conn-{peer}"))
                        .spawn(move || serve_connection(socket, peer, session, shutdown));
                    if let Err(e) = spawned {
                        warn!(%peer, error = %e, "failed to spawn connection thread");
                    }
                }
                Err(e) if e.is_timeout() => thread::sleep(ACCEPT_IDLE_SLEEP),
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    thread::sleep(ACCEPT_IDLE_SLEEP);
                }
            }
        }
        debug!("accept loop exited");
    }
}

fn serve_connection(
    mut socket: LinkSocket,
    peer: SocketAddr,
    session: Arc<PlaybackSession>,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::Acquire) {
        let request = match socket.recv_frame() {
            Ok(Frame::Request(request)) => request,
            Ok(Frame::Reply(reply)) => {
                warn!(%peer, ?reply, "unsolicited reply, ignoring");
                continue;
            }
            Err(e) if e.is_timeout() => continue,
            Err(SocketError::Closed) => {
                debug!(%peer, "peer closed connection");
                session.on_master_disconnect();
                break;
            }
            Err(e) => {
                warn!(%peer, error = %e, "connection error");
                session.on_master_disconnect();
                break;
            }
        };

        let disconnect = matches!(request, Request::Disconnect);
        let reply = dispatch(&session, request);
        if let Some(reply) = reply {
            if let Err(e) = socket.send_frame(&Frame::Reply(reply)) {
                warn!(%peer, error = %e, "reply send failed");
                session.on_master_disconnect();
                break;
            }
        }
        if disconnect {
            debug!(%peer, "peer disconnected");
            break;
        }
    }
    socket.shutdown();
}

/// Map one request onto the session. `None` means no reply is owed.
fn dispatch(session: &Arc<PlaybackSession>, request: Request) -> Option<Reply> {
    match request {
        Request::ConnectMaster { timestamp_micros } => {
            let ours = session.on_connect_master(timestamp_micros);
            Some(Reply::Timestamp {
                timestamp_micros: ours,
            })
        }
        Request::Start { delay_micros } => {
            let delay = Duration::from_micros(delay_micros.max(0) as u64);
            session.on_start(delay);
            // Ack now; the wait happens off this thread so the master's
            // compensation only measures the dispatch round-trip.
            let session = session.clone();
            let spawned = thread::Builder::new()
                .name("cast-start-timer".to_string())
                .spawn(move || {
                    thread::sleep(delay);
                    session.begin_playback();
                });
            match spawned {
                Ok(_) => Some(Reply::ok(Method::Start)),
                Err(e) => {
                    warn!(error = %e, "failed to spawn start timer");
                    Some(Reply::error(Method::Start))
                }
            }
        }
        Request::BufferReset => {
            session.on_buffer_reset();
            Some(Reply::ok(Method::BufferReset))
        }
        Request::ReceiveData { chunk, last } => {
            let written = session.on_receive_data(&chunk, last);
            if written < chunk.len() {
                warn!(
                    dropped = chunk.len() - written,
                    "chunk truncated, buffer full"
                );
                Some(Reply::error(Method::ReceiveData))
            } else {
                Some(Reply::ok(Method::ReceiveData))
            }
        }
        Request::SetVolume { volume } => {
            session.player().set_volume(volume);
            Some(Reply::ok(Method::SetVolume))
        }
        Request::Pause => {
            session.player().pause();
            Some(Reply::ok(Method::Pause))
        }
        Request::Resume => {
            session.player().resume();
            Some(Reply::ok(Method::Resume))
        }
        Request::SeekTo { offset } => {
            session.on_seek_to(offset);
            Some(Reply::ok(Method::SeekTo))
        }
        Request::TrackChange => {
            session.on_track_change();
            Some(Reply::ok(Method::TrackChange))
        }
        Request::Disconnect => {
            session.on_master_disconnect();
            None
        }
    }
}
