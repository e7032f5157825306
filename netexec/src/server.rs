//! Acceptor loop: accept peers and hand each one to its own handler thread.

use std::io::{self, Read};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::connection;
use crate::io::config::{AdmissionPolicy, ServerConfig};
use crate::io::listener::{Connection, Listener};
use crate::io::process::ChildRunner;
use crate::limiter::{ConnectionLimiter, Permit};
use crate::protocol::{LineProtocol, Protocol};

/// How long a rejected peer may keep sending before it is dropped.
pub const REJECT_DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

pub struct Server {
    listener: Listener,
    runner: Arc<ChildRunner>,
    limiter: ConnectionLimiter,
    admission: AdmissionPolicy,
    buffer_len: usize,
}

impl Server {
    /// Validate `config` and bind the command socket. Failures here are fatal.
    pub fn bind(port: u16, config: &ServerConfig) -> Result<Self> {
        config.validate()?;
        let listener = Listener::bind(port, config.backlog)?;
        let buffer_len = config.request_buffer_len();
        info!(
            timeout_ms = config.timeout_ms,
            max_connections = config.max_connections,
            admission = ?config.admission,
            buffer_len,
            "server configured"
        );
        Ok(Self {
            listener,
            runner: Arc::new(ChildRunner::new(config.timeout(), config.capture_dir())),
            limiter: ConnectionLimiter::new(config.max_connections),
            admission: config.admission,
            buffer_len,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever. A failed accept is logged and skipped.
    pub fn run(self) -> ! {
        loop {
            let reserved = match self.admission {
                AdmissionPolicy::Queue => Some(self.limiter.acquire()),
                AdmissionPolicy::Reject => None,
            };

            let conn = match self.listener.accept() {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(err = %e, "failed to establish a connection");
                    continue;
                }
            };
            debug!(peer = %conn.peer, live = self.limiter.live(), "accepted connection");

            let permit = match reserved.or_else(|| self.limiter.try_acquire()) {
                Some(permit) => permit,
                None => {
                    reject(conn);
                    continue;
                }
            };
            self.dispatch(conn, permit);
        }
    }

    fn dispatch(&self, conn: Connection, permit: Permit) {
        let peer = conn.peer.clone();
        let runner = Arc::clone(&self.runner);
        let buffer_len = self.buffer_len;

        let spawned = thread::Builder::new()
            .name(format!("conn-{peer}"))
            .spawn(move || {
                let _permit = permit;
                let closed = connection::serve(conn, runner.as_ref(), &LineProtocol, buffer_len);
                debug!(?closed, "connection handler finished");
            });
        if let Err(e) = spawned {
            warn!(peer = %peer, err = %e, "failed to create a thread to process a connection");
        }
    }
}

/// Tell a peer it was not admitted and close gracefully.
///
/// Unread request bytes at close would make the kernel reset the connection
/// and discard the busy line, so the write half is shut down first and the
/// peer's input is drained until EOF or [`REJECT_DRAIN_TIMEOUT`].
fn reject(mut conn: Connection) {
    warn!(peer = %conn.peer, "connection limit reached, rejecting");
    if let Err(e) = LineProtocol.write_busy(&mut conn.stream) {
        debug!(peer = %conn.peer, err = %e, "failed to notify rejected peer");
        return;
    }
    if let Err(e) = conn.stream.shutdown(Shutdown::Write) {
        debug!(peer = %conn.peer, err = %e, "failed to shut down rejected peer");
        return;
    }
    if let Err(e) = drain(&mut conn.stream) {
        debug!(peer = %conn.peer, err = %e, "stopped draining rejected peer");
    }
}

fn drain(stream: &mut TcpStream) -> io::Result<()> {
    stream.set_read_timeout(Some(REJECT_DRAIN_TIMEOUT))?;
    let mut sink = [0u8; 4096];
    while stream.read(&mut sink)? > 0 {}
    Ok(())
}
