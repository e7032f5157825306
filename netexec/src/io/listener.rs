//! Command socket setup.
//!
//! The socket is created by hand rather than through `TcpListener::bind` so the
//! listen backlog is configurable. `SO_REUSEADDR` is deliberately left unset.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::fd::AsRawFd;

use anyhow::{Context, Result};
use nix::sys::socket::{
    AddressFamily, Backlog, SockFlag, SockType, SockaddrIn, bind, listen, socket,
};
use tracing::{info, instrument};

/// The process-wide listening socket.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
}

/// One accepted peer.
#[derive(Debug)]
pub struct Connection {
    pub stream: TcpStream,
    /// Textual peer address, used to tag every per-connection log line.
    pub peer: String,
}

impl Listener {
    /// Bind `0.0.0.0:port` and start listening with the given backlog.
    #[instrument(skip_all, fields(port = port, backlog = backlog))]
    pub fn bind(port: u16, backlog: i32) -> Result<Self> {
        let fd = socket(
            AddressFamily::Inet,
            SockType::Stream,
            SockFlag::SOCK_CLOEXEC,
            None,
        )
        .context("failed to open socket for communication")?;

        let addr = SockaddrIn::new(0, 0, 0, 0, port);
        bind(fd.as_raw_fd(), &addr)
            .with_context(|| format!("failed to bind the command socket to port {port}"))?;

        let backlog = Backlog::new(backlog).context("invalid listen backlog")?;
        listen(&fd, backlog).with_context(|| format!("failed to listen on port {port}"))?;

        let inner = TcpListener::from(fd);
        let local = inner.local_addr().context("read bound address")?;
        info!(addr = %local, "listening for commands");
        Ok(Self { inner })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.inner.local_addr().context("read bound address")
    }

    /// Block until a peer connects.
    pub fn accept(&self) -> std::io::Result<Connection> {
        let (stream, addr) = self.inner.accept()?;
        Ok(Connection {
            stream,
            peer: addr.ip().to_string(),
        })
    }
}
