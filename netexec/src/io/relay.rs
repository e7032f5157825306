//! Output relay: copy a capture file to a socket with `sendfile(2)`.

use std::fs::File;
use std::io;
use std::os::fd::AsFd;

use nix::errno::Errno;
use nix::libc::off_t;
use nix::sys::sendfile::sendfile;
use thiserror::Error;
use tracing::{debug, instrument, warn};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to stat capture file")]
    Stat(#[source] io::Error),

    #[error("failed to send reply after {sent} of {size} bytes")]
    Send {
        sent: u64,
        size: u64,
        #[source]
        source: Errno,
    },
}

/// Send the whole of `capture` to `socket`, returning the number of bytes sent.
///
/// Partial transfers are resumed from the recorded offset until the size seen
/// at entry has been sent. The capture file's own position is not used.
#[instrument(skip_all, fields(size = tracing::field::Empty))]
pub fn relay(capture: &File, socket: &impl AsFd) -> Result<u64, RelayError> {
    let size = capture.metadata().map_err(RelayError::Stat)?.len();
    tracing::Span::current().record("size", size);

    let mut offset: off_t = 0;
    let mut sent: u64 = 0;
    while sent < size {
        let remaining = usize::try_from(size - sent).unwrap_or(usize::MAX);
        match sendfile(socket.as_fd(), capture.as_fd(), Some(&mut offset), remaining) {
            Ok(0) => {
                warn!(sent, size, "capture file shrank during relay");
                break;
            }
            Ok(n) => sent += n as u64,
            Err(Errno::EINTR | Errno::EAGAIN) => continue,
            Err(source) => return Err(RelayError::Send { sent, size, source }),
        }
    }

    debug!(sent, "relayed capture");
    Ok(sent)
}
