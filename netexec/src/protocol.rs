//! Wire format between peers and the daemon.
//!
//! Requests are one unframed read holding a whitespace-separated command line.
//! Replies are a status line followed by the raw bytes of one capture stream,
//! with no length prefix. Everything that knows these bytes lives behind
//! [`Protocol`], so the process runner never sees the wire.

use std::io::{self, Read, Write};

pub const STATUS_PREFIX: &str = "Child exited with status ";
pub const BUSY_LINE: &str = "Server busy\n";

pub trait Protocol {
    /// Read one request into `buf`. Returns 0 when the peer has closed.
    fn read_request(&self, reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize>;

    /// Write the header that precedes a reply body.
    fn write_status(&self, writer: &mut impl Write, status: i32) -> io::Result<()>;

    /// Write a complete reply for a request that never produced a child.
    fn write_failure(&self, writer: &mut impl Write, status: i32, message: &str)
    -> io::Result<()>;

    /// Tell a peer it was not admitted.
    fn write_busy(&self, writer: &mut impl Write) -> io::Result<()>;
}

/// The original line-oriented protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineProtocol;

pub fn status_line(status: i32) -> String {
    format!("{STATUS_PREFIX}{status}\n")
}

impl Protocol for LineProtocol {
    fn read_request(&self, reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match reader.read(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                result => return result,
            }
        }
    }

    fn write_status(&self, writer: &mut impl Write, status: i32) -> io::Result<()> {
        writer.write_all(status_line(status).as_bytes())
    }

    fn write_failure(
        &self,
        writer: &mut impl Write,
        status: i32,
        message: &str,
    ) -> io::Result<()> {
        let mut reply = status_line(status);
        reply.push_str(message);
        writer.write_all(reply.as_bytes())
    }

    fn write_busy(&self, writer: &mut impl Write) -> io::Result<()> {
        writer.write_all(BUSY_LINE.as_bytes())
    }
}
