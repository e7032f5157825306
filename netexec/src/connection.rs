//! Connection handler: the request/response loop for one accepted peer.
//!
//! ```text
//! AWAIT_REQUEST -> TOKENIZE -> EXECUTE -> REPLY -> AWAIT_REQUEST
//!       |                                  |
//!       +------------> CLOSED <------------+
//! ```
//!
//! Requests on one connection are strictly sequential: a request is executed
//! and fully replied to before the next read begins.

use std::io;
use std::net::TcpStream;

use tracing::{debug, instrument, warn};

use crate::core::tokenize::{Request, tokenize};
use crate::io::listener::Connection;
use crate::io::process::ProcessRunner;
use crate::io::relay::relay;
use crate::protocol::Protocol;

/// Why a connection handler stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Closed {
    /// Orderly shutdown by the peer.
    PeerClosed,
    ReadFailed,
    ReplyFailed,
}

/// Serve requests on `conn` until the peer closes or an I/O error occurs.
///
/// All failures are scoped to this connection and are logged under the
/// `connection` span, which carries the peer address.
#[instrument(name = "connection", skip_all, fields(peer = %conn.peer))]
pub fn serve<R, P>(conn: Connection, runner: &R, protocol: &P, buffer_len: usize) -> Closed
where
    R: ProcessRunner,
    P: Protocol,
{
    let mut stream = conn.stream;
    let mut buf = vec![0u8; buffer_len];

    loop {
        let received = match protocol.read_request(&mut stream, &mut buf) {
            Ok(0) => {
                debug!("peer closed the connection");
                return Closed::PeerClosed;
            }
            Ok(n) => n,
            Err(e) => {
                warn!(err = %e, "failed to read a request");
                return Closed::ReadFailed;
            }
        };

        let request = tokenize(&mut buf[..received]);
        if request.is_empty() {
            debug!(received, "ignoring blank request");
            continue;
        }

        if let Err(e) = execute_and_reply(&mut stream, &request, runner, protocol) {
            warn!(err = %e, "failed to send a reply");
            return Closed::ReplyFailed;
        }
    }
}

/// Run one request and write its reply.
///
/// Only errors that leave the connection unusable are returned; a failed
/// relay is logged and the handler goes back to reading.
fn execute_and_reply<R, P>(
    stream: &mut TcpStream,
    request: &Request<'_>,
    runner: &R,
    protocol: &P,
) -> io::Result<()>
where
    R: ProcessRunner,
    P: Protocol,
{
    let outcome = match runner.run(request) {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(err = %err, status = err.status_code(), "request could not be executed");
            return protocol.write_failure(stream, err.status_code(), &err.diagnostic());
        }
    };

    protocol.write_status(stream, outcome.report.status_code())?;
    match relay(outcome.selected(), &*stream) {
        Ok(sent) => debug!(sent, stream = ?outcome.selected_stream(), "reply sent"),
        Err(e) => warn!(err = %e, "failed to relay captured output"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::outcome::{ExitReport, Termination};
    use crate::protocol::LineProtocol;
    use crate::test_support::{ScriptedRun, ScriptedRunner, tcp_pair};
    use std::io::{Read, Write};
    use std::net::Shutdown;
    use std::thread;

    fn exited(code: i32) -> ExitReport {
        ExitReport {
            termination: Termination::Exited(code),
            timed_out: false,
        }
    }

    #[test]
    fn replies_in_order_and_closes_on_peer_shutdown() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = ScriptedRunner::new(
            temp.path(),
            vec![
                ScriptedRun::Finished {
                    report: exited(0),
                    stdout: b"first\n".to_vec(),
                    stderr: b"ignored\n".to_vec(),
                },
                ScriptedRun::Finished {
                    report: exited(2),
                    stdout: b"ignored\n".to_vec(),
                    stderr: b"second\n".to_vec(),
                },
            ],
        );
        let (conn, mut client) = tcp_pair();

        let handler = thread::spawn(move || {
            let closed = serve(conn, &runner, &LineProtocol, 1024);
            (closed, runner.seen())
        });

        let first = "Child exited with status 0\nfirst\n";
        client.write_all(b"one a b\n").expect("write");
        let mut reply = vec![0u8; first.len()];
        client.read_exact(&mut reply).expect("read first");
        assert_eq!(String::from_utf8_lossy(&reply), first);

        client.write_all(b"two").expect("write");
        client.shutdown(Shutdown::Write).expect("shutdown");
        let mut rest = String::new();
        client.read_to_string(&mut rest).expect("read second");
        assert_eq!(rest, "Child exited with status 2\nsecond\n");

        let (closed, seen) = handler.join().expect("join");
        assert_eq!(closed, Closed::PeerClosed);
        assert_eq!(seen, vec![vec!["one", "a", "b"], vec!["two"]]);
    }

    #[test]
    fn blank_requests_produce_no_reply() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = ScriptedRunner::new(temp.path(), Vec::new());
        let (conn, mut client) = tcp_pair();
        let handler = thread::spawn(move || serve(conn, &runner, &LineProtocol, 64));

        client.write_all(b" \t\r\n").expect("write");
        client.shutdown(Shutdown::Write).expect("shutdown");
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).expect("read");
        assert!(rest.is_empty());
        assert_eq!(handler.join().expect("join"), Closed::PeerClosed);
    }

    #[test]
    fn spawn_failure_is_reported_and_connection_survives() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = ScriptedRunner::new(
            temp.path(),
            vec![
                ScriptedRun::SpawnFails,
                ScriptedRun::Finished {
                    report: exited(0),
                    stdout: b"ok\n".to_vec(),
                    stderr: Vec::new(),
                },
            ],
        );
        let (conn, mut client) = tcp_pair();
        let handler = thread::spawn(move || serve(conn, &runner, &LineProtocol, 64));

        client.write_all(b"missing\n").expect("write");
        let expected = "Child exited with status 127\nnetexec: failed to execute 'missing': ";
        let mut reply = vec![0u8; expected.len()];
        client.read_exact(&mut reply).expect("read failure");
        assert_eq!(String::from_utf8_lossy(&reply), expected);
        let mut byte = [0u8; 1];
        while byte[0] != b'\n' {
            client.read_exact(&mut byte).expect("drain diagnostic");
        }

        client.write_all(b"again\n").expect("write");
        client.shutdown(Shutdown::Write).expect("shutdown");
        let mut rest = String::new();
        client.read_to_string(&mut rest).expect("read");
        assert_eq!(rest, "Child exited with status 0\nok\n");
        assert_eq!(handler.join().expect("join"), Closed::PeerClosed);
    }

    #[test]
    fn capture_files_do_not_outlive_the_reply() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = ScriptedRunner::new(
            temp.path(),
            vec![ScriptedRun::Finished {
                report: exited(1),
                stdout: Vec::new(),
                stderr: b"boom\n".to_vec(),
            }],
        );
        let (conn, mut client) = tcp_pair();
        let handler = thread::spawn(move || serve(conn, &runner, &LineProtocol, 64));

        client.write_all(b"fail").expect("write");
        client.shutdown(Shutdown::Write).expect("shutdown");
        let mut rest = String::new();
        client.read_to_string(&mut rest).expect("read");
        assert_eq!(rest, "Child exited with status 1\nboom\n");
        handler.join().expect("join");

        assert_eq!(std::fs::read_dir(temp.path()).expect("read dir").count(), 0);
    }
}
