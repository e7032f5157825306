//! Test-only helpers: scripted runners, socket pairs and a background server.

use std::collections::VecDeque;
use std::fs;
use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use crate::core::outcome::{ExitReport, Stream};
use crate::core::tokenize::Request;
use crate::io::capture::Captures;
use crate::io::config::ServerConfig;
use crate::io::listener::Connection;
use crate::io::process::{ExecutionOutcome, ProcessRunner, RunError};
use crate::server::Server;

/// Upper bound on any single blocking read in tests.
pub const CLIENT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// One predetermined result for [`ScriptedRunner`].
#[derive(Debug, Clone)]
pub enum ScriptedRun {
    Finished {
        report: ExitReport,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    },
    SpawnFails,
}

/// Runner that replays queued results without spawning processes.
#[derive(Debug)]
pub struct ScriptedRunner {
    capture_dir: PathBuf,
    queue: Mutex<VecDeque<ScriptedRun>>,
    seen: Mutex<Vec<Vec<String>>>,
}

impl ScriptedRunner {
    pub fn new(capture_dir: &Path, runs: Vec<ScriptedRun>) -> Self {
        Self {
            capture_dir: capture_dir.to_path_buf(),
            queue: Mutex::new(runs.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Token lists of every request received so far.
    pub fn seen(&self) -> Vec<Vec<String>> {
        self.seen.lock().expect("seen lock").clone()
    }
}

impl ProcessRunner for ScriptedRunner {
    fn run(&self, request: &Request<'_>) -> Result<ExecutionOutcome, RunError> {
        let tokens: Vec<String> = request
            .tokens()
            .iter()
            .map(|token| String::from_utf8_lossy(token).into_owned())
            .collect();
        let program = tokens.first().cloned().unwrap_or_default();
        self.seen.lock().expect("seen lock").push(tokens);

        let next = self
            .queue
            .lock()
            .expect("queue lock")
            .pop_front()
            .expect("scripted runner exhausted");
        match next {
            ScriptedRun::SpawnFails => Err(RunError::Spawn {
                program,
                source: io::Error::from(io::ErrorKind::NotFound),
            }),
            ScriptedRun::Finished {
                report,
                stdout,
                stderr,
            } => {
                let captures = Captures::create(&self.capture_dir).expect("create captures");
                captures
                    .file(Stream::Stdout)
                    .write_all(&stdout)
                    .expect("write stdout");
                captures
                    .file(Stream::Stderr)
                    .write_all(&stderr)
                    .expect("write stderr");
                Ok(ExecutionOutcome::new(report, captures))
            }
        }
    }
}

/// A connected pair: the accepted server side and the client side.
pub fn tcp_pair() -> (Connection, TcpStream) {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind");
    let client = TcpStream::connect(listener.local_addr().expect("addr")).expect("connect");
    client
        .set_read_timeout(Some(CLIENT_READ_TIMEOUT))
        .expect("read timeout");
    let (stream, addr) = listener.accept().expect("accept");
    let conn = Connection {
        stream,
        peer: addr.ip().to_string(),
    };
    (conn, client)
}

/// A real server on an ephemeral port, running on a background thread.
///
/// Capture files go to a private directory so tests can check cleanup.
pub struct TestServer {
    pub addr: SocketAddr,
    capture_dir: TempDir,
}

impl TestServer {
    pub fn start() -> Self {
        Self::start_with(ServerConfig::default())
    }

    pub fn start_with(mut config: ServerConfig) -> Self {
        let capture_dir = tempfile::tempdir().expect("capture dir");
        config.capture_dir = Some(capture_dir.path().to_path_buf());

        let server = Server::bind(0, &config).expect("bind server");
        let port = server.local_addr().expect("server addr").port();
        thread::Builder::new()
            .name("test-acceptor".to_string())
            .spawn(move || {
                server.run();
            })
            .expect("spawn acceptor");

        Self {
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, port)),
            capture_dir,
        }
    }

    pub fn connect(&self) -> TcpStream {
        let stream = TcpStream::connect(self.addr).expect("connect");
        stream
            .set_read_timeout(Some(CLIENT_READ_TIMEOUT))
            .expect("read timeout");
        stream
    }

    pub fn capture_dir(&self) -> &Path {
        self.capture_dir.path()
    }

    /// Number of capture files currently on disk.
    pub fn capture_files(&self) -> usize {
        fs::read_dir(self.capture_dir.path())
            .expect("read capture dir")
            .count()
    }

    /// Connect, send one request, close the write half, and read everything.
    pub fn request_once(&self, line: &str) -> String {
        let mut stream = self.connect();
        stream.write_all(line.as_bytes()).expect("send request");
        stream.shutdown(Shutdown::Write).expect("shutdown write");
        let mut reply = String::new();
        stream.read_to_string(&mut reply).expect("read reply");
        reply
    }
}

/// Read exactly `len` bytes as text.
pub fn read_text(stream: &mut TcpStream, len: usize) -> String {
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).expect("read reply bytes");
    String::from_utf8(buf).expect("utf8 reply")
}

/// Read up to and including the next `\n`.
pub fn read_line(stream: &mut TcpStream) -> String {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        stream.read_exact(&mut byte).expect("read line byte");
        line.push(byte[0]);
        if byte[0] == b'\n' {
            break;
        }
    }
    String::from_utf8(line).expect("utf8 line")
}

/// Send `line` and expect exactly `expected` back.
pub fn exchange(stream: &mut TcpStream, line: &str, expected: &str) {
    stream.write_all(line.as_bytes()).expect("send request");
    assert_eq!(read_text(stream, expected.len()), expected);
}

/// Open descriptors of the current process.
pub fn open_fd_count() -> usize {
    fs::read_dir("/proc/self/fd").expect("read /proc/self/fd").count()
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
}
