//! Minimal remote command execution daemon.
//!
//! Peers connect over TCP and send a whitespace-separated command line. The
//! daemon runs it as a child process with a wall-clock deadline and replies
//! with `Child exited with status <N>\n` followed by the child's stdout (on
//! success) or stderr (otherwise). A connection serves any number of requests,
//! one at a time. There is no authentication: this is a bare primitive.
//!
//! - **[`core`]**: Pure, deterministic logic (tokenizing, outcome classification).
//! - **[`io`]**: Sockets, capture files, child processes and configuration.
//!
//! [`connection`] drives one peer through request/response cycles and
//! [`server`] accepts peers and gives each its own handler thread.

pub mod connection;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod limiter;
pub mod logging;
pub mod protocol;
pub mod server;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
