//! Stable exit codes for the daemon binary.
//!
//! The daemon never exits on its own once serving; these only cover startup.
//! Command-line parse errors are reported by clap with its usual code 2.

/// Bad configuration, or the command socket could not be created, bound or listened on.
pub const STARTUP_FAILURE: i32 = 1;
