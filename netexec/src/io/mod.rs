//! Side-effecting parts of the daemon: sockets, files and child processes.

pub mod capture;
pub mod config;
pub mod listener;
pub mod process;
pub mod relay;
