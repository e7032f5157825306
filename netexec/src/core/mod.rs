//! Deterministic, pure logic shared by the daemon.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! buffers and values and return deterministic outputs suitable for tests.

pub mod outcome;
pub mod tokenize;
