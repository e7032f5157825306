//! Admission control: a token pool bounding live connection handlers.
//!
//! The pool is a bounded channel pre-filled with one token per slot. Taking a
//! token admits a connection; dropping its [`Permit`] puts the token back.

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded};
use tracing::warn;

/// Bounds the number of concurrently served connections.
#[derive(Debug, Clone)]
pub struct ConnectionLimiter {
    tokens: Receiver<()>,
    returns: Sender<()>,
    max: usize,
}

/// A slot held for the lifetime of one connection handler.
#[derive(Debug)]
pub struct Permit {
    returns: Sender<()>,
}

impl ConnectionLimiter {
    pub fn new(max: usize) -> Self {
        let (returns, tokens) = bounded(max);
        for _ in 0..max {
            // The channel holds exactly `max` tokens, so filling it never blocks.
            let _ = returns.try_send(());
        }
        Self {
            tokens,
            returns,
            max,
        }
    }

    /// Block until a slot is free.
    pub fn acquire(&self) -> Permit {
        // The limiter owns a sender, so the channel can never disconnect.
        let _ = self.tokens.recv();
        self.permit()
    }

    /// Take a slot if one is free right now.
    pub fn try_acquire(&self) -> Option<Permit> {
        match self.tokens.try_recv() {
            Ok(()) => Some(self.permit()),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Number of permits currently held.
    pub fn live(&self) -> usize {
        self.max - self.tokens.len()
    }

    fn permit(&self) -> Permit {
        Permit {
            returns: self.returns.clone(),
        }
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if self.returns.try_send(()).is_err() {
            warn!("connection slot could not be returned");
        }
    }
}
