//! Counting gate for in-flight AI calls
//!
//! Waiters poll with exponential backoff; there is no fairness or ordering
//! guarantee between them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const INITIAL_POLL_MS: u64 = 5;
const MAX_POLL_MS: u64 = 100;

#[derive(Debug)]
pub struct ConcurrencyGate {
    in_flight: AtomicUsize,
    limit: usize,
}

impl ConcurrencyGate {
    /// A limit of zero is treated as one
    pub fn new(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            in_flight: AtomicUsize::new(0),
            limit: limit.max(1),
        })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Take a slot without waiting
    pub fn try_acquire(self: &Arc<Self>) -> Option<GatePermit> {
        let mut current = self.in_flight.load(Ordering::Acquire);
        while current < self.limit {
            match self.in_flight.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Some(GatePermit {
                        gate: Arc::clone(self),
                    })
                }
                Err(observed) => current = observed,
            }
        }
        None
    }

    /// Wait for a slot, polling with backoff
    pub async fn acquire(self: &Arc<Self>) -> GatePermit {
        let mut poll_ms = INITIAL_POLL_MS;
        loop {
            if let Some(permit) = self.try_acquire() {
                return permit;
            }
            tokio::time::sleep(Duration::from_millis(poll_ms)).await;
            poll_ms = (poll_ms * 2).min(MAX_POLL_MS);
        }
    }
}

/// Held while a call is in flight; releases its slot on drop
#[derive(Debug)]
pub struct GatePermit {
    gate: Arc<ConcurrencyGate>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.gate.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}
