//! Store writes under SQLite lock contention
//!
//! Every write in [`crate::store`] goes through [`retry_on_lock`]. Only "database
//! is locked" is treated as transient; everything else surfaces at once.

use std::time::{Duration, Instant};
use trawl_common::{Error, Result};

/// Doubling delay schedule, 10ms up to a 1s ceiling
#[derive(Debug, Clone, Copy)]
struct Backoff {
    next_ms: u64,
}

impl Backoff {
    const FIRST_MS: u64 = 10;
    const CEILING_MS: u64 = 1000;

    fn new() -> Self {
        Self { next_ms: Self::FIRST_MS }
    }

    fn step(&mut self) -> Duration {
        let delay = Duration::from_millis(self.next_ms);
        self.next_ms = (self.next_ms * 2).min(Self::CEILING_MS);
        delay
    }
}

/// Run `operation`, retrying lock contention until `max_wait_ms` has passed
///
/// The deadline is checked after each failed attempt, so at least one attempt
/// always runs. Giving up yields `Error::Internal` naming `operation_name`.
pub async fn retry_on_lock<F, Fut, T>(
    operation_name: &str,
    max_wait_ms: u64,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let started = Instant::now();
    let deadline = Duration::from_millis(max_wait_ms);
    let mut backoff = Backoff::new();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let err = match operation().await {
            Ok(value) => {
                if attempts > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempts,
                        waited_ms = started.elapsed().as_millis() as u64,
                        "Store write went through after lock contention"
                    );
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_lock_contention() {
            return Err(err);
        }

        let waited = started.elapsed();
        if waited >= deadline {
            tracing::error!(
                operation = operation_name,
                attempts,
                waited_ms = waited.as_millis() as u64,
                max_wait_ms,
                "Giving up on locked database"
            );
            return Err(Error::Internal(format!(
                "{}: database locked after {} attempts over {} ms (limit {} ms)",
                operation_name,
                attempts,
                waited.as_millis(),
                max_wait_ms
            )));
        }

        let delay = backoff.step();
        tracing::warn!(
            operation = operation_name,
            attempts,
            delay_ms = delay.as_millis() as u64,
            "Database locked, backing off"
        );
        tokio::time::sleep(delay).await;
    }
}
