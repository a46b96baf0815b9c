//! Lamport logical clock.
//!
//! One instance per process, shared as `Arc<LogicalClock>`. Only two
//! mutations exist:
//! - `tick`: `clock <- clock + 1` (local send)
//! - `merge(v)`: `clock <- max(clock, v) + 1` (observed external value)
//!
//! Both are single compare-and-swap loops on one atomic, so they are
//! atomic with respect to each other without a lock.

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide Lamport clock.
#[derive(Debug, Default)]
pub struct LogicalClock {
    value: AtomicU64,
}

impl LogicalClock {
    /// Create a clock starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance for a local send. Returns the value to attach.
    pub fn tick(&self) -> u64 {
        self.update(|current| current + 1)
    }

    /// Merge a value observed on a received message. Returns the new value.
    pub fn merge(&self, observed: u64) -> u64 {
        self.update(|current| current.max(observed) + 1)
    }

    /// Read-only snapshot.
    pub fn current(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }

    fn update(&self, rule: impl Fn(u64) -> u64) -> u64 {
        let mut current = self.value.load(Ordering::SeqCst);
        loop {
            let next = rule(current);
            match self
                .value
                .compare_exchange_weak(current, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Extract a mergeable clock value from a JSON field.
///
/// Only positive integers qualify; zero, negatives, floats and
/// non-numbers are ignored.
pub fn positive_clock(value: Option<&serde_json::Value>) -> Option<u64> {
    value.and_then(serde_json::Value::as_u64).filter(|v| *v > 0)
}
