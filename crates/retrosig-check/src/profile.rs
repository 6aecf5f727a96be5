//! Sampled timing of fixed-arity validation.
//!
//! Every `sample_rate`-th call through a fast or medium validator measures
//! the time spent checking (not the body) and accumulates it here. Counters
//! are relaxed atomics and approximate under concurrency; the snapshot
//! extrapolates totals from the samples.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

pub const DEFAULT_SAMPLE_RATE: u64 = 101;

#[derive(Debug)]
pub struct Profile {
    sample_rate: u64,
    attempts: AtomicU64,
    samples: AtomicU64,
    duration_ns: AtomicU64,
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProfileSnapshot {
    pub samples: u64,
    pub sampled_duration_ns: u64,
    /// `samples * sample_rate`.
    pub estimated_checks: u64,
    /// `sampled_duration_ns * sample_rate`.
    pub estimated_duration_ns: u64,
    pub sample_rate: u64,
}

impl Profile {
    pub fn new(sample_rate: u64) -> Self {
        Profile {
            sample_rate: sample_rate.max(1),
            attempts: AtomicU64::new(0),
            samples: AtomicU64::new(0),
            duration_ns: AtomicU64::new(0),
        }
    }

    pub fn sample_rate(&self) -> u64 {
        self.sample_rate
    }

    /// Counts one call; returns `true` when this call should be timed.
    #[inline]
    pub fn should_sample(&self) -> bool {
        let n = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        if n % self.sample_rate == 0 {
            self.samples.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    pub fn record(&self, elapsed: Duration) {
        let ns = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.duration_ns.fetch_add(ns, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProfileSnapshot {
        let samples = self.samples.load(Ordering::Relaxed);
        let sampled_duration_ns = self.duration_ns.load(Ordering::Relaxed);
        ProfileSnapshot {
            samples,
            sampled_duration_ns,
            estimated_checks: samples.saturating_mul(self.sample_rate),
            estimated_duration_ns: sampled_duration_ns.saturating_mul(self.sample_rate),
            sample_rate: self.sample_rate,
        }
    }

    pub fn reset(&self) {
        self.attempts.store(0, Ordering::Relaxed);
        self.samples.store(0, Ordering::Relaxed);
        self.duration_ns.store(0, Ordering::Relaxed);
    }
}

impl Default for Profile {
    fn default() -> Self {
        Profile::new(DEFAULT_SAMPLE_RATE)
    }
}
