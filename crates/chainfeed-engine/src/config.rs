//! Engine configuration.

use std::time::Duration;

/// Retry policy for transient submission failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total submission attempts, including the first.
    pub max_attempts: u32,

    /// Fixed pause between attempts.
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(250),
        }
    }
}

impl RetryConfig {
    /// A policy with no pause between attempts (tests, local ledgers).
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            delay: Duration::ZERO,
            ..Default::default()
        }
    }

    /// Set the number of attempts. Values below one are treated as one.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the pause between attempts.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Configuration shared by the reader, writer and monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedConfig {
    /// Retry policy for posts.
    pub retry: RetryConfig,

    /// Upper bound on hops in a single walk.
    /// A chain longer than this is reported as corrupt (likely a cycle).
    pub max_walk_steps: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            max_walk_steps: 1_000_000,
        }
    }
}

impl FeedConfig {
    /// Set the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the walk step cap.
    #[must_use]
    pub fn with_max_walk_steps(mut self, steps: usize) -> Self {
        self.max_walk_steps = steps.max(1);
        self
    }
}
