//! Bounded retry policy shared by readiness polling and ingestion backoff.
//!
//! A [`RetryPolicy`] answers two questions: how many attempts an operation
//! gets, and how long to wait after a given failed attempt. Delays are
//! either fixed or doubling per attempt, always capped at `max_delay`.
//!
//! ```rust
//! use apod_search::retry::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::exponential(5, Duration::from_millis(100));
//! assert_eq!(policy.delay_for(1), Duration::from_millis(100));
//! assert_eq!(policy.delay_for(3), Duration::from_millis(400));
//! ```

use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    #[default]
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
    pub max_delay: Duration,
}

/// Returned by [`RetryPolicy::run`] once every attempt has failed.
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub last_error: Option<E>,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            backoff: Backoff::Fixed,
            max_delay: delay,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff: Backoff::Exponential,
            max_delay: Duration::from_secs(32).max(base_delay),
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Exponential => {
                let shift = attempt.saturating_sub(1).min(16);
                self.base_delay.saturating_mul(1u32 << shift)
            }
        };
        delay.min(self.max_delay.max(self.base_delay))
    }

    /// Sleep for the delay that follows failed attempt `attempt`.
    pub async fn wait(&self, attempt: u32) {
        let delay = self.delay_for(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// Run `op` until it succeeds or the attempt budget is spent.
    ///
    /// `op` receives the 1-based attempt number. No delay follows the final
    /// attempt.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, Exhausted<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => last_error = Some(e),
            }
            if attempt < self.max_attempts {
                self.wait(attempt).await;
            }
        }
        Err(Exhausted {
            attempts: self.max_attempts,
            last_error,
        })
    }
}
