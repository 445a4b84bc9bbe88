//! Exponential backoff for page loads.
//!
//! [`RetryFetch`] wraps any [`PageFetcher`] and retries transient load
//! failures ([`ScrapeError::Fetch`]). Other errors pass through untouched.
//!
//! # Retry Strategy
//!
//! - 3 attempts in total by default
//! - Exponential backoff starting at 1 second
//! - Delay capped at 5 seconds
//! - Random jitter (0-250ms) on top of each delay

use crate::browser::{PageFetcher, PageSnapshot};
use crate::error::ScrapeError;
use rand::{Rng, rng};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, instrument, warn};

pub const DEFAULT_ATTEMPTS: usize = 3;

/// Decorator adding bounded retries with exponential backoff.
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryFetch<T> {
    inner: T,
    /// Total attempts, including the first.
    max_attempts: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl<T> RetryFetch<T>
where
    T: PageFetcher,
{
    /// Wrap `inner` with retries.
    ///
    /// # Arguments
    ///
    /// * `inner` - The fetcher to retry
    /// * `max_attempts` - Total attempts per page including the first; `0` is treated as `1`
    /// * `base_delay` - Delay before the second attempt, doubled each time up to the cap
    ///
    /// # Returns
    ///
    /// A fetcher that only retries [`ScrapeError::Fetch`] failures.
    pub fn new(inner: T, max_attempts: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(5),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    fn backoff(&self, attempt: usize) -> Duration {
        let exp = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX).min(16);
        self.base_delay.saturating_mul(1 << exp).min(self.max_delay)
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> PageFetcher for RetryFetch<T>
where
    T: PageFetcher,
{
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<PageSnapshot, ScrapeError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.fetch(url).await {
                Ok(page) => return Ok(page),
                Err(ScrapeError::Fetch { source, .. }) => {
                    attempt += 1;
                    let total_dt = total_t0.elapsed();

                    if attempt >= self.max_attempts {
                        error!(
                            attempt,
                            max = self.max_attempts,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %source,
                            "fetch exhausted retries"
                        );
                        return Err(ScrapeError::Fetch {
                            url: url.to_string(),
                            attempts: attempt,
                            source,
                        });
                    }

                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = self.backoff(attempt) + Duration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_attempts,
                        elapsed_ms_total = total_dt.as_millis() as u64,
                        ?delay,
                        error = %source,
                        "fetch attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
                Err(other) => return Err(other),
            }
        }
    }
}
