//! Bounded exponential backoff for transient failures.

use backon::{ExponentialBuilder, Retryable};
use std::future::Future;
use std::time::Duration;

/// Upper bound on a server-requested delay.
pub const MAX_HINTED_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; zero disables retrying.
    pub max_retries: usize,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.base_delay.saturating_mul(32))
            .with_max_times(self.max_retries)
            .with_jitter()
    }

    /// Run `op`, retrying while `retryable` holds. `notify` sees each error
    /// that is about to be retried together with the sleep before the retry.
    pub async fn run<T, E, F, Fut, P, N>(&self, op: F, retryable: P, notify: N) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnMut(&E) -> bool,
        N: FnMut(&E, Duration),
    {
        self.run_with_hint(op, retryable, |_: &E| None, notify).await
    }

    /// Like [`run`](Self::run), but an error may ask for a longer wait.
    ///
    /// The sleep before the next attempt is the larger of the backoff delay
    /// and `hint(err)`, with the hint capped at [`MAX_HINTED_DELAY`]. The
    /// attempt budget is unchanged.
    pub async fn run_with_hint<T, E, F, Fut, P, H, N>(
        &self,
        op: F,
        retryable: P,
        mut hint: H,
        notify: N,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnMut(&E) -> bool,
        H: FnMut(&E) -> Option<Duration>,
        N: FnMut(&E, Duration),
    {
        op.retry(self.backoff())
            .when(retryable)
            .adjust(move |err: &E, delay: Option<Duration>| {
                delay.map(|d| match hint(err) {
                    Some(h) => h.min(MAX_HINTED_DELAY).max(d),
                    None => d,
                })
            })
            .notify(notify)
            .await
    }
}
