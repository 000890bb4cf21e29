//! Retry with jittered exponential backoff.
//!
//! Only errors whose [`ClientError::is_retryable`] verdict is true (429, 408,
//! 503 and transport timeouts) are retried. The inter-attempt sleep observes a
//! [`CancellationToken`] and aborts with [`ClientError::Cancelled`] as soon as
//! it fires.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ClientError;

/// Maximum retries applied when none is configured.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Fraction of the interval added or removed by jitter.
const JITTER_RATIO: f64 = 0.15;

/// Exponential backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Upper bound for the (unjittered) delay.
    pub max_interval: Duration,
    /// Growth factor applied after every retry.
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Per-invocation backoff state. Never shared between concurrent calls.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    current: Duration,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            current: config.initial_interval,
            config,
        }
    }

    /// Interval the next sleep is based on, before jitter.
    pub fn current_interval(&self) -> Duration {
        self.current
    }

    /// Return the jittered delay for this attempt and grow the interval.
    pub fn next_delay(&mut self) -> Duration {
        let delay = jitter(self.current);
        let max = self.config.max_interval;
        let grown = self.current.as_secs_f64() * self.config.multiplier;
        // NaN and negative growth collapse to zero; overflow saturates at max.
        self.current = Duration::try_from_secs_f64(grown.max(0.0)).map_or(max, |d| d.min(max));
        delay
    }
}

/// Uniform multiplicative jitter in `[0.85, 1.15] * interval`.
fn jitter(interval: Duration) -> Duration {
    if interval.is_zero() {
        return interval;
    }
    let factor = rand::thread_rng().gen_range((1.0 - JITTER_RATIO)..=(1.0 + JITTER_RATIO));
    Duration::try_from_secs_f64(interval.as_secs_f64() * factor).unwrap_or(interval)
}

/// Run `operation` up to `max_retries + 1` times.
///
/// Returns the first success, or the last error verbatim once it is
/// non-retryable or the retry budget is spent.
///
/// # Example
/// ```no_run
/// use openrouter::retry::{retry, BackoffConfig};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn demo() -> Result<(), openrouter::ClientError> {
/// let cancel = CancellationToken::new();
/// let value = retry(&cancel, 3, &BackoffConfig::default(), || async {
///     Ok::<_, openrouter::ClientError>(42)
/// })
/// .await?;
/// assert_eq!(value, 42);
/// # Ok(())
/// # }
/// ```
pub async fn retry<T, F, Fut>(
    cancel: &CancellationToken,
    max_retries: u32,
    config: &BackoffConfig,
    mut operation: F,
) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let mut backoff = Backoff::new(*config);
    let mut attempt = 0;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retryable() {
            return Err(err);
        }
        if attempt >= max_retries {
            debug!("retry budget of {max_retries} exhausted");
            return Err(err);
        }

        let delay = backoff.next_delay();
        attempt += 1;
        warn!("retryable error ({err}), attempt {attempt}/{max_retries} in {delay:?}");

        tokio::select! {
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
