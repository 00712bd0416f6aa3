//! Retry policy and circuit breaker wrapping the network round trip, per
//! §4.10. Neither wraps cache storage: both operate purely on the async
//! fetch closure the transport is given.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::error::CacheError;

/// Configurable retry behavior for the network round trip.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first (non-retry) one.
    pub max_attempts: u32,
    /// Base delay for exponential backoff; attempt N waits roughly
    /// `base * 2^(N-1)` plus jitter.
    pub base_delay: Duration,
    /// Upper bound on any single backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Returns the backoff delay before attempt number `attempt` (1-based,
    /// where attempt 1 is the first retry), with +/-20% jitter.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        let capped = exp.min(self.max_delay);
        let jitter_frac = rand::thread_rng().gen_range(0.8..1.2);
        capped.mul_f64(jitter_frac)
    }

    /// Whether a failed attempt is worth retrying: network-class errors
    /// and the retriable 5xx statuses are eligible, anything else is not.
    #[must_use]
    pub fn is_retriable(&self, error: &CacheError) -> bool {
        match error {
            CacheError::Network(_) => true,
            CacheError::RevalidationServerError { status } => {
                matches!(status, 502 | 503 | 504)
            }
            _ => false,
        }
    }

    /// Runs `f`, retrying on retriable failures up to `max_attempts`
    /// times, sleeping [`backoff`] between attempts.
    pub async fn run<T, F, Fut>(&self, mut f: F) -> Result<T, CacheError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, CacheError>>,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(error) if attempt + 1 < self.max_attempts && self.is_retriable(&error) => {
                    attempt += 1;
                    tokio::time::sleep(self.backoff(attempt)).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: State,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
}

/// A closed/open/half-open circuit breaker guarding the network round
/// trip. Trips open after `failure_threshold` consecutive failures;
/// reopens to half-open after `open_duration`; closes again after
/// `success_threshold` consecutive successes while half-open, or reopens
/// on any half-open failure.
pub struct CircuitBreaker {
    failure_threshold: u32,
    success_threshold: u32,
    open_duration: Duration,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().unwrap();
        f.debug_struct("CircuitBreaker")
            .field("state", &inner.state)
            .field("consecutive_failures", &inner.consecutive_failures)
            .finish()
    }
}

impl CircuitBreaker {
    /// Builds a circuit breaker that opens after `failure_threshold`
    /// consecutive failures, waits `open_duration` before probing again,
    /// and requires `success_threshold` consecutive probe successes to
    /// fully close.
    #[must_use]
    pub fn new(failure_threshold: u32, success_threshold: u32, open_duration: Duration) -> Self {
        Self {
            failure_threshold,
            success_threshold,
            open_duration,
            inner: Mutex::new(Inner {
                state: State::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
            }),
        }
    }

    /// Returns true if a request should currently be rejected without
    /// reaching the network.
    #[must_use]
    pub fn is_open(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == State::Open {
            if let Some(opened_at) = inner.opened_at {
                if opened_at.elapsed() >= self.open_duration {
                    inner.state = State::HalfOpen;
                    inner.consecutive_successes = 0;
                    return false;
                }
            }
            return true;
        }
        false
    }

    /// Records a successful round trip.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            State::Closed => {
                inner.consecutive_failures = 0;
            }
            State::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.success_threshold {
                    inner.state = State::Closed;
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                    inner.opened_at = None;
                }
            }
            State::Open => {}
        }
    }

    /// Records a failed round trip.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            State::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    inner.state = State::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            State::HalfOpen => {
                inner.state = State::Open;
                inner.opened_at = Some(Instant::now());
                inner.consecutive_successes = 0;
            }
            State::Open => {}
        }
    }

    /// Runs `f` through the breaker: rejects immediately with
    /// [`CacheError::CircuitOpen`] while open, otherwise runs `f` and
    /// records the outcome.
    pub async fn run<T, F, Fut>(&self, f: F) -> Result<T, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, CacheError>>,
    {
        if self.is_open() {
            return Err(CacheError::CircuitOpen);
        }
        match f().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(error) => {
                self.record_failure();
                Err(error)
            }
        }
    }
}
