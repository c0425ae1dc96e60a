//! Retry policy for provider calls.

use std::time::Duration;

use crate::http_client::{HttpError, HttpErrorKind, HttpResponse};

/// Statuses worth another attempt: request timeout, throttling, server errors.
const TRANSIENT_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Wait between two attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed(Duration),
    /// Starts at `initial` and multiplies by `multiplier` per attempt up to
    /// `ceiling`. With `jitter` the wait lands anywhere in 50%..150%.
    Exponential {
        initial: Duration,
        multiplier: f64,
        ceiling: Duration,
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            initial: Duration::from_millis(500),
            multiplier: 2.0,
            ceiling: Duration::from_secs(8),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Wait after the failed attempt numbered `attempt`, counting from zero.
    pub fn wait(self, attempt: u32) -> Duration {
        let (initial, multiplier, ceiling, jitter) = match self {
            Self::Fixed(wait) => return wait,
            Self::Exponential {
                initial,
                multiplier,
                ceiling,
                jitter,
            } => (initial, multiplier, ceiling, jitter),
        };

        let scaled = multiplier.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
        let millis = (initial.as_millis() as f64 * scaled)
            .min(ceiling.as_millis() as f64)
            .round() as u64;
        if jitter {
            Duration::from_millis(millis / 2 + fastrand::u64(0..=millis))
        } else {
            Duration::from_millis(millis)
        }
    }
}

/// How many times a provider call is repeated and how long to wait between.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts after the first one.
    pub max_retries: u32,
    pub backoff: Backoff,
    /// Retry transport timeouts and refused connections.
    pub retry_transport: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Backoff::default(),
            retry_transport: true,
        }
    }
}

impl RetryConfig {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn fixed(wait: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Fixed(wait),
            retry_transport: true,
        }
    }

    /// Wait before the next attempt, or `None` when `outcome` is final.
    pub fn next_wait(
        &self,
        attempt: u32,
        outcome: &Result<HttpResponse, HttpError>,
    ) -> Option<Duration> {
        if attempt >= self.max_retries || !self.is_transient(outcome) {
            return None;
        }
        Some(self.backoff.wait(attempt))
    }

    fn is_transient(&self, outcome: &Result<HttpResponse, HttpError>) -> bool {
        match outcome {
            Ok(response) => TRANSIENT_STATUSES.contains(&response.status),
            Err(error) => {
                self.retry_transport
                    && matches!(error.kind(), HttpErrorKind::Timeout | HttpErrorKind::Connect)
            }
        }
    }
}
