//! Randomized pacing between provider calls.
//!
//! Unofficial quote endpoints throttle bursts of requests from one client. A
//! random pause before each call spreads per-symbol fetches out enough to stay
//! under those limits.

use std::str::FromStr;
use std::time::Duration;

use crate::ValidationError;

/// Inclusive `[min, max]` delay range applied before each provider call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestPacing {
    range: Option<(Duration, Duration)>,
}

impl RequestPacing {
    /// No delay between calls.
    pub const fn disabled() -> Self {
        Self { range: None }
    }

    pub fn between(min: Duration, max: Duration) -> Result<Self, ValidationError> {
        if min > max {
            return Err(ValidationError::InvalidDelayRange {
                value: format!("{}-{}", min.as_millis(), max.as_millis()),
            });
        }
        Ok(Self {
            range: Some((min, max)),
        })
    }

    pub const fn is_enabled(self) -> bool {
        self.range.is_some()
    }

    /// Draw the next delay.
    pub fn next_delay(self) -> Duration {
        match self.range {
            None => Duration::ZERO,
            Some((min, max)) => {
                let min_ms = u64::try_from(min.as_millis()).unwrap_or(u64::MAX);
                let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
                Duration::from_millis(fastrand::u64(min_ms..=max_ms))
            }
        }
    }

    /// Sleep for a freshly drawn delay.
    pub async fn pause(self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            tracing::debug!(delay_ms = delay.as_millis() as u64, "pacing provider call");
            tokio::time::sleep(delay).await;
        }
    }
}

impl FromStr for RequestPacing {
    type Err = ValidationError;

    /// Accepts `off`, `0`, `MS`, or `MIN-MAX` in milliseconds.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("off") || trimmed == "0" {
            return Ok(Self::disabled());
        }

        let invalid = || ValidationError::InvalidDelayRange {
            value: value.to_owned(),
        };
        let parse_ms = |part: &str| part.trim().parse::<u64>().map_err(|_| invalid());

        let (min, max) = match trimmed.split_once('-') {
            Some((min, max)) => (parse_ms(min)?, parse_ms(max)?),
            None => {
                let fixed = parse_ms(trimmed)?;
                (fixed, fixed)
            }
        };
        if min > max {
            return Err(invalid());
        }

        Self::between(Duration::from_millis(min), Duration::from_millis(max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ranges_and_fixed_delays() {
        let pacing: RequestPacing = "2000-5000".parse().expect("range");
        for _ in 0..20 {
            let delay = pacing.next_delay();
            assert!(delay >= Duration::from_secs(2) && delay <= Duration::from_secs(5));
        }

        let fixed: RequestPacing = "250".parse().expect("fixed");
        assert_eq!(fixed.next_delay(), Duration::from_millis(250));
    }

    #[test]
    fn off_and_zero_disable_pacing() {
        for value in ["", "off", "OFF", "0"] {
            let pacing: RequestPacing = value.parse().expect("disabled");
            assert!(!pacing.is_enabled());
            assert_eq!(pacing.next_delay(), Duration::ZERO);
        }
    }

    #[test]
    fn rejects_inverted_or_malformed_ranges() {
        for value in ["5000-2000", "fast", "1-2-3", "-5"] {
            assert!(
                matches!(
                    value.parse::<RequestPacing>(),
                    Err(ValidationError::InvalidDelayRange { .. })
                ),
                "{value:?} should be rejected"
            );
        }
    }
}
