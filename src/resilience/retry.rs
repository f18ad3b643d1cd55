// crates.io
use rand::Rng;
// self
use crate::_prelude::*;

/// Retry behavior for transient failures (network errors, timeouts, 429, 5xx).
///
/// The delay before retry `n` (1-based) is `min(base_delay * multiplier^(n-1), max_delay)`, or a
/// constant `base_delay` when `exponential` is off, plus uniform jitter in `[0, max_jitter]`. A
/// server `Retry-After` hint, capped at `max_delay`, replaces the computed delay when longer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
	/// Whether failed attempts are retried at all.
	pub enabled: bool,
	/// Retries after the first attempt.
	pub max_retries: u32,
	/// Delay before the first retry.
	pub base_delay: Duration,
	/// Upper bound for any single delay.
	pub max_delay: Duration,
	/// Growth factor between consecutive delays.
	pub multiplier: f64,
	/// Upper bound for the random jitter added to each delay.
	pub max_jitter: Duration,
	/// Grow delays geometrically instead of keeping them constant.
	pub exponential: bool,
	/// Add random jitter to each delay.
	pub jitter: bool,
}
impl RetryPolicy {
	/// Policy that never retries.
	pub fn disabled() -> Self {
		Self { enabled: false, ..Default::default() }
	}

	/// Total attempts including the first one.
	pub fn max_attempts(&self) -> u32 {
		if self.enabled { self.max_retries.saturating_add(1) } else { 1 }
	}

	/// Deterministic part of the delay before retry `retry` (1-based).
	pub fn backoff(&self, retry: u32) -> Duration {
		if !self.exponential {
			return self.base_delay.min(self.max_delay);
		}

		let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
		let secs = self.base_delay.as_seconds_f64() * self.multiplier.powi(exponent);

		if !secs.is_finite() || secs >= self.max_delay.as_seconds_f64() {
			self.max_delay
		} else {
			Duration::seconds_f64(secs.max(0.))
		}
	}

	pub(crate) fn delay_for(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
		let delay = self.backoff(retry) + self.sample_jitter();

		match retry_after {
			Some(hint) => delay.max(hint.min(self.max_delay)),
			None => delay,
		}
	}

	fn sample_jitter(&self) -> Duration {
		if !self.jitter || !self.max_jitter.is_positive() {
			return Duration::ZERO;
		}

		Duration::seconds_f64(rand::rng().random_range(0.0..=self.max_jitter.as_seconds_f64()))
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			enabled: true,
			max_retries: 3,
			base_delay: Duration::seconds(1),
			max_delay: Duration::seconds(30),
			multiplier: 2.,
			max_jitter: Duration::seconds(1),
			exponential: true,
			jitter: true,
		}
	}
}
