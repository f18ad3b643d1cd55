// std
use std::collections::VecDeque;
// self
use crate::{_prelude::*, clock::Clock, error::TransientError, obs};

/// Circuit breaker thresholds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
	/// Whether calls are guarded by a breaker at all.
	pub enabled: bool,
	/// Failures inside `failure_window` that open the circuit.
	pub failure_threshold: u32,
	/// Sliding window used to count failures.
	pub failure_window: Duration,
	/// Cool-down before a half-open probe is admitted.
	pub break_duration: Duration,
}
impl CircuitBreakerConfig {
	/// Configuration that never opens.
	pub fn disabled() -> Self {
		Self { enabled: false, ..Default::default() }
	}
}
impl Default for CircuitBreakerConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			failure_threshold: 5,
			failure_window: Duration::seconds(60),
			break_duration: Duration::seconds(30),
		}
	}
}

/// Observable breaker state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CircuitState {
	/// Calls flow normally.
	Closed,
	/// Calls fail fast until the cool-down elapses.
	Open,
	/// One probe call decides whether to close or reopen.
	HalfOpen,
}
impl CircuitState {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CircuitState::Closed => "closed",
			CircuitState::Open => "open",
			CircuitState::HalfOpen => "half_open",
		}
	}
}
impl Display for CircuitState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

#[derive(Debug)]
struct BreakerState {
	state: CircuitState,
	failures: VecDeque<OffsetDateTime>,
	opened_at: Option<OffsetDateTime>,
	probe_in_flight: bool,
}

/// Failure tracker for one logical endpoint.
///
/// Only failures classified by [`Error::trips_breaker`] count; any other outcome, including
/// authentication and validation errors, counts as a healthy response from the endpoint.
pub struct CircuitBreaker {
	endpoint: String,
	config: CircuitBreakerConfig,
	clock: Arc<dyn Clock>,
	inner: Mutex<BreakerState>,
}
impl CircuitBreaker {
	/// Creates a closed breaker for `endpoint`.
	pub fn new(
		endpoint: impl Into<String>,
		config: CircuitBreakerConfig,
		clock: Arc<dyn Clock>,
	) -> Self {
		Self {
			endpoint: endpoint.into(),
			config,
			clock,
			inner: Mutex::new(BreakerState {
				state: CircuitState::Closed,
				failures: VecDeque::new(),
				opened_at: None,
				probe_in_flight: false,
			}),
		}
	}

	/// Current state; an open breaker whose cool-down has elapsed reports
	/// [`CircuitState::HalfOpen`].
	pub fn state(&self) -> CircuitState {
		let inner = self.inner.lock();

		match inner.state {
			CircuitState::Open if self.cool_down_left(&inner).is_none() => CircuitState::HalfOpen,
			state => state,
		}
	}

	/// Admits a call or fails fast with [`TransientError::CircuitOpen`].
	pub(crate) fn acquire(self: &Arc<Self>) -> Result<CircuitPermit> {
		let mut inner = self.inner.lock();
		let probe = match inner.state {
			CircuitState::Closed => false,
			CircuitState::Open => match self.cool_down_left(&inner) {
				Some(retry_in) => return Err(self.open_error(retry_in)),
				None => {
					self.transition(&mut inner, CircuitState::HalfOpen);

					true
				},
			},
			CircuitState::HalfOpen if inner.probe_in_flight =>
				return Err(self.open_error(Duration::ZERO)),
			CircuitState::HalfOpen => true,
		};

		if probe {
			inner.probe_in_flight = true;
		}

		Ok(CircuitPermit { breaker: Arc::clone(self), probe, settled: false })
	}

	fn record_success(&self, probe: bool) {
		let mut inner = self.inner.lock();

		if probe {
			inner.probe_in_flight = false;
			inner.failures.clear();
			inner.opened_at = None;

			self.transition(&mut inner, CircuitState::Closed);
		}
	}

	fn record_failure(&self, probe: bool) {
		let now = self.clock.now();
		let mut inner = self.inner.lock();

		if probe {
			inner.probe_in_flight = false;

			self.open(&mut inner, now);

			return;
		}
		if inner.state != CircuitState::Closed {
			return;
		}

		let horizon = now.saturating_sub(self.config.failure_window);

		inner.failures.push_back(now);

		while inner.failures.front().is_some_and(|at| *at <= horizon) {
			inner.failures.pop_front();
		}

		if inner.failures.len() >= self.config.failure_threshold as usize {
			self.open(&mut inner, now);
		}
	}

	fn release_probe(&self) {
		self.inner.lock().probe_in_flight = false;
	}

	fn open(&self, inner: &mut BreakerState, now: OffsetDateTime) {
		inner.failures.clear();
		inner.opened_at = Some(now);

		self.transition(inner, CircuitState::Open);
	}

	fn cool_down_left(&self, inner: &BreakerState) -> Option<Duration> {
		let reopen_at = inner.opened_at?.saturating_add(self.config.break_duration);
		let left = reopen_at - self.clock.now();

		left.is_positive().then_some(left)
	}

	fn transition(&self, inner: &mut BreakerState, to: CircuitState) {
		let from = inner.state;

		if from == to {
			return;
		}

		inner.state = to;

		obs::emit_circuit_transition(&self.endpoint, from.as_str(), to.as_str());
		obs::record_circuit_transition(&self.endpoint, to.as_str());
	}

	fn open_error(&self, retry_in: Duration) -> Error {
		TransientError::CircuitOpen { endpoint: self.endpoint.clone(), retry_in }.into()
	}
}
impl Debug for CircuitBreaker {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CircuitBreaker")
			.field("endpoint", &self.endpoint)
			.field("config", &self.config)
			.field("state", &self.inner.lock().state)
			.finish()
	}
}

/// Admission ticket for one guarded call; a dropped probe frees the half-open slot.
#[derive(Debug)]
pub(crate) struct CircuitPermit {
	breaker: Arc<CircuitBreaker>,
	probe: bool,
	settled: bool,
}
impl CircuitPermit {
	pub(crate) fn record<T>(mut self, outcome: &Result<T>) {
		self.settled = true;

		match outcome {
			Err(err) if err.trips_breaker() => self.breaker.record_failure(self.probe),
			_ => self.breaker.record_success(self.probe),
		}
	}
}
impl Drop for CircuitPermit {
	fn drop(&mut self) {
		if self.probe && !self.settled {
			self.breaker.release_probe();
		}
	}
}
