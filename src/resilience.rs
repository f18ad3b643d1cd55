//! Timeout, retry, and circuit breaker policies for outbound calls.
//!
//! Composition order, innermost first: the timeout bounds each attempt, the retry loop
//! repeats attempts that failed transiently, and the circuit breaker wraps the whole retry
//! sequence so it reacts to sustained failure instead of one slow attempt. Breakers are kept
//! per logical endpoint inside one [`ResiliencePolicy`]; share the policy behind an [`Arc`] to
//! share breaker state process-wide.

/// Per-endpoint circuit breaker.
pub mod circuit;
/// Backoff schedule for transient failures.
pub mod retry;
/// Attempt deadlines.
pub mod timeout;

pub use circuit::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use retry::RetryPolicy;
pub use timeout::TimeoutPolicy;

// self
use crate::{
	_prelude::*,
	clock::{Clock, SystemClock},
	obs,
};

/// Serializable bundle of the three policies.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceOptions {
	/// Retry behavior.
	pub retry: RetryPolicy,
	/// Circuit breaker thresholds.
	pub circuit_breaker: CircuitBreakerConfig,
	/// Attempt deadlines.
	pub timeout: TimeoutPolicy,
}
impl ResilienceOptions {
	/// Options with every policy switched off; each call runs exactly once, unbounded.
	pub fn disabled() -> Self {
		Self {
			retry: RetryPolicy::disabled(),
			circuit_breaker: CircuitBreakerConfig::disabled(),
			timeout: TimeoutPolicy::disabled(),
		}
	}
}

/// Executes outbound calls under the configured timeout, retry, and breaker policies.
pub struct ResiliencePolicy {
	options: ResilienceOptions,
	clock: Arc<dyn Clock>,
	breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}
impl ResiliencePolicy {
	/// Creates a policy driven by the system clock.
	pub fn new(options: ResilienceOptions) -> Self {
		Self { options, clock: Arc::new(SystemClock), breakers: Default::default() }
	}

	/// Replaces the clock used for breaker windows and cool-downs.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Configured policies.
	pub fn options(&self) -> &ResilienceOptions {
		&self.options
	}

	/// Breaker state for `endpoint`; endpoints never called report [`CircuitState::Closed`].
	pub fn circuit_state(&self, endpoint: &str) -> CircuitState {
		self.breakers.lock().get(endpoint).map_or(CircuitState::Closed, |breaker| breaker.state())
	}

	/// Runs `operation` against `endpoint` with the per-attempt deadline.
	///
	/// `operation` is invoked once per attempt and must build a fresh future each time.
	pub async fn execute<T, F, Fut>(&self, endpoint: &str, operation: F) -> Result<T>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		self.run(endpoint, self.options.timeout.per_attempt, operation).await
	}

	/// Same as [`execute`](Self::execute) with the long-running deadline.
	pub async fn execute_long_running<T, F, Fut>(&self, endpoint: &str, operation: F) -> Result<T>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		self.run(endpoint, self.options.timeout.long_running, operation).await
	}

	async fn run<T, F, Fut>(&self, endpoint: &str, budget: Duration, operation: F) -> Result<T>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		if !self.options.circuit_breaker.enabled {
			return self.retry(endpoint, budget, operation).await;
		}

		let permit = self.breaker(endpoint).acquire()?;
		let outcome = self.retry(endpoint, budget, operation).await;

		permit.record(&outcome);

		outcome
	}

	async fn retry<T, F, Fut>(&self, endpoint: &str, budget: Duration, mut operation: F) -> Result<T>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let policy = &self.options.retry;
		let mut retry = 0;

		loop {
			match self.options.timeout.bound(budget, operation()).await {
				Ok(value) => return Ok(value),
				Err(err) if retry + 1 < policy.max_attempts() && err.is_retryable() => {
					retry += 1;

					let delay = policy.delay_for(retry, err.retry_after());

					obs::emit_retry_scheduled(endpoint, retry, delay, &err);
					obs::record_retry(endpoint);

					tokio::time::sleep(std::time::Duration::try_from(delay).unwrap_or_default())
						.await;
				},
				Err(err) => return Err(err),
			}
		}
	}

	fn breaker(&self, endpoint: &str) -> Arc<CircuitBreaker> {
		let mut breakers = self.breakers.lock();

		match breakers.get(endpoint) {
			Some(breaker) => Arc::clone(breaker),
			None => {
				let breaker = Arc::new(CircuitBreaker::new(
					endpoint,
					self.options.circuit_breaker.clone(),
					Arc::clone(&self.clock),
				));

				breakers.insert(endpoint.to_owned(), Arc::clone(&breaker));

				breaker
			},
		}
	}
}
impl Default for ResiliencePolicy {
	fn default() -> Self {
		Self::new(ResilienceOptions::default())
	}
}
impl Debug for ResiliencePolicy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ResiliencePolicy")
			.field("options", &self.options)
			.field("endpoints", &self.breakers.lock().len())
			.finish()
	}
}
