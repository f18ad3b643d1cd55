// self
use crate::{_prelude::*, error::TransportError};

/// Deadlines applied to individual attempts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutPolicy {
	/// Whether attempts are bounded at all.
	pub enabled: bool,
	/// Budget for one token endpoint attempt.
	pub per_attempt: Duration,
	/// Budget for slower outbound calls routed through
	/// [`ResiliencePolicy::execute_long_running`](crate::resilience::ResiliencePolicy::execute_long_running).
	pub long_running: Duration,
}
impl TimeoutPolicy {
	/// Policy that never cuts an attempt short.
	pub fn disabled() -> Self {
		Self { enabled: false, ..Default::default() }
	}

	/// Runs `attempt`, failing with [`TransportError::Timeout`] once `budget` elapses.
	pub async fn bound<T, Fut>(&self, budget: Duration, attempt: Fut) -> Result<T>
	where
		Fut: Future<Output = Result<T>>,
	{
		if !self.enabled || !budget.is_positive() {
			return attempt.await;
		}

		let deadline = std::time::Duration::try_from(budget).unwrap_or_default();

		match tokio::time::timeout(deadline, attempt).await {
			Ok(outcome) => outcome,
			Err(_) => Err(TransportError::Timeout { after: budget }.into()),
		}
	}
}
impl Default for TimeoutPolicy {
	fn default() -> Self {
		Self {
			enabled: true,
			per_attempt: Duration::seconds(30),
			long_running: Duration::minutes(5),
		}
	}
}
