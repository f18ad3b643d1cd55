// self
use crate::obs::{FlowKind, FlowOutcome};

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"oauth2_token_manager_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Counts a scheduled retry against `endpoint`.
pub fn record_retry(endpoint: &str) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("oauth2_token_manager_retry_total", "endpoint" => endpoint.to_owned())
			.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = endpoint;
	}
}

/// Counts a circuit breaker transition into `state` for `endpoint`.
pub fn record_circuit_transition(endpoint: &str, state: &'static str) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"oauth2_token_manager_circuit_transition_total",
			"endpoint" => endpoint.to_owned(),
			"state" => state
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (endpoint, state);
	}
}
