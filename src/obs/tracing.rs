// self
use crate::{_prelude::*, obs::FlowKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span builder used by token flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span =
				tracing::info_span!("oauth2_token_manager.flow", flow = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Enters the span for synchronous sections.
	pub fn entered(self) -> FlowSpanGuard {
		#[cfg(feature = "tracing")]
		{
			FlowSpanGuard { guard: self.span.entered() }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = self;

			FlowSpanGuard {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// RAII guard returned by [`FlowSpan::entered`].
pub struct FlowSpanGuard {
	#[cfg(feature = "tracing")]
	#[allow(dead_code)]
	guard: tracing::span::EnteredSpan,
}
impl Debug for FlowSpanGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("FlowSpanGuard(..)")
	}
}

pub(crate) fn emit_retry_scheduled(endpoint: &str, attempt: u32, delay: Duration, error: &Error) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(
			endpoint,
			attempt,
			delay_ms = delay.whole_milliseconds() as u64,
			%error,
			"Retrying token endpoint request."
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (endpoint, attempt, delay, error);
	}
}

pub(crate) fn emit_circuit_transition(endpoint: &str, from: &'static str, to: &'static str) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(endpoint, from, to, "Circuit breaker changed state.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (endpoint, from, to);
	}
}

pub(crate) fn emit_refresh_joined(key: &str) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(key, "Joined in-flight token refresh.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = key;
	}
}

pub(crate) fn emit_refresh_failed(key: &str, error: &Error) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(key, %error, "Token refresh failed.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (key, error);
	}
}

pub(crate) fn emit_refresh_rejected(key: &str) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(key, "Refresh token was rejected; authorization is required.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = key;
	}
}

#[cfg(feature = "reqwest")]
pub(crate) fn emit_unauthorized_retry(key: &str) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(key, "Request was rejected with 401; refreshing and resending once.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = key;
	}
}

#[cfg(feature = "reqwest")]
pub(crate) fn emit_unauthorized_refresh_failed(key: &str, error: &Error) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(key, %error, "Refresh after a 401 failed; returning the original response.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (key, error);
	}
}

pub(crate) fn emit_observer_panicked(key: &str) {
	#[cfg(feature = "tracing")]
	{
		tracing::error!(key, "Token refresh observer panicked.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = key;
	}
}
