//! Optional observability helpers for token flows.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `oauth2_token_manager.flow` with the `flow`
//!   and `stage` fields, plus events for retries, circuit transitions, and refresh failures.
//! - Enable `metrics` to increment `oauth2_token_manager_flow_total` (labeled by `flow` +
//!   `outcome`), `oauth2_token_manager_retry_total`, and
//!   `oauth2_token_manager_circuit_transition_total`.
//!
//! Provider-supplied text passes through [`redact`] before it reaches an error or a log line.

mod metrics;
mod redact;
mod tracing;

pub use metrics::*;
pub use redact::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Flow kinds observed by the token manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Authorization URL generation and code exchange.
	AuthorizationCode,
	/// Refresh token grant.
	Refresh,
	/// Access token lookups served by the manager.
	TokenAccess,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::AuthorizationCode => "authorization_code",
			FlowKind::Refresh => "refresh",
			FlowKind::TokenAccess => "token_access",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a flow helper.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
