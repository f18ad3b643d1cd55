//! Error taxonomy shared by the exchange client, resilience policy, stores, and manager.
//!
//! [`Error`] is `Clone` because one refresh outcome is handed to every caller that joined the
//! same single-flight operation; wrapped sources therefore live behind [`Arc`].

// self
use crate::{_prelude::*, auth::TokenKey};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Shared, cloneable error source.
pub type SharedError = Arc<dyn StdError + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Malformed request input or token endpoint response.
	#[error(transparent)]
	Validation(#[from] ValidationError),
	/// Temporary upstream failure (rate limit, 5xx, open circuit).
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// No token is stored for the key; the authorization flow must run first.
	#[error("No token is stored for `{key}`; run the authorization flow first.")]
	AuthenticationRequired {
		/// Key that had no stored token.
		key: TokenKey,
	},
	/// The provider rejected the grant or client, or the callback carried an error.
	///
	/// Fatal for the affected key: the caller must re-run the PKCE flow.
	#[error("Authentication failed: {reason}.")]
	Authentication {
		/// Redacted provider- or crate-supplied reason.
		reason: String,
		/// HTTP status code, when the rejection came from the token endpoint.
		status: Option<u16>,
	},
}
impl Error {
	pub(crate) fn authentication(reason: impl Into<String>) -> Self {
		Self::Authentication { reason: reason.into(), status: None }
	}

	/// Returns `true` when the retry layer may attempt the operation again.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::Transport(_) => true,
			Self::Transient(err) => err.is_retryable(),
			_ => false,
		}
	}

	/// Returns `true` when the failure counts toward opening a circuit breaker.
	pub fn trips_breaker(&self) -> bool {
		matches!(
			self,
			Self::Transport(_) | Self::Transient(TransientError::ServiceUnavailable { .. })
		)
	}

	/// Returns `true` for authentication-level rejections.
	pub fn is_authentication(&self) -> bool {
		matches!(self, Self::Authentication { .. } | Self::AuthenticationRequired { .. })
	}

	/// Upstream `Retry-After` hint, if one was captured.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::Transient(TransientError::RateLimitExceeded { retry_after })
			| Self::Transient(TransientError::ServiceUnavailable { retry_after, .. }) => *retry_after,
			Self::Transient(TransientError::CircuitOpen { retry_in, .. }) => Some(*retry_in),
			_ => None,
		}
	}
}

/// Configuration and construction failures.
#[derive(Clone, Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: SharedError,
	},
	/// HTTP request construction failed.
	#[error("HTTP request could not be constructed.")]
	HttpRequest {
		/// Underlying request builder failure.
		#[source]
		source: SharedError,
	},
	/// An endpoint URL could not be handed to the OAuth client.
	#[error("The {endpoint} endpoint is invalid.")]
	InvalidEndpoint {
		/// Which endpoint failed.
		endpoint: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// The token manager was shut down by its owner.
	#[error("Token manager has been shut down.")]
	ManagerShutdown,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Arc::new(src) }
	}
}
impl From<oauth2::http::Error> for ConfigError {
	fn from(e: oauth2::http::Error) -> Self {
		Self::HttpRequest { source: Arc::new(e) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Malformed input or response payloads.
#[derive(Clone, Debug, ThisError)]
pub enum ValidationError {
	/// Token endpoint responded with a body that could not be parsed.
	#[error("Token endpoint returned a malformed body.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: SharedError,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token endpoint responded with something other than a token or an OAuth error.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	UnexpectedResponse {
		/// Redacted summary of the response.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
	/// Access token response could not be turned into an [`AccessToken`](crate::auth::AccessToken).
	#[error("Unable to build access token.")]
	TokenBuild(#[from] crate::auth::AccessTokenBuilderError),
	/// Scope values are malformed.
	#[error("Scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Authorization code was empty.
	#[error("Authorization code cannot be empty.")]
	EmptyAuthorizationCode,
	/// PKCE code verifier violates RFC 7636 length or alphabet rules.
	#[error("PKCE code verifier must be 43-128 unreserved characters, got {len}.")]
	InvalidCodeVerifier {
		/// Length of the rejected verifier.
		len: usize,
	},
	/// Authorization callback did not carry a `code` parameter.
	#[error("Authorization callback is missing the code parameter.")]
	MissingAuthorizationCode,
}

/// Temporary failure variants (safe to retry, subject to policy).
#[derive(Clone, Debug, ThisError)]
pub enum TransientError {
	/// Provider throttled the request with HTTP 429.
	#[error("Token endpoint rate limit exceeded.")]
	RateLimitExceeded {
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Provider answered with a 5xx status.
	#[error("Token endpoint is unavailable: {message}.")]
	ServiceUnavailable {
		/// Redacted summary of the failure.
		message: String,
		/// HTTP status code.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// The circuit breaker for the endpoint is open and failed the call fast.
	#[error("Circuit for `{endpoint}` is open; retry in {retry_in}.")]
	CircuitOpen {
		/// Logical endpoint guarded by the breaker.
		endpoint: String,
		/// Remaining cool-down before a probe is admitted.
		retry_in: Duration,
	},
}
impl TransientError {
	/// Returns `true` when the retry layer may attempt the operation again.
	pub fn is_retryable(&self) -> bool {
		!matches!(self, Self::CircuitOpen { .. })
	}
}

/// Transport-level failures (network, IO, timeouts).
#[derive(Clone, Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: SharedError,
	},
	/// A single attempt exceeded its deadline.
	#[error("Attempt timed out after {after}.")]
	Timeout {
		/// Deadline that elapsed.
		after: Duration,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the token endpoint.")]
	Io {
		/// Underlying IO error.
		#[source]
		source: Arc<std::io::Error>,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { source: Arc::new(src) }
	}
}
impl From<std::io::Error> for TransportError {
	fn from(e: std::io::Error) -> Self {
		Self::Io { source: Arc::new(e) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
