//! Token endpoint round trips: authorization code exchange and refresh.

// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	clock::{Clock, SystemClock},
	error::ValidationError,
	flows,
	http::TokenHttpClient,
	oauth::{BasicFacade, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	options::AuthOptions,
	resilience::ResiliencePolicy,
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

/// Boxed future returned by [`TokenExchange`] implementations.
pub type ExchangeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Token endpoint operations the [`TokenManager`](crate::manager::TokenManager) depends on.
///
/// Implemented by [`TokenExchangeClient`]; tests and alternative transports can provide their
/// own implementation.
pub trait TokenExchange
where
	Self: Send + Sync,
{
	/// Exchanges an authorization code plus PKCE verifier for a token.
	fn exchange_code<'a>(&'a self, code: &'a str, verifier: &'a str)
	-> ExchangeFuture<'a, AccessToken>;

	/// Redeems `previous`'s refresh token for a new token.
	///
	/// Fields the response omits (`refresh_token`, `scope`) are carried over from `previous`.
	fn refresh<'a>(&'a self, previous: &'a AccessToken) -> ExchangeFuture<'a, AccessToken>;
}

#[cfg(feature = "reqwest")]
/// Exchange client specialized for the crate's default reqwest transport stack.
pub type ReqwestTokenExchangeClient =
	TokenExchangeClient<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Performs code exchange and refresh through a [`ResiliencePolicy`].
///
/// Requests are `application/x-www-form-urlencoded` POSTs carrying `client_id` (and
/// `client_secret` when configured) in the body. Each attempt is bounded, retried, and guarded
/// by the policy's breaker for the token endpoint.
pub struct TokenExchangeClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	facade: BasicFacade<C, M>,
	endpoint: String,
	policy: Arc<ResiliencePolicy>,
}
impl<C, M> TokenExchangeClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a client over a caller-provided transport and error mapper.
	pub fn with_http_client(
		options: &AuthOptions,
		policy: Arc<ResiliencePolicy>,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Result<Self> {
		Self::with_parts(options, policy, http_client.into(), mapper.into(), Arc::new(SystemClock))
	}

	/// Same as [`with_http_client`](Self::with_http_client) with an explicit clock for
	/// `expires_at` computation.
	pub fn with_parts(
		options: &AuthOptions,
		policy: Arc<ResiliencePolicy>,
		http_client: Arc<C>,
		mapper: Arc<M>,
		clock: Arc<dyn Clock>,
	) -> Result<Self> {
		let facade = BasicFacade::from_options(options, http_client, mapper, clock)?;

		Ok(Self { facade, endpoint: options.token_endpoint.to_string(), policy })
	}

	/// Resilience policy shared with other callers of the same endpoints.
	pub fn policy(&self) -> &Arc<ResiliencePolicy> {
		&self.policy
	}

	/// Token endpoint used as the breaker key.
	pub fn endpoint(&self) -> &str {
		&self.endpoint
	}

	async fn run_exchange(&self, code: &str, verifier: &str) -> Result<AccessToken> {
		if code.trim().is_empty() {
			return Err(ValidationError::EmptyAuthorizationCode.into());
		}

		flows::validate_code_verifier(verifier)?;

		self.policy.execute(&self.endpoint, || self.facade.exchange_code(code, verifier)).await
	}

	async fn run_refresh(&self, previous: &AccessToken) -> Result<AccessToken> {
		let refresh_token = previous
			.refresh_token()
			.ok_or_else(|| Error::authentication("No refresh token is available"))?;
		let token = self
			.policy
			.execute(&self.endpoint, || self.facade.refresh_token(refresh_token.expose()))
			.await?;

		Ok(token.inherit_missing(previous))
	}
}
#[cfg(feature = "reqwest")]
impl TokenExchangeClient<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a client backed by a default reqwest transport.
	pub fn new(options: &AuthOptions, policy: Arc<ResiliencePolicy>) -> Result<Self> {
		Self::with_http_client(
			options,
			policy,
			ReqwestHttpClient::default(),
			ReqwestTransportErrorMapper,
		)
	}
}
impl<C, M> TokenExchange for TokenExchangeClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn exchange_code<'a>(
		&'a self,
		code: &'a str,
		verifier: &'a str,
	) -> ExchangeFuture<'a, AccessToken> {
		let span = FlowSpan::new(FlowKind::AuthorizationCode, "exchange_code");

		Box::pin(span.instrument(async move {
			obs::record_flow_outcome(FlowKind::AuthorizationCode, FlowOutcome::Attempt);

			let outcome = self.run_exchange(code, verifier).await;

			record_outcome(FlowKind::AuthorizationCode, &outcome);

			outcome
		}))
	}

	fn refresh<'a>(&'a self, previous: &'a AccessToken) -> ExchangeFuture<'a, AccessToken> {
		let span = FlowSpan::new(FlowKind::Refresh, "refresh");

		Box::pin(span.instrument(async move {
			obs::record_flow_outcome(FlowKind::Refresh, FlowOutcome::Attempt);

			let outcome = self.run_refresh(previous).await;

			record_outcome(FlowKind::Refresh, &outcome);

			outcome
		}))
	}
}
impl<C, M> Debug for TokenExchangeClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenExchangeClient")
			.field("endpoint", &self.endpoint)
			.field("policy", &self.policy)
			.finish()
	}
}

fn record_outcome<T>(kind: FlowKind, outcome: &Result<T>) {
	let label = if outcome.is_ok() { FlowOutcome::Success } else { FlowOutcome::Failure };

	obs::record_flow_outcome(kind, label);
}
