//! Facade over the `oauth2` crate and token endpoint error classification.
//!
//! Classification looks at the observed HTTP status first and the body second:
//!
//! | Status | Error |
//! |---|---|
//! | 400, 401, 403 | [`Error::Authentication`] |
//! | 408 | [`TransportError::Timeout`] |
//! | 429 | [`TransientError::RateLimitExceeded`] |
//! | 5xx | [`TransientError::ServiceUnavailable`] |
//! | other non-2xx | [`ValidationError::UnexpectedResponse`] |
//! | 2xx with an unparseable body | [`ValidationError::TokenResponseParse`] |

pub use oauth2;

// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AuthType, AuthorizationCode, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
	HttpClientError, PkceCodeVerifier, RedirectUrl, RefreshToken, RequestTokenError,
	TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError, BasicTokenType},
};
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, ScopeList},
	clock::Clock,
	error::{ConfigError, TransientError, TransportError, ValidationError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	obs,
	options::AuthOptions,
};

// The authorization URL is assembled by `AuthorizationUrlBuilder`; only the token slot is set.
type ConfiguredBasicClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;
type FacadeTokenResponse = oauth2::basic::BasicTokenResponse;
type FacadeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Maps HTTP transport failures into crate [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a crate error.
	///
	/// `meta` carries the status and `Retry-After` hint when a response was received before
	/// the failure.
	fn map_transport_error(
		&self,
		meta: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) if inner.is_builder() =>
				ConfigError::from(*inner).into(),
			HttpClientError::Reqwest(inner) => TransportError::from(*inner).into(),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::from(inner).into(),
			HttpClientError::Other(message) => map_other_transport_error(meta, &message),
			_ => map_other_transport_error(meta, "unknown HTTP client failure"),
		}
	}
}

/// `oauth2` client configured from [`AuthOptions`] plus the transport used to reach it.
pub(crate) struct BasicFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredBasicClient,
	redirect_url: RedirectUrl,
	default_scopes: ScopeList,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
	clock: Arc<dyn Clock>,
}
impl<C, M> BasicFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn from_options(
		options: &AuthOptions,
		http_client: Arc<C>,
		error_mapper: Arc<M>,
		clock: Arc<dyn Clock>,
	) -> Result<Self> {
		let token_url = TokenUrl::new(options.token_endpoint.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { endpoint: "token", source })?;
		let redirect_url = RedirectUrl::new(options.redirect_uri.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { endpoint: "redirect", source })?;
		// Credentials travel in the form body next to the grant fields.
		let mut oauth_client = BasicClient::new(ClientId::new(options.client_id.clone()))
			.set_token_uri(token_url)
			.set_auth_type(AuthType::RequestBody);

		if let Some(secret) = &options.client_secret {
			oauth_client = oauth_client.set_client_secret(ClientSecret::new(secret.clone()));
		}

		Ok(Self {
			oauth_client,
			redirect_url,
			default_scopes: options.scopes.clone(),
			http_client,
			error_mapper,
			clock,
		})
	}

	/// `grant_type=authorization_code` with the PKCE verifier and redirect URI.
	pub(crate) fn exchange_code<'a>(
		&'a self,
		code: &'a str,
		verifier: &'a str,
	) -> FacadeFuture<'a, AccessToken> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let handle = self.http_client.with_metadata(meta.clone());
			let response = self
				.oauth_client
				.exchange_code(AuthorizationCode::new(code.to_owned()))
				.set_pkce_verifier(PkceCodeVerifier::new(verifier.to_owned()))
				.set_redirect_uri(Cow::Borrowed(&self.redirect_url))
				.request_async(&handle)
				.await
				.map_err(|err| map_request_error(meta.take(), err, self.error_mapper.as_ref()))?;

			map_token_response(response, self.clock.now(), &self.default_scopes)
		})
	}

	/// `grant_type=refresh_token`; scopes default to none so the provider keeps the grant's.
	pub(crate) fn refresh_token<'a>(
		&'a self,
		refresh_token: &'a str,
	) -> FacadeFuture<'a, AccessToken> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let handle = self.http_client.with_metadata(meta.clone());
			let refresh_secret = RefreshToken::new(refresh_token.to_owned());
			let response = self
				.oauth_client
				.exchange_refresh_token(&refresh_secret)
				.request_async(&handle)
				.await
				.map_err(|err| map_request_error(meta.take(), err, self.error_mapper.as_ref()))?;

			map_token_response(response, self.clock.now(), &ScopeList::default())
		})
	}
}

fn map_token_response(
	response: FacadeTokenResponse,
	issued_at: OffsetDateTime,
	fallback_scopes: &ScopeList,
) -> Result<AccessToken> {
	let expires_in = response.expires_in().ok_or(ValidationError::MissingExpiresIn)?.as_secs();
	let expires_in =
		i64::try_from(expires_in).map_err(|_| ValidationError::ExpiresInOutOfRange)?;

	if expires_in <= 0 {
		return Err(ValidationError::NonPositiveExpiresIn.into());
	}

	let expires_at = issued_at
		.checked_add(Duration::seconds(expires_in))
		.ok_or(ValidationError::ExpiresInOutOfRange)?;
	let scopes = match response.scopes() {
		Some(granted) => ScopeList::new(
			granted.iter().map(|scope| scope.to_string()).filter(|scope| !scope.is_empty()),
		)
		.map_err(ValidationError::from)?,
		None => fallback_scopes.clone(),
	};
	let mut builder = AccessToken::builder()
		.access_token(response.access_token().secret().to_owned())
		.token_type(token_type_label(response.token_type()))
		.expires_at(expires_at)
		.scopes(scopes);

	if let Some(refresh) = response.refresh_token() {
		builder = builder.refresh_token(refresh.secret().to_owned());
	}

	builder.build().map_err(|err| ValidationError::from(err).into())
}

fn token_type_label(token_type: &BasicTokenType) -> String {
	match token_type {
		BasicTokenType::Bearer => "Bearer".into(),
		BasicTokenType::Extension(value) => value.clone(),
		other => format!("{other:?}"),
	}
}

fn map_request_error<E, M>(
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
	mapper: &M,
) -> Error
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let meta_ref = meta.as_ref();
	let status = meta_status(meta_ref);

	if let RequestTokenError::Request(error) = err {
		return mapper.map_transport_error(meta_ref, error);
	}

	match status {
		Some(status) if !(200..300).contains(&status) =>
			map_status_error(status, meta_retry_after(meta_ref), &err),
		_ => map_body_error(status, err),
	}
}

fn map_status_error<E>(
	status: u16,
	retry_after: Option<Duration>,
	err: &BasicRequestTokenError<HttpClientError<E>>,
) -> Error
where
	E: 'static + Send + Sync + StdError,
{
	match status {
		400 | 401 | 403 => Error::Authentication {
			reason: describe_rejection(status, err),
			status: Some(status),
		},
		408 => TransportError::Timeout { after: Duration::ZERO }.into(),
		429 => TransientError::RateLimitExceeded { retry_after }.into(),
		500..=599 => TransientError::ServiceUnavailable {
			message: describe_rejection(status, err),
			status: Some(status),
			retry_after,
		}
		.into(),
		_ => ValidationError::UnexpectedResponse {
			message: describe_rejection(status, err),
			status: Some(status),
		}
		.into(),
	}
}

fn map_body_error<E>(status: Option<u16>, err: BasicRequestTokenError<HttpClientError<E>>) -> Error
where
	E: 'static + Send + Sync + StdError,
{
	match err {
		RequestTokenError::ServerResponse(response) =>
			Error::Authentication { reason: describe_oauth_error(&response), status },
		RequestTokenError::Parse(source, _body) =>
			ValidationError::TokenResponseParse { source: Arc::new(source), status }.into(),
		RequestTokenError::Other(message) =>
			ValidationError::UnexpectedResponse { message: obs::redact(&message), status }.into(),
		RequestTokenError::Request(_) => ValidationError::UnexpectedResponse {
			message: "transport failure without a response".into(),
			status,
		}
		.into(),
	}
}

fn describe_rejection<E>(status: u16, err: &BasicRequestTokenError<HttpClientError<E>>) -> String
where
	E: 'static + Send + Sync + StdError,
{
	match err {
		RequestTokenError::ServerResponse(response) => describe_oauth_error(response),
		RequestTokenError::Parse(_, body) => {
			let body = String::from_utf8_lossy(body);

			if body.trim().is_empty() {
				format!("HTTP {status}")
			} else {
				format!("HTTP {status}: {}", obs::redact(body.trim()))
			}
		},
		RequestTokenError::Other(message) => format!("HTTP {status}: {}", obs::redact(message)),
		RequestTokenError::Request(_) => format!("HTTP {status}"),
	}
}

fn describe_oauth_error(response: &BasicErrorResponse) -> String {
	let code = response.error().as_ref();

	match response.error_description() {
		Some(description) => format!("{code}: {}", obs::redact(description)),
		None => code.to_owned(),
	}
}

fn map_other_transport_error(meta: Option<&ResponseMetadata>, message: &str) -> Error {
	match meta_status(meta) {
		Some(status) if (500..600).contains(&status) => TransientError::ServiceUnavailable {
			message: obs::redact(message),
			status: Some(status),
			retry_after: meta_retry_after(meta),
		}
		.into(),
		_ => TransportError::network(std::io::Error::other(obs::redact(message))).into(),
	}
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}
