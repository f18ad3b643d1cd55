// self
use crate::{
	_prelude::*,
	auth::ScopeList,
	options::{
		AuthOptions, DEFAULT_AUTHORIZATION_ENDPOINT, DEFAULT_REFRESH_MARGIN,
		DEFAULT_TOKEN_ENDPOINT,
	},
};

/// Errors raised while constructing or validating [`AuthOptions`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum OptionsError {
	/// Client identifier is empty.
	#[error("Client identifier is required.")]
	MissingClientId,
	/// Redirect URI was not provided.
	#[error("Redirect URI is required.")]
	MissingRedirectUri,
	/// A built-in default endpoint failed to parse.
	#[error("Default {endpoint} endpoint is invalid.")]
	InvalidDefaultEndpoint {
		/// Which endpoint failed.
		endpoint: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Endpoints must use HTTPS unless they point at a loopback host.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// The refresh margin cannot be negative.
	#[error("Refresh margin cannot be negative.")]
	NegativeRefreshMargin,
	/// The refresh margin exceeds the accepted upper bound.
	#[error("Refresh margin cannot exceed {max}.")]
	RefreshMarginTooLarge {
		/// Largest accepted margin.
		max: Duration,
	},
}

/// Builder for [`AuthOptions`] values.
#[derive(Debug)]
pub struct AuthOptionsBuilder {
	client_id: String,
	client_secret: Option<String>,
	authorization_endpoint: Option<Url>,
	token_endpoint: Option<Url>,
	redirect_uri: Option<Url>,
	scopes: ScopeList,
	refresh_margin: Duration,
}
impl AuthOptionsBuilder {
	/// Creates a new builder for the provided client identifier.
	pub fn new(client_id: impl Into<String>) -> Self {
		Self {
			client_id: client_id.into(),
			client_secret: None,
			authorization_endpoint: None,
			token_endpoint: None,
			redirect_uri: None,
			scopes: ScopeList::default(),
			refresh_margin: DEFAULT_REFRESH_MARGIN,
		}
	}

	/// Sets the client secret for confidential clients.
	pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(secret.into());

		self
	}

	/// Overrides the authorization endpoint.
	pub fn authorization_endpoint(mut self, url: Url) -> Self {
		self.authorization_endpoint = Some(url);

		self
	}

	/// Overrides the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Sets the registered redirect URI.
	pub fn redirect_uri(mut self, url: Url) -> Self {
		self.redirect_uri = Some(url);

		self
	}

	/// Sets the default scopes.
	pub fn scopes(mut self, scopes: ScopeList) -> Self {
		self.scopes = scopes;

		self
	}

	/// Overrides the refresh margin (defaults to five minutes).
	pub fn refresh_margin(mut self, margin: Duration) -> Self {
		self.refresh_margin = margin;

		self
	}

	/// Consumes the builder and validates the resulting options.
	pub fn build(self) -> Result<AuthOptions, OptionsError> {
		let redirect_uri = self.redirect_uri.ok_or(OptionsError::MissingRedirectUri)?;
		let authorization_endpoint = match self.authorization_endpoint {
			Some(url) => url,
			None => default_endpoint("authorization", DEFAULT_AUTHORIZATION_ENDPOINT)?,
		};
		let token_endpoint = match self.token_endpoint {
			Some(url) => url,
			None => default_endpoint("token", DEFAULT_TOKEN_ENDPOINT)?,
		};
		let options = AuthOptions {
			client_id: self.client_id,
			client_secret: self.client_secret.filter(|secret| !secret.is_empty()),
			authorization_endpoint,
			token_endpoint,
			redirect_uri,
			scopes: self.scopes,
			refresh_margin: self.refresh_margin,
		};

		options.validate()?;

		Ok(options)
	}
}

fn default_endpoint(endpoint: &'static str, raw: &str) -> Result<Url, OptionsError> {
	Url::parse(raw).map_err(|source| OptionsError::InvalidDefaultEndpoint { endpoint, source })
}
