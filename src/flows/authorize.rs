//! Authorization endpoint URL construction.

// self
use crate::{_prelude::*, auth::ScopeList, flows::PkceContext, options::AuthOptions};

/// Composes the browser redirect URL from client options and PKCE artifacts.
///
/// Parameters are appended in a fixed order (`response_type`, `client_id`, `redirect_uri`,
/// `scope`, `state`, `code_challenge`, `code_challenge_method`) and every value is
/// percent-encoded (`%20` for spaces). Query parameters already present on the configured
/// endpoint are kept in front.
#[derive(Clone, Copy, Debug)]
pub struct AuthorizationUrlBuilder<'a> {
	options: &'a AuthOptions,
}
impl<'a> AuthorizationUrlBuilder<'a> {
	/// Creates a builder over the provided options.
	pub fn new(options: &'a AuthOptions) -> Self {
		Self { options }
	}

	/// Builds the authorization URL; `scope` is omitted when `scopes` is empty.
	pub fn build(&self, scopes: &ScopeList, pkce: &PkceContext) -> Url {
		let mut url = self.options.authorization_endpoint.clone();
		let mut query = url.query().map(str::to_owned).unwrap_or_default();
		let scope = scopes.joined();
		let mut params = vec![
			("response_type", "code"),
			("client_id", self.options.client_id.as_str()),
			("redirect_uri", self.options.redirect_uri.as_str()),
		];

		if !scopes.is_empty() {
			params.push(("scope", scope.as_str()));
		}

		params.push(("state", pkce.state()));
		params.push(("code_challenge", pkce.code_challenge()));
		params.push(("code_challenge_method", pkce.code_challenge_method().as_str()));

		for (name, value) in params {
			if !query.is_empty() {
				query.push('&');
			}

			query.push_str(name);
			query.push('=');
			query.push_str(&urlencoding::encode(value));
		}

		url.set_query(Some(&query));

		url
	}
}

/// Redirect URL plus the PKCE context the caller keeps until the callback arrives.
#[derive(Clone, Debug)]
pub struct AuthorizationRequest {
	url: Url,
	pkce: PkceContext,
}
impl AuthorizationRequest {
	pub(crate) fn new(url: Url, pkce: PkceContext) -> Self {
		Self { url, pkce }
	}

	/// URL to send the user agent to.
	pub fn url(&self) -> &Url {
		&self.url
	}

	/// Verifier to pass to the code exchange.
	pub fn code_verifier(&self) -> &str {
		self.pkce.code_verifier()
	}

	/// State to compare against the callback.
	pub fn state(&self) -> &str {
		self.pkce.state()
	}

	/// Full PKCE context.
	pub fn pkce(&self) -> &PkceContext {
		&self.pkce
	}

	/// Splits the request into its URL and PKCE context.
	pub fn into_parts(self) -> (Url, PkceContext) {
		(self.url, self.pkce)
	}
}
