//! Client configuration for the authorization-code + PKCE flow.
//!
//! [`AuthOptions`] is created once at startup and shared read-only by the URL builder, the
//! token exchange client, and the token manager.

/// Builder API for assembling client options.
pub mod builder;

pub use builder::*;

// self
use crate::{_prelude::*, auth::ScopeList};

/// Default authorization endpoint.
pub const DEFAULT_AUTHORIZATION_ENDPOINT: &str = "https://app.procore.com/oauth/authorize";
/// Default token endpoint.
pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://api.procore.com/oauth/token";
/// Default refresh margin subtracted from a token's expiry.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::minutes(5);
/// Largest refresh margin accepted by validation.
pub const MAX_REFRESH_MARGIN: Duration = Duration::days(1);

/// Immutable OAuth client configuration.
///
/// `client_secret` is never serialized and never printed by [`Debug`].
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthOptions {
	/// OAuth 2.0 client identifier.
	pub client_id: String,
	/// Client secret for confidential clients; `None` for public PKCE clients.
	#[serde(default, skip_serializing)]
	pub client_secret: Option<String>,
	/// Authorization endpoint the browser is redirected to.
	pub authorization_endpoint: Url,
	/// Token endpoint used for code exchange and refresh.
	pub token_endpoint: Url,
	/// Redirect URI registered with the provider.
	pub redirect_uri: Url,
	/// Scopes requested when the caller does not supply its own.
	#[serde(default)]
	pub scopes: ScopeList,
	/// Duration subtracted from `expires_at` to trigger a proactive refresh.
	#[serde(default = "default_refresh_margin")]
	pub refresh_margin: Duration,
}
impl AuthOptions {
	/// Creates a new builder for the provided client identifier.
	pub fn builder(client_id: impl Into<String>) -> AuthOptionsBuilder {
		AuthOptionsBuilder::new(client_id)
	}

	/// Validates invariants, for values obtained through deserialization.
	pub fn validate(&self) -> Result<(), OptionsError> {
		if self.client_id.trim().is_empty() {
			return Err(OptionsError::MissingClientId);
		}
		if self.refresh_margin.is_negative() {
			return Err(OptionsError::NegativeRefreshMargin);
		}
		if self.refresh_margin > MAX_REFRESH_MARGIN {
			return Err(OptionsError::RefreshMarginTooLarge { max: MAX_REFRESH_MARGIN });
		}

		validate_endpoint("authorization", &self.authorization_endpoint)?;
		validate_endpoint("token", &self.token_endpoint)?;

		Ok(())
	}
}
impl Debug for AuthOptions {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthOptions")
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.field("authorization_endpoint", &self.authorization_endpoint.as_str())
			.field("token_endpoint", &self.token_endpoint.as_str())
			.field("redirect_uri", &self.redirect_uri.as_str())
			.field("scopes", &self.scopes)
			.field("refresh_margin", &self.refresh_margin)
			.finish()
	}
}

fn default_refresh_margin() -> Duration {
	DEFAULT_REFRESH_MARGIN
}

// Loopback hosts may use plain HTTP (RFC 8252 section 8.3).
fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), OptionsError> {
	let loopback = match url.host() {
		Some(url::Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
		Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
		None => false,
	};

	match url.scheme() {
		"https" => Ok(()),
		"http" if loopback => Ok(()),
		_ => Err(OptionsError::InsecureEndpoint { endpoint: name, url: url.to_string() }),
	}
}
