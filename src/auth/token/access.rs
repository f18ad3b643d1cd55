//! Immutable access token value and its builder.

// self
use crate::{
	_prelude::*,
	auth::{ScopeList, token::secret::TokenSecret},
};

/// Errors produced by [`AccessTokenBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum AccessTokenBuilderError {
	/// Issued when no access token value (or an empty one) was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when the token type is empty.
	#[error("Token type is required.")]
	MissingTokenType,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
	/// Issued when `issued_at + expires_in` falls outside the representable range.
	#[error("Expiry is outside the supported date range.")]
	ExpiryOutOfRange,
}

/// Issued OAuth access token.
///
/// The value is never edited in place: a refresh produces a brand-new instance that replaces
/// the stored one wholesale. `expires_at` is always an absolute UTC instant.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
	token: TokenSecret,
	token_type: String,
	#[serde(with = "time::serde::rfc3339")]
	expires_at: OffsetDateTime,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	refresh_token: Option<TokenSecret>,
	#[serde(default)]
	scopes: ScopeList,
}
impl AccessToken {
	/// Returns a builder for a new token.
	pub fn builder() -> AccessTokenBuilder {
		AccessTokenBuilder::default()
	}

	/// Access token secret; callers must avoid logging it.
	pub fn token(&self) -> &TokenSecret {
		&self.token
	}

	/// Token type as reported by the provider (usually `Bearer`).
	pub fn token_type(&self) -> &str {
		&self.token_type
	}

	/// Absolute UTC expiry instant.
	pub fn expires_at(&self) -> OffsetDateTime {
		self.expires_at
	}

	/// Refresh token secret, if the provider issued one.
	pub fn refresh_token(&self) -> Option<&TokenSecret> {
		self.refresh_token.as_ref()
	}

	/// Scopes in the order they were granted.
	pub fn scopes(&self) -> &ScopeList {
		&self.scopes
	}

	/// Returns `true` once `now >= expires_at - margin`.
	///
	/// A margin reaching past the earliest representable instant always asks for a refresh.
	pub fn needs_refresh_at(&self, now: OffsetDateTime, margin: Duration) -> bool {
		self.expires_at.checked_sub(margin).is_none_or(|deadline| now >= deadline)
	}

	/// Returns `true` once the literal expiry has passed.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		now >= self.expires_at
	}

	/// Time left before the literal expiry, clamped at zero.
	pub fn remaining_at(&self, now: OffsetDateTime) -> Duration {
		let remaining = self.expires_at - now;

		if remaining.is_negative() { Duration::ZERO } else { remaining }
	}

	/// Value for an HTTP `Authorization` header: `"{token_type} {token}"`.
	pub fn authorization_header(&self) -> String {
		format!("{} {}", self.token_type, self.token.expose())
	}

	/// Fills fields a refresh response may omit from the token it replaces.
	pub(crate) fn inherit_missing(mut self, previous: &AccessToken) -> Self {
		if self.refresh_token.is_none() {
			self.refresh_token = previous.refresh_token.clone();
		}
		if self.scopes.is_empty() {
			self.scopes = previous.scopes.clone();
		}

		self
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessToken")
			.field("token", &"<redacted>")
			.field("token_type", &self.token_type)
			.field("expires_at", &self.expires_at)
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("scopes", &self.scopes)
			.finish()
	}
}

/// Builder for [`AccessToken`].
#[derive(Clone, Debug, Default)]
pub struct AccessTokenBuilder {
	token: Option<TokenSecret>,
	token_type: Option<String>,
	refresh_token: Option<TokenSecret>,
	scopes: ScopeList,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl AccessTokenBuilder {
	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.token = Some(TokenSecret::new(token));

		self
	}

	/// Sets the token type (defaults to `Bearer`).
	pub fn token_type(mut self, token_type: impl Into<String>) -> Self {
		self.token_type = Some(token_type.into());

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Sets the granted scopes.
	pub fn scopes(mut self, scopes: ScopeList) -> Self {
		self.scopes = scopes;

		self
	}

	/// Sets the instant `expires_in` is measured from (defaults to the system clock).
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Consumes the builder and produces an [`AccessToken`].
	pub fn build(self) -> Result<AccessToken, AccessTokenBuilderError> {
		let token = self
			.token
			.filter(|secret| !secret.expose().is_empty())
			.ok_or(AccessTokenBuilderError::MissingAccessToken)?;
		let token_type = self.token_type.unwrap_or_else(|| "Bearer".into());

		if token_type.trim().is_empty() {
			return Err(AccessTokenBuilderError::MissingTokenType);
		}

		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) => self
				.issued_at
				.unwrap_or_else(OffsetDateTime::now_utc)
				.checked_add(delta)
				.ok_or(AccessTokenBuilderError::ExpiryOutOfRange)?,
			(None, None) => return Err(AccessTokenBuilderError::MissingExpiry),
		};

		Ok(AccessToken {
			token,
			token_type,
			expires_at: expires_at.to_offset(time::UtcOffset::UTC),
			refresh_token: self.refresh_token.filter(|secret| !secret.expose().is_empty()),
			scopes: self.scopes,
		})
	}
}
