//! PKCE verifier/challenge and anti-CSRF state generation (RFC 7636).

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{CryptoRng, Rng};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::ScopeList,
	error::ValidationError,
	flows::{AuthorizationRequest, AuthorizationUrlBuilder},
	obs,
	options::AuthOptions,
};

/// Shortest verifier RFC 7636 allows.
pub const MIN_VERIFIER_LEN: usize = 43;
/// Longest verifier RFC 7636 allows.
pub const MAX_VERIFIER_LEN: usize = 128;
/// Verifier length used by [`PkceGenerator::default`].
pub const DEFAULT_VERIFIER_LEN: usize = 64;

const STATE_BYTES: usize = 32;
const UNRESERVED: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// Supported PKCE challenge methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkceCodeChallengeMethod {
	/// SHA-256 based PKCE (RFC 7636 S256).
	S256,
}
impl PkceCodeChallengeMethod {
	/// Returns the RFC 7636 identifier for the challenge method.
	pub fn as_str(self) -> &'static str {
		match self {
			PkceCodeChallengeMethod::S256 => "S256",
		}
	}
}

/// Produces fresh PKCE contexts and authorization requests.
#[derive(Clone, Copy, Debug)]
pub struct PkceGenerator {
	verifier_len: usize,
}
impl PkceGenerator {
	/// Creates a generator emitting verifiers of `len` characters (43..=128).
	pub fn with_verifier_len(len: usize) -> Result<Self, ValidationError> {
		if !(MIN_VERIFIER_LEN..=MAX_VERIFIER_LEN).contains(&len) {
			return Err(ValidationError::InvalidCodeVerifier { len });
		}

		Ok(Self { verifier_len: len })
	}

	/// Generates a context from the thread-local CSPRNG.
	pub fn generate(&self) -> PkceContext {
		self.generate_with(&mut rand::rng())
	}

	/// Generates a context from the provided cryptographically secure source.
	pub fn generate_with<R>(&self, rng: &mut R) -> PkceContext
	where
		R: CryptoRng,
	{
		let code_verifier: String = (0..self.verifier_len)
			.map(|_| char::from(UNRESERVED[rng.random_range(0..UNRESERVED.len())]))
			.collect();
		let mut state = [0_u8; STATE_BYTES];

		rng.fill_bytes(&mut state);

		let code_challenge = compute_challenge(&code_verifier);

		PkceContext { code_verifier, code_challenge, state: URL_SAFE_NO_PAD.encode(state) }
	}

	/// Builds the browser redirect URL along with the PKCE context the caller must keep.
	///
	/// `scopes` falls back to [`AuthOptions::scopes`] when `None`.
	pub fn generate_authorization_request(
		&self,
		options: &AuthOptions,
		scopes: Option<&ScopeList>,
	) -> AuthorizationRequest {
		let _guard = obs::FlowSpan::new(obs::FlowKind::AuthorizationCode, "authorization_request")
			.entered();
		let pkce = self.generate();
		let scopes = scopes.unwrap_or(&options.scopes);
		let url = AuthorizationUrlBuilder::new(options).build(scopes, &pkce);

		obs::record_flow_outcome(obs::FlowKind::AuthorizationCode, obs::FlowOutcome::Attempt);

		AuthorizationRequest::new(url, pkce)
	}
}
impl Default for PkceGenerator {
	fn default() -> Self {
		Self { verifier_len: DEFAULT_VERIFIER_LEN }
	}
}

/// Verifier, challenge, and state for one authorization round trip.
///
/// Owned by the caller between URL generation and code exchange; never persisted here.
#[derive(Clone, PartialEq, Eq)]
pub struct PkceContext {
	code_verifier: String,
	code_challenge: String,
	state: String,
}
impl PkceContext {
	/// Rebuilds a context from a verifier and state the caller stashed between requests.
	pub fn restore(
		code_verifier: impl Into<String>,
		state: impl Into<String>,
	) -> Result<Self, ValidationError> {
		let code_verifier = code_verifier.into();

		validate_code_verifier(&code_verifier)?;

		let code_challenge = compute_challenge(&code_verifier);

		Ok(Self { code_verifier, code_challenge, state: state.into() })
	}

	/// Secret verifier sent with the code exchange.
	pub fn code_verifier(&self) -> &str {
		&self.code_verifier
	}

	/// `base64url(sha256(verifier))` without padding.
	pub fn code_challenge(&self) -> &str {
		&self.code_challenge
	}

	/// Challenge method (always `S256`).
	pub fn code_challenge_method(&self) -> PkceCodeChallengeMethod {
		PkceCodeChallengeMethod::S256
	}

	/// Anti-CSRF state that must round-trip through the redirect.
	pub fn state(&self) -> &str {
		&self.state
	}

	/// Validates the returned `state` parameter after the authorization redirect.
	pub fn validate_state(&self, returned_state: &str) -> Result<()> {
		if returned_state == self.state {
			Ok(())
		} else {
			Err(Error::authentication("Authorization state mismatch"))
		}
	}

	/// Validates a redirect callback and returns its authorization code.
	///
	/// Provider `error`/`error_description` parameters and state mismatches surface as
	/// [`Error::Authentication`]; a callback without `code` is a validation failure.
	pub fn validate_callback(&self, callback: &Url) -> Result<String> {
		let params: HashMap<String, String> = callback.query_pairs().into_owned().collect();

		if let Some(error) = params.get("error") {
			let reason = match params.get("error_description") {
				Some(description) =>
					format!("Authorization was denied ({error}): {}", obs::redact(description)),
				None => format!("Authorization was denied ({error})"),
			};

			return Err(Error::authentication(reason));
		}

		self.validate_state(params.get("state").map(String::as_str).unwrap_or_default())?;

		params
			.get("code")
			.filter(|code| !code.is_empty())
			.cloned()
			.ok_or_else(|| ValidationError::MissingAuthorizationCode.into())
	}
}
impl Debug for PkceContext {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PkceContext")
			.field("code_verifier", &"<redacted>")
			.field("code_challenge", &self.code_challenge)
			.field("state", &self.state)
			.finish()
	}
}

/// Checks RFC 7636 length and alphabet rules for a code verifier.
pub fn validate_code_verifier(verifier: &str) -> Result<(), ValidationError> {
	let len = verifier.len();

	if (MIN_VERIFIER_LEN..=MAX_VERIFIER_LEN).contains(&len)
		&& verifier.bytes().all(|byte| UNRESERVED.contains(&byte))
	{
		Ok(())
	} else {
		Err(ValidationError::InvalidCodeVerifier { len })
	}
}

/// Computes the S256 challenge for `verifier`.
pub fn compute_challenge(verifier: &str) -> String {
	let digest = Sha256::digest(verifier.as_bytes());

	URL_SAFE_NO_PAD.encode(digest)
}

#[cfg(test)]
mod tests {
	// std
	use std::collections::HashSet;
	// crates.io
	use rand::{SeedableRng, rngs::StdRng};
	// self
	use super::*;

	#[test]
	fn rfc7636_appendix_b_vector() {
		assert_eq!(
			compute_challenge("dBjftJeZ4CVP-mJ0kIHDSBi1ghTT3Wrw8gFn5o8xHbw"),
			"E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
		);
	}

	#[test]
	fn generated_contexts_satisfy_invariants() {
		let generator = PkceGenerator::default();

		for _ in 0..200 {
			let pkce = generator.generate();

			assert_eq!(pkce.code_challenge(), compute_challenge(pkce.code_verifier()));
			assert_eq!(pkce.code_challenge_method().as_str(), "S256");
			assert!(validate_code_verifier(pkce.code_verifier()).is_ok());
			assert_eq!(pkce.state().len(), 43, "32 bytes encode to 43 base64url characters.");
		}
	}

	#[test]
	fn verifier_length_bounds_are_enforced() {
		for len in [MIN_VERIFIER_LEN, MAX_VERIFIER_LEN] {
			let generator =
				PkceGenerator::with_verifier_len(len).expect("Boundary length should be accepted.");

			assert_eq!(generator.generate().code_verifier().len(), len);
		}

		assert!(PkceGenerator::with_verifier_len(42).is_err());
		assert!(PkceGenerator::with_verifier_len(129).is_err());
	}

	#[test]
	fn seeded_source_is_deterministic() {
		let generator = PkceGenerator::default();
		let lhs = generator.generate_with(&mut StdRng::seed_from_u64(7));
		let rhs = generator.generate_with(&mut StdRng::seed_from_u64(7));
		let other = generator.generate_with(&mut StdRng::seed_from_u64(8));

		assert_eq!(lhs, rhs);
		assert_ne!(lhs.state(), other.state());
	}

	#[test]
	fn states_do_not_collide() {
		let generator = PkceGenerator::default();
		let states: HashSet<String> =
			(0..10_000).map(|_| generator.generate().state().to_owned()).collect();

		assert_eq!(states.len(), 10_000);
	}

	#[test]
	fn callback_validation_covers_errors() {
		let pkce = PkceContext::restore("a".repeat(43), "expected-state")
			.expect("Restored context should be valid.");
		let url = |query: &str| {
			Url::parse(&format!("https://app.example.com/cb?{query}"))
				.expect("Callback fixture should parse.")
		};

		assert_eq!(
			pkce.validate_callback(&url("code=abc&state=expected-state"))
				.expect("Matching callback should validate."),
			"abc"
		);
		assert!(matches!(
			pkce.validate_callback(&url("code=abc&state=forged")),
			Err(Error::Authentication { .. })
		));
		assert!(matches!(
			pkce.validate_callback(&url("error=access_denied&state=expected-state")),
			Err(Error::Authentication { .. })
		));
		assert!(matches!(
			pkce.validate_callback(&url("state=expected-state")),
			Err(Error::Validation(ValidationError::MissingAuthorizationCode))
		));
	}

	#[test]
	fn restore_rejects_malformed_verifiers() {
		assert!(PkceContext::restore("short", "s").is_err());
		assert!(PkceContext::restore(format!("{}!", "a".repeat(50)), "s").is_err());

		let debug = format!(
			"{:?}",
			PkceContext::restore("b".repeat(60), "s").expect("Verifier should be valid.")
		);

		assert!(!debug.contains(&"b".repeat(60)));
	}
}
