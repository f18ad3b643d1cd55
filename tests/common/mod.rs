//! Fixtures shared by the integration tests.

#![allow(dead_code)]

// std
use std::sync::atomic::{AtomicU32, Ordering};
// crates.io
use httpmock::MockServer;
use parking_lot::Mutex;
use time::{Duration, OffsetDateTime};
// self
use oauth2_token_manager::{
	auth::{AccessToken, ScopeList},
	clock::{Clock, ManualClock},
	error::Error,
	exchange::{ExchangeFuture, TokenExchange},
	options::AuthOptions,
	resilience::{CircuitBreakerConfig, ResilienceOptions, RetryPolicy, TimeoutPolicy},
	url::Url,
};

pub const CLIENT_ID: &str = "client-it";
pub const CLIENT_SECRET: &str = "secret-it";
pub const REDIRECT_URI: &str = "https://app.example.com/callback";
pub const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk.-~0123456789abcdefghij";

pub fn start() -> OffsetDateTime {
	OffsetDateTime::UNIX_EPOCH + Duration::days(20_000)
}

pub fn options_for(token_endpoint: &str) -> AuthOptions {
	AuthOptions::builder(CLIENT_ID)
		.client_secret(CLIENT_SECRET)
		.token_endpoint(Url::parse(token_endpoint).expect("Token endpoint should parse."))
		.redirect_uri(Url::parse(REDIRECT_URI).expect("Redirect URI should parse."))
		.scopes(ScopeList::new(["read", "write"]).expect("Scopes should be valid."))
		.build()
		.expect("Options fixture should build.")
}

pub fn server_options(server: &MockServer) -> AuthOptions {
	options_for(&server.url("/token"))
}

/// Millisecond backoff so retry sequences finish quickly.
pub fn fast_resilience() -> ResilienceOptions {
	ResilienceOptions {
		retry: RetryPolicy {
			max_retries: 2,
			base_delay: Duration::milliseconds(1),
			max_delay: Duration::milliseconds(10),
			jitter: false,
			..Default::default()
		},
		circuit_breaker: CircuitBreakerConfig::default(),
		timeout: TimeoutPolicy { per_attempt: Duration::seconds(5), ..Default::default() },
	}
}

pub fn token_body(access: &str, refresh: Option<&str>, expires_in: i64) -> String {
	let mut body = serde_json::json!({
		"access_token": access,
		"token_type": "bearer",
		"expires_in": expires_in,
	});

	if let Some(refresh) = refresh {
		body["refresh_token"] = refresh.into();
	}

	body.to_string()
}

pub fn token_at(
	access: &str,
	refresh: Option<&str>,
	issued_at: OffsetDateTime,
	ttl: Duration,
) -> AccessToken {
	let builder = AccessToken::builder()
		.access_token(access)
		.issued_at(issued_at)
		.expires_at(issued_at + ttl)
		.scopes(ScopeList::new(["read"]).expect("Scopes should be valid."));
	let builder = match refresh {
		Some(refresh) => builder.refresh_token(refresh),
		None => builder,
	};

	builder.build().expect("Token fixture should build.")
}

/// In-process token exchange that counts calls and can be told to fail.
pub struct CountingExchange {
	clock: std::sync::Arc<ManualClock>,
	latency: std::time::Duration,
	refreshes: AtomicU32,
	exchanges: AtomicU32,
	failure: Mutex<Option<Error>>,
}
impl CountingExchange {
	pub fn new(clock: std::sync::Arc<ManualClock>) -> Self {
		Self {
			clock,
			latency: std::time::Duration::ZERO,
			refreshes: AtomicU32::new(0),
			exchanges: AtomicU32::new(0),
			failure: Mutex::new(None),
		}
	}

	/// Holds every refresh open long enough for concurrent callers to pile up.
	pub fn with_latency(mut self, latency: std::time::Duration) -> Self {
		self.latency = latency;

		self
	}

	pub fn fail_with(&self, error: Error) {
		*self.failure.lock() = Some(error);
	}

	pub fn refreshes(&self) -> u32 {
		self.refreshes.load(Ordering::SeqCst)
	}

	pub fn exchanges(&self) -> u32 {
		self.exchanges.load(Ordering::SeqCst)
	}
}
impl TokenExchange for CountingExchange {
	fn exchange_code<'a>(
		&'a self,
		code: &'a str,
		_verifier: &'a str,
	) -> ExchangeFuture<'a, AccessToken> {
		Box::pin(async move {
			self.exchanges.fetch_add(1, Ordering::SeqCst);

			Ok(token_at(&format!("a-{code}"), Some("r-0"), self.clock.now(), Duration::hours(1)))
		})
	}

	fn refresh<'a>(&'a self, previous: &'a AccessToken) -> ExchangeFuture<'a, AccessToken> {
		Box::pin(async move {
			let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;

			if !self.latency.is_zero() {
				tokio::time::sleep(self.latency).await;
			}
			if let Some(error) = self.failure.lock().clone() {
				return Err(error);
			}

			let refresh = previous.refresh_token().map(|secret| format!("{}+", secret.expose()));

			let issued_at = self.clock.now();

			Ok(token_at(&format!("a-{n}"), refresh.as_deref(), issued_at, Duration::hours(1)))
		})
	}
}
