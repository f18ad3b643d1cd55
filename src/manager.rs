//! Per-key token lifecycle: lazy refresh ahead of expiry with single-flight coalescing.
//!
//! Each [`TokenKey`] moves through `NoToken → Valid → NearExpiry → Refreshing → Valid |
//! AuthFailed`. The first caller that sees a token inside the refresh margin starts the
//! refresh; every concurrent caller for the same key awaits that same operation and receives
//! the same token or the same error. There are no background tasks: refreshes only happen on
//! demand.

pub mod events;
/// Refresh counters exposed through [`TokenManager::refresh_metrics`].
pub mod metrics;
#[cfg(feature = "reqwest")] mod request;

pub use events::*;
pub use metrics::*;

// std
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
// crates.io
use futures::future::{BoxFuture, FutureExt, Shared};
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, TokenKey, TokenSecret},
	clock::{Clock, SystemClock},
	error::ConfigError,
	exchange::TokenExchange,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	options::AuthOptions,
	store::TokenStore,
};
#[cfg(feature = "reqwest")]
use crate::{exchange::ReqwestTokenExchangeClient, resilience::ResiliencePolicy};

type SharedRefresh = Shared<BoxFuture<'static, Result<AccessToken>>>;

/// Observable lifecycle state of one key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenState {
	/// Nothing is stored for the key.
	NoToken,
	/// The stored token is outside the refresh margin.
	Valid,
	/// The stored token is inside the refresh margin (or expired) and can be refreshed.
	NearExpiry,
	/// A refresh is in flight.
	Refreshing,
	/// The stored token cannot be renewed; the PKCE flow must be run again.
	AuthFailed,
}
impl TokenState {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			TokenState::NoToken => "no_token",
			TokenState::Valid => "valid",
			TokenState::NearExpiry => "near_expiry",
			TokenState::Refreshing => "refreshing",
			TokenState::AuthFailed => "auth_failed",
		}
	}
}
impl Display for TokenState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RefreshTrigger {
	Expiry,
	Manual,
}

struct InFlight {
	id: u64,
	future: SharedRefresh,
}

struct ManagerInner {
	options: AuthOptions,
	store: Arc<dyn TokenStore>,
	exchange: Arc<dyn TokenExchange>,
	in_flight: Mutex<HashMap<TokenKey, InFlight>>,
	rejected: Mutex<HashMap<TokenKey, TokenSecret>>,
	observers: Observers,
	metrics: RefreshMetrics,
	next_flight: AtomicU64,
	closed: AtomicBool,
}
impl ManagerInner {
	async fn refresh(
		self: Arc<Self>,
		clock: Arc<dyn Clock>,
		key: TokenKey,
		id: u64,
		trigger: RefreshTrigger,
	) -> Result<AccessToken> {
		let outcome = self.refresh_once(clock.as_ref(), &key, trigger).await;

		// Slots replaced after a shutdown belong to a newer flight.
		{
			let mut in_flight = self.in_flight.lock();

			if in_flight.get(&key).is_some_and(|flight| flight.id == id) {
				in_flight.remove(&key);
			}
		}

		outcome
	}

	async fn refresh_once(
		&self,
		clock: &dyn Clock,
		key: &TokenKey,
		trigger: RefreshTrigger,
	) -> Result<AccessToken> {
		let current = self
			.store
			.get_token(key)
			.await?
			.ok_or_else(|| Error::AuthenticationRequired { key: key.clone() })?;

		// Another flight may have finished between the caller's read and this one.
		if trigger == RefreshTrigger::Expiry
			&& !current.needs_refresh_at(clock.now(), self.options.refresh_margin)
		{
			return Ok(current);
		}

		let Some(refresh_secret) = current.refresh_token().cloned() else {
			return Err(Error::authentication("No refresh token is available"));
		};

		if self.rejected.lock().get(key) == Some(&refresh_secret) {
			return Err(Error::authentication("Refresh token was already rejected by the provider"));
		}

		self.metrics.record_attempt();

		let refreshed = match self.exchange.refresh(&current).await {
			Ok(token) => token,
			Err(e) => {
				self.metrics.record_failure();

				if e.is_authentication() {
					self.rejected.lock().insert(key.clone(), refresh_secret);

					obs::emit_refresh_rejected(key);
				} else {
					obs::emit_refresh_failed(key, &e);
				}

				return Err(e);
			},
		};

		if let Err(e) = self.store.store_token(key, refreshed.clone()).await {
			self.metrics.record_failure();

			let e = Error::from(e);

			obs::emit_refresh_failed(key, &e);

			return Err(e);
		}

		self.metrics.record_success();
		self.observers.notify(&TokenRefreshed {
			key: key.clone(),
			previous: Some(current),
			current: refreshed.clone(),
		});

		Ok(refreshed)
	}
}

/// Hands out valid access tokens for many keys and many concurrent callers.
///
/// Construct one per host application and share it behind an [`Arc`]; there is no global
/// instance. Call [`shutdown`](Self::shutdown) during teardown.
pub struct TokenManager {
	inner: Arc<ManagerInner>,
	clock: Arc<dyn Clock>,
}
impl TokenManager {
	/// Creates a manager over the given store and token exchange.
	pub fn new(
		options: AuthOptions,
		store: Arc<dyn TokenStore>,
		exchange: Arc<dyn TokenExchange>,
	) -> Self {
		let inner = ManagerInner {
			options,
			store,
			exchange,
			in_flight: Default::default(),
			rejected: Default::default(),
			observers: Default::default(),
			metrics: Default::default(),
			next_flight: AtomicU64::new(0),
			closed: AtomicBool::new(false),
		};

		Self { inner: Arc::new(inner), clock: Arc::new(SystemClock) }
	}

	/// Creates a manager whose exchange client uses the default reqwest transport.
	#[cfg(feature = "reqwest")]
	pub fn with_reqwest(
		options: AuthOptions,
		store: Arc<dyn TokenStore>,
		policy: Arc<ResiliencePolicy>,
	) -> Result<Self> {
		let exchange = ReqwestTokenExchangeClient::new(&options, policy)?;

		Ok(Self::new(options, store, Arc::new(exchange)))
	}

	/// Replaces the clock used for refresh-margin decisions.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Configuration the manager was created with.
	pub fn options(&self) -> &AuthOptions {
		&self.inner.options
	}

	/// Refresh counters for this manager.
	pub fn refresh_metrics(&self) -> &RefreshMetrics {
		&self.inner.metrics
	}

	/// Returns a token that is valid for at least the refresh margin, refreshing if needed.
	///
	/// Fails with [`Error::AuthenticationRequired`] when nothing is stored for `key`.
	pub async fn get_access_token(&self, key: &TokenKey) -> Result<AccessToken> {
		self.ensure_open()?;

		let span = FlowSpan::new(FlowKind::TokenAccess, "get_access_token");

		span.instrument(async move {
			obs::record_flow_outcome(FlowKind::TokenAccess, FlowOutcome::Attempt);

			let outcome = self.resolve(key).await;

			record_outcome(&outcome);

			outcome
		})
		.await
	}

	/// Exchanges an authorization code and stores the resulting token under `key`.
	pub async fn exchange_code(
		&self,
		key: &TokenKey,
		code: &str,
		verifier: &str,
	) -> Result<AccessToken> {
		self.ensure_open()?;

		let token = self.inner.exchange.exchange_code(code, verifier).await?;

		self.inner.store.store_token(key, token.clone()).await?;
		self.inner.rejected.lock().remove(key);

		Ok(token)
	}

	/// Refreshes `key` regardless of the margin, joining a refresh that is already in flight.
	pub async fn refresh_token(&self, key: &TokenKey) -> Result<AccessToken> {
		self.ensure_open()?;

		let span = FlowSpan::new(FlowKind::TokenAccess, "refresh_token");

		span.instrument(self.single_flight(key, RefreshTrigger::Manual)).await
	}

	/// Seeds or replaces the token stored under `key`.
	pub async fn store_token(&self, key: &TokenKey, token: AccessToken) -> Result<()> {
		self.ensure_open()?;
		self.inner.store.store_token(key, token).await?;
		self.inner.rejected.lock().remove(key);

		Ok(())
	}

	/// Removes the token stored under `key`.
	pub async fn delete_token(&self, key: &TokenKey) -> Result<()> {
		self.ensure_open()?;
		self.inner.store.delete_token(key).await?;
		self.inner.rejected.lock().remove(key);

		Ok(())
	}

	/// Reports the lifecycle state of `key` without triggering a refresh.
	pub async fn token_state(&self, key: &TokenKey) -> Result<TokenState> {
		self.ensure_open()?;

		if self.inner.in_flight.lock().contains_key(key) {
			return Ok(TokenState::Refreshing);
		}

		let Some(token) = self.inner.store.get_token(key).await? else {
			return Ok(TokenState::NoToken);
		};
		let now = self.clock.now();
		let state = match token.refresh_token() {
			Some(secret) if self.inner.rejected.lock().get(key) == Some(secret) =>
				TokenState::AuthFailed,
			None if token.is_expired_at(now) => TokenState::AuthFailed,
			_ if token.needs_refresh_at(now, self.inner.options.refresh_margin) =>
				TokenState::NearExpiry,
			_ => TokenState::Valid,
		};

		Ok(state)
	}

	/// Registers an observer for [`TokenRefreshed`] notifications.
	pub fn subscribe(&self, observer: Arc<dyn TokenRefreshObserver>) -> SubscriptionId {
		self.inner.observers.subscribe(observer)
	}

	/// Removes an observer; returns `false` when `id` was not registered.
	pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
		self.inner.observers.unsubscribe(id)
	}

	/// Stops the manager: observers and in-flight slots are dropped and later calls fail with
	/// [`ConfigError::ManagerShutdown`].
	///
	/// Callers already awaiting a refresh still receive its outcome.
	pub fn shutdown(&self) {
		self.inner.closed.store(true, Ordering::Release);
		self.inner.observers.clear();
		self.inner.in_flight.lock().clear();
		self.inner.rejected.lock().clear();
	}

	/// Whether [`shutdown`](Self::shutdown) has been called.
	pub fn is_shut_down(&self) -> bool {
		self.inner.closed.load(Ordering::Acquire)
	}

	async fn resolve(&self, key: &TokenKey) -> Result<AccessToken> {
		let current = self
			.inner
			.store
			.get_token(key)
			.await?
			.ok_or_else(|| Error::AuthenticationRequired { key: key.clone() })?;

		if !current.needs_refresh_at(self.clock.now(), self.inner.options.refresh_margin) {
			return Ok(current);
		}

		self.single_flight(key, RefreshTrigger::Expiry).await
	}

	async fn single_flight(&self, key: &TokenKey, trigger: RefreshTrigger) -> Result<AccessToken> {
		let (future, joined) = {
			let mut in_flight = self.inner.in_flight.lock();

			match in_flight.get(key) {
				Some(flight) => (flight.future.clone(), true),
				None => {
					let id = self.inner.next_flight.fetch_add(1, Ordering::Relaxed);
					let future = Arc::clone(&self.inner)
						.refresh(Arc::clone(&self.clock), key.clone(), id, trigger)
						.boxed()
						.shared();

					in_flight.insert(key.clone(), InFlight { id, future: future.clone() });

					(future, false)
				},
			}
		};

		if joined {
			self.inner.metrics.record_coalesced();

			obs::emit_refresh_joined(key);
		}

		future.await
	}

	fn ensure_open(&self) -> Result<()> {
		if self.is_shut_down() {
			return Err(ConfigError::ManagerShutdown.into());
		}

		Ok(())
	}
}
impl Debug for TokenManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenManager")
			.field("options", &self.inner.options)
			.field("in_flight", &self.inner.in_flight.lock().len())
			.field("observers", &self.inner.observers)
			.field("metrics", &self.inner.metrics)
			.field("shut_down", &self.is_shut_down())
			.finish()
	}
}

fn record_outcome<T>(outcome: &Result<T>) {
	let label = if outcome.is_ok() { FlowOutcome::Success } else { FlowOutcome::Failure };

	obs::record_flow_outcome(FlowKind::TokenAccess, label);
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::AtomicU32;
	// self
	use super::*;
	use crate::{
		auth::ScopeList, clock::ManualClock, exchange::ExchangeFuture, store::MemoryStore,
	};

	#[derive(Default)]
	struct ScriptedExchange {
		refreshes: AtomicU32,
		reject: AtomicBool,
	}
	impl TokenExchange for ScriptedExchange {
		fn exchange_code<'a>(
			&'a self,
			code: &'a str,
			_: &'a str,
		) -> ExchangeFuture<'a, AccessToken> {
			Box::pin(async move { Ok(token(&format!("from-{code}"), Some("r-1"), 3_600)) })
		}

		fn refresh<'a>(&'a self, previous: &'a AccessToken) -> ExchangeFuture<'a, AccessToken> {
			Box::pin(async move {
				let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;

				if self.reject.load(Ordering::SeqCst) {
					return Err(Error::authentication("invalid_grant"));
				}

				Ok(token(&format!("a-{n}"), None, 3_600).inherit_missing(previous))
			})
		}
	}

	fn token(value: &str, refresh: Option<&str>, ttl_secs: i64) -> AccessToken {
		let builder = AccessToken::builder()
			.access_token(value)
			.scopes(ScopeList::new(["read"]).expect("Scopes should be valid."))
			.issued_at(OffsetDateTime::UNIX_EPOCH)
			.expires_at(OffsetDateTime::UNIX_EPOCH + Duration::seconds(ttl_secs));
		let builder = match refresh {
			Some(refresh) => builder.refresh_token(refresh),
			None => builder,
		};

		builder.build().expect("Token fixture should build.")
	}

	fn manager(exchange: Arc<ScriptedExchange>) -> (TokenManager, Arc<ManualClock>) {
		let options = AuthOptions::builder("client-1")
			.redirect_uri(Url::parse("https://app.example.com/cb").expect("Redirect should parse."))
			.build()
			.expect("Options fixture should build.");
		let clock = Arc::new(ManualClock::new(OffsetDateTime::UNIX_EPOCH));
		let manager = TokenManager::new(options, Arc::new(MemoryStore::default()), exchange)
			.with_clock(clock.clone());

		(manager, clock)
	}

	fn key() -> TokenKey {
		TokenKey::new("api").expect("Key fixture should be valid.")
	}

	async fn state(manager: &TokenManager) -> TokenState {
		manager.token_state(&key()).await.expect("State should load.")
	}

	#[tokio::test]
	async fn states_follow_the_token_lifecycle() {
		let exchange = Arc::new(ScriptedExchange::default());
		let (manager, clock) = manager(exchange.clone());

		assert_eq!(state(&manager).await, TokenState::NoToken);

		manager.store_token(&key(), token("a-0", Some("r-0"), 3_600)).await.expect("Seed.");

		assert_eq!(state(&manager).await, TokenState::Valid);

		clock.advance(Duration::minutes(56));

		assert_eq!(state(&manager).await, TokenState::NearExpiry);

		exchange.reject.store(true, Ordering::SeqCst);
		manager.get_access_token(&key()).await.expect_err("Provider rejects the refresh.");

		assert_eq!(state(&manager).await, TokenState::AuthFailed);
	}

	#[tokio::test]
	async fn rejected_refresh_tokens_are_not_sent_twice() {
		let exchange =
			Arc::new(ScriptedExchange { reject: AtomicBool::new(true), ..Default::default() });
		let (manager, _) = manager(exchange.clone());

		manager.store_token(&key(), token("a-0", Some("r-0"), 60)).await.expect("Seed.");

		for _ in 0..3 {
			let err = manager.get_access_token(&key()).await.expect_err("Refresh is rejected.");

			assert!(err.is_authentication());
		}

		assert_eq!(exchange.refreshes.load(Ordering::SeqCst), 1);
		assert_eq!(manager.refresh_metrics().failures(), 1);

		exchange.reject.store(false, Ordering::SeqCst);
		manager.store_token(&key(), token("a-0", Some("r-1"), 60)).await.expect("Reseed.");

		let refreshed = manager.get_access_token(&key()).await.expect("New secret is accepted.");

		assert_eq!(refreshed.token().expose(), "a-2");
		assert_eq!(refreshed.refresh_token().map(TokenSecret::expose), Some("r-1"));
	}

	#[tokio::test]
	async fn shutdown_rejects_later_calls() {
		let (manager, _) = manager(Arc::new(ScriptedExchange::default()));

		manager.subscribe(Arc::new(|_: &TokenRefreshed| {}));
		manager.shutdown();

		assert!(manager.is_shut_down());
		assert!(matches!(
			manager.get_access_token(&key()).await,
			Err(Error::Config(ConfigError::ManagerShutdown))
		));
		assert!(matches!(
			manager.exchange_code(&key(), "code", "verifier").await,
			Err(Error::Config(ConfigError::ManagerShutdown))
		));
	}
}
