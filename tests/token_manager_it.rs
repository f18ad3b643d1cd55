mod common;

// std
use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration as StdDuration,
};
// crates.io
use parking_lot::Mutex;
use time::Duration;
// self
use common::*;
use oauth2_token_manager::{
	auth::{AccessToken, TokenKey},
	clock::{Clock, ManualClock},
	error::{Error, TransientError},
	manager::{TokenManager, TokenRefreshed, TokenState},
	options::AuthOptions,
	store::MemoryStore,
};

struct Harness {
	manager: Arc<TokenManager>,
	exchange: Arc<CountingExchange>,
	clock: Arc<ManualClock>,
}

fn harness(latency: StdDuration) -> Harness {
	let clock = Arc::new(ManualClock::new(start()));
	let exchange = Arc::new(CountingExchange::new(clock.clone()).with_latency(latency));
	let store = Arc::new(MemoryStore::default());
	let manager = TokenManager::new(options_for(TOKEN_ENDPOINT), store, exchange.clone())
		.with_clock(clock.clone());

	Harness { manager: Arc::new(manager), exchange, clock }
}

const TOKEN_ENDPOINT: &str = "https://id.example.com/token";

fn key(value: &str) -> TokenKey {
	TokenKey::new(value).expect("Key fixture should be valid.")
}

async fn state(h: &Harness, value: &str) -> TokenState {
	h.manager.token_state(&key(value)).await.expect("State should load.")
}

#[tokio::test]
async fn missing_tokens_require_authentication() {
	let h = harness(StdDuration::ZERO);
	let err = h.manager.get_access_token(&key("api")).await.expect_err("Nothing is stored.");

	assert!(matches!(err, Error::AuthenticationRequired { ref key } if key.to_string() == "api"));
	assert!(err.is_authentication());
}

#[tokio::test]
async fn tokens_outside_the_margin_are_served_from_the_store() {
	let h = harness(StdDuration::ZERO);
	let seeded = token_at("a-0", Some("r-0"), h.clock.now(), Duration::hours(1));

	h.manager.store_token(&key("api"), seeded.clone()).await.expect("Seed should succeed.");

	for _ in 0..2 {
		let token = h.manager.get_access_token(&key("api")).await.expect("Token is fresh.");

		assert_eq!(token, seeded);
	}

	assert_eq!(h.exchange.refreshes(), 0);
	assert_eq!(h.manager.refresh_metrics().attempts(), 0);
}

#[tokio::test]
async fn refresh_margin_decides_between_four_and_ten_minutes() {
	let h = harness(StdDuration::ZERO);
	let now = h.clock.now();

	h.manager
		.store_token(&key("soon"), token_at("a-soon", Some("r-soon"), now, Duration::minutes(4)))
		.await
		.expect("Seed should succeed.");
	h.manager
		.store_token(
			&key("later"),
			token_at("a-later", Some("r-later"), now, Duration::minutes(10)),
		)
		.await
		.expect("Seed should succeed.");

	let later = h.manager.get_access_token(&key("later")).await.expect("Later token is fresh.");

	assert_eq!(later.token().expose(), "a-later");
	assert_eq!(h.exchange.refreshes(), 0);

	let soon = h.manager.get_access_token(&key("soon")).await.expect("Soon token is refreshed.");

	assert_eq!(soon.token().expose(), "a-1");
	assert_eq!(soon.refresh_token().map(|secret| secret.expose()), Some("r-soon+"));
	assert_eq!(h.exchange.refreshes(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_a_single_refresh() {
	let h = harness(StdDuration::from_millis(200));
	let expired =
		token_at("a-0", Some("r-0"), h.clock.now() - Duration::hours(2), Duration::hours(1));

	h.manager.store_token(&key("api"), expired).await.expect("Seed should succeed.");

	let callers = (0..16)
		.map(|_| {
			let manager = h.manager.clone();

			tokio::spawn(async move { manager.get_access_token(&key("api")).await })
		})
		.collect::<Vec<_>>();
	let mut tokens = Vec::new();

	for caller in callers {
		tokens.push(
			caller.await.expect("Caller task should not panic.").expect("Refresh should succeed."),
		);
	}

	assert_eq!(h.exchange.refreshes(), 1);
	assert!(tokens.iter().all(|token| token.token().expose() == "a-1"));
	assert_eq!(h.manager.refresh_metrics().attempts(), 1);
	assert_eq!(h.manager.refresh_metrics().successes(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_a_single_failure() {
	let h = harness(StdDuration::from_millis(200));
	let expired =
		token_at("a-0", Some("r-0"), h.clock.now() - Duration::hours(2), Duration::hours(1));

	h.exchange.fail_with(
		TransientError::ServiceUnavailable {
			message: "HTTP 503".into(),
			status: Some(503),
			retry_after: None,
		}
		.into(),
	);
	h.manager.store_token(&key("api"), expired).await.expect("Seed should succeed.");

	let callers = (0..8)
		.map(|_| {
			let manager = h.manager.clone();

			tokio::spawn(async move { manager.get_access_token(&key("api")).await })
		})
		.collect::<Vec<_>>();

	for caller in callers {
		let err = caller
			.await
			.expect("Caller task should not panic.")
			.expect_err("Every waiter should see the failure.");

		assert!(matches!(
			err,
			Error::Transient(TransientError::ServiceUnavailable { status: Some(503), .. })
		));
	}

	assert_eq!(h.exchange.refreshes(), 1);

	// The slot is cleared on failure, so the next caller retries right away.
	h.manager.get_access_token(&key("api")).await.expect_err("Provider is still down.");

	assert_eq!(h.exchange.refreshes(), 2);
	assert_eq!(state(&h, "api").await, TokenState::NearExpiry);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn aborting_the_leader_leaves_the_refresh_to_its_waiters() {
	let h = harness(StdDuration::from_millis(300));
	let expired =
		token_at("a-0", Some("r-0"), h.clock.now() - Duration::hours(2), Duration::hours(1));

	h.manager.store_token(&key("api"), expired).await.expect("Seed should succeed.");

	let spawn_caller = || {
		let manager = h.manager.clone();

		tokio::spawn(async move { manager.get_access_token(&key("api")).await })
	};
	let leader = spawn_caller();

	while h.exchange.refreshes() == 0 {
		tokio::time::sleep(StdDuration::from_millis(5)).await;
	}

	let waiter = spawn_caller();

	while h.manager.refresh_metrics().coalesced() == 0 {
		tokio::time::sleep(StdDuration::from_millis(5)).await;
	}

	leader.abort();

	let token = waiter
		.await
		.expect("Waiter task should not panic.")
		.expect("The waiter should still receive the refreshed token.");

	assert_eq!(token.token().expose(), "a-1");
	assert!(leader.await.expect_err("Leader was aborted.").is_cancelled());
	assert_eq!(h.exchange.refreshes(), 1);
	assert_eq!(
		h.manager.get_access_token(&key("api")).await.expect("Refreshed token is stored."),
		token
	);
}

#[tokio::test]
async fn oversized_margins_refresh_instead_of_overflowing() {
	let clock = Arc::new(ManualClock::new(start()));
	let exchange = Arc::new(CountingExchange::new(clock.clone()));
	let options = AuthOptions {
		refresh_margin: Duration::seconds(9_000_000_000_000),
		..options_for(TOKEN_ENDPOINT)
	};
	let manager = TokenManager::new(options, Arc::new(MemoryStore::default()), exchange.clone())
		.with_clock(clock.clone());

	manager
		.store_token(&key("api"), token_at("a-0", Some("r-0"), clock.now(), Duration::hours(1)))
		.await
		.expect("Seed should succeed.");

	let token = manager.get_access_token(&key("api")).await.expect("Refresh should succeed.");

	assert_eq!(token.token().expose(), "a-1");
	assert_eq!(exchange.refreshes(), 1);
}

#[tokio::test]
async fn tokens_without_refresh_tokens_fail_authentication() {
	let h = harness(StdDuration::ZERO);
	let expired = token_at("a-0", None, h.clock.now() - Duration::hours(2), Duration::hours(1));

	h.manager.store_token(&key("api"), expired).await.expect("Seed should succeed.");

	let err = h.manager.get_access_token(&key("api")).await.expect_err("Nothing to refresh with.");

	assert!(matches!(err, Error::Authentication { .. }));
	assert_eq!(h.exchange.refreshes(), 0);
	assert_eq!(state(&h, "api").await, TokenState::AuthFailed);
}

#[tokio::test]
async fn manual_refresh_ignores_the_margin() {
	let h = harness(StdDuration::ZERO);
	let fresh = token_at("a-0", Some("r-0"), h.clock.now(), Duration::hours(1));

	h.manager.store_token(&key("api"), fresh).await.expect("Seed should succeed.");

	let token = h.manager.refresh_token(&key("api")).await.expect("Manual refresh should succeed.");

	assert_eq!(token.token().expose(), "a-1");
	assert_eq!(h.exchange.refreshes(), 1);

	let stored = h.manager.get_access_token(&key("api")).await.expect("Refreshed token is stored.");

	assert_eq!(stored, token);
	assert_eq!(h.exchange.refreshes(), 1);
}

#[tokio::test]
async fn deleted_tokens_are_gone() {
	let h = harness(StdDuration::ZERO);
	let token = h.manager.exchange_code(&key("api"), "c-1", VERIFIER).await.expect("Exchange.");

	assert_eq!(h.exchange.exchanges(), 1);
	assert_eq!(h.manager.get_access_token(&key("api")).await.expect("Token is stored."), token);

	h.manager.delete_token(&key("api")).await.expect("Delete should succeed.");

	assert!(matches!(
		h.manager.get_access_token(&key("api")).await,
		Err(Error::AuthenticationRequired { .. })
	));
	assert_eq!(state(&h, "api").await, TokenState::NoToken);
}

#[tokio::test]
async fn observers_can_unsubscribe() {
	let h = harness(StdDuration::ZERO);
	let seen = Arc::new(AtomicUsize::new(0));
	let counter = seen.clone();
	let id = h.manager.subscribe(Arc::new(move |_: &TokenRefreshed| {
		counter.fetch_add(1, Ordering::SeqCst);
	}));

	h.manager
		.store_token(&key("api"), token_at("a-0", Some("r-0"), h.clock.now(), Duration::hours(1)))
		.await
		.expect("Seed should succeed.");
	h.manager.refresh_token(&key("api")).await.expect("First refresh should succeed.");

	assert!(h.manager.unsubscribe(id));

	h.manager.refresh_token(&key("api")).await.expect("Second refresh should succeed.");

	assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[cfg(feature = "reqwest")]
mod end_to_end {
	// crates.io
	use httpmock::prelude::*;
	// self
	use super::*;
	use oauth2_token_manager::{
		exchange::TokenExchangeClient,
		http::ReqwestHttpClient,
		oauth::ReqwestTransportErrorMapper,
		resilience::ResiliencePolicy,
	};

	#[tokio::test]
	async fn exchange_then_refresh_once_past_the_margin() {
		let server = MockServer::start_async().await;
		let exchange_mock = server
			.mock_async(|when, then| {
				when.method(POST)
					.path("/token")
					.form_urlencoded_tuple("grant_type", "authorization_code")
					.form_urlencoded_tuple("code", "code123");
				then.status(200)
					.header("content-type", "application/json")
					.body(token_body("T1", Some("R1"), 3_600));
			})
			.await;
		let refresh_mock = server
			.mock_async(|when, then| {
				when.method(POST)
					.path("/token")
					.form_urlencoded_tuple("grant_type", "refresh_token")
					.form_urlencoded_tuple("refresh_token", "R1");
				then.status(200)
					.header("content-type", "application/json")
					.body(token_body("T2", Some("R2"), 3_600));
			})
			.await;
		let clock = Arc::new(ManualClock::new(start()));
		let options = server_options(&server);
		let margin = options.refresh_margin;
		let exchange = TokenExchangeClient::with_parts(
			&options,
			Arc::new(ResiliencePolicy::new(fast_resilience()).with_clock(clock.clone())),
			Arc::new(ReqwestHttpClient::default()),
			Arc::new(ReqwestTransportErrorMapper),
			clock.clone(),
		)
		.expect("Exchange client should build.");
		let manager =
			TokenManager::new(options, Arc::new(MemoryStore::default()), Arc::new(exchange))
				.with_clock(clock.clone());
		let events = Arc::new(Mutex::new(Vec::<TokenRefreshed>::new()));
		let sink = events.clone();

		manager.subscribe(Arc::new(move |event: &TokenRefreshed| sink.lock().push(event.clone())));

		let key = TokenKey::for_client(CLIENT_ID).expect("Client key should be valid.");
		let t1 = manager
			.exchange_code(&key, "code123", VERIFIER)
			.await
			.expect("Code exchange should succeed.");

		assert_eq!(t1.token().expose(), "T1");
		assert_eq!(t1.expires_at(), clock.now() + Duration::seconds(3_600));

		let again = manager.get_access_token(&key).await.expect("T1 is fresh.");

		assert_eq!(again, t1);

		clock.set(t1.expires_at() - margin - Duration::seconds(1));

		let still = manager.get_access_token(&key).await.expect("T1 is still outside the margin.");

		assert_eq!(still, t1);

		clock.set(t1.expires_at() - margin + Duration::seconds(1));

		let t2 = manager.get_access_token(&key).await.expect("Refresh should succeed.");

		assert_eq!(t2.token().expose(), "T2");

		exchange_mock.assert_calls_async(1).await;
		refresh_mock.assert_calls_async(1).await;

		let events = events.lock();

		assert_eq!(events.len(), 1);
		assert_eq!(events[0].previous.as_ref(), Some(&t1));
		assert_eq!(events[0].current, t2);
		assert_eq!(events[0].key, key);
	}
}

#[tokio::test]
async fn access_tokens_expose_the_authorization_header() {
	let h = harness(StdDuration::ZERO);
	let token: AccessToken =
		h.manager.exchange_code(&key("api"), "c-9", VERIFIER).await.expect("Exchange.");

	assert_eq!(token.authorization_header(), "Bearer a-c-9");
}
