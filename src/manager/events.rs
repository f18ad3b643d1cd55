//! Refresh notifications delivered to registered observers.

// std
use std::{
	panic::{self, AssertUnwindSafe},
	sync::atomic::{AtomicU64, Ordering},
};
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, TokenKey},
	obs,
};

/// Published after a refreshed token has been stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenRefreshed {
	/// Key whose token was replaced.
	pub key: TokenKey,
	/// Token held before the refresh, when one was stored.
	pub previous: Option<AccessToken>,
	/// Newly stored token.
	pub current: AccessToken,
}

/// Receives [`TokenRefreshed`] notifications.
///
/// Observers run on the task that completed the refresh, before waiting callers are released,
/// so they should return quickly. A panicking observer is logged and skipped.
pub trait TokenRefreshObserver
where
	Self: Send + Sync,
{
	/// Handles one refresh notification.
	fn on_token_refreshed(&self, event: &TokenRefreshed);
}
impl<F> TokenRefreshObserver for F
where
	F: Send + Sync + Fn(&TokenRefreshed),
{
	fn on_token_refreshed(&self, event: &TokenRefreshed) {
		self(event)
	}
}

/// Handle returned by [`TokenManager::subscribe`](crate::manager::TokenManager::subscribe).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub(crate) struct Observers {
	next_id: AtomicU64,
	entries: RwLock<Vec<(SubscriptionId, Arc<dyn TokenRefreshObserver>)>>,
}
impl Observers {
	pub(crate) fn subscribe(&self, observer: Arc<dyn TokenRefreshObserver>) -> SubscriptionId {
		let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));

		self.entries.write().push((id, observer));

		id
	}

	pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
		let mut entries = self.entries.write();
		let before = entries.len();

		entries.retain(|(entry, _)| *entry != id);

		entries.len() != before
	}

	pub(crate) fn clear(&self) {
		self.entries.write().clear();
	}

	pub(crate) fn len(&self) -> usize {
		self.entries.read().len()
	}

	// Observers are called on a snapshot so they may subscribe or unsubscribe re-entrantly.
	pub(crate) fn notify(&self, event: &TokenRefreshed) {
		let snapshot = self
			.entries
			.read()
			.iter()
			.map(|(_, observer)| Arc::clone(observer))
			.collect::<Vec<_>>();

		for observer in snapshot {
			let delivered =
				panic::catch_unwind(AssertUnwindSafe(|| observer.on_token_refreshed(event)));

			if delivered.is_err() {
				obs::emit_observer_panicked(&event.key);
			}
		}
	}
}
impl Debug for Observers {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Observers").field("len", &self.len()).finish()
	}
}
