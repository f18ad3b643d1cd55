//! Process-lifetime [`TokenStore`].

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, TokenKey},
	store::{StoreFuture, TokenStore},
};

/// Thread-safe in-memory store; clones share the same map.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Arc<RwLock<HashMap<TokenKey, AccessToken>>>);
impl MemoryStore {
	/// Number of stored tokens.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
impl TokenStore for MemoryStore {
	fn get_token<'a>(&'a self, key: &'a TokenKey) -> StoreFuture<'a, Option<AccessToken>> {
		Box::pin(async move { Ok(self.0.read().get(key).cloned()) })
	}

	fn store_token<'a>(&'a self, key: &'a TokenKey, token: AccessToken) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.0.write().insert(key.clone(), token);

			Ok(())
		})
	}

	fn delete_token<'a>(&'a self, key: &'a TokenKey) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.0.write().remove(key);

			Ok(())
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn token(value: &str) -> AccessToken {
		AccessToken::builder()
			.access_token(value)
			.refresh_token(format!("{value}-refresh"))
			.expires_at(OffsetDateTime::UNIX_EPOCH + Duration::days(20_000))
			.build()
			.expect("Token fixture should build.")
	}

	#[tokio::test]
	async fn store_get_delete_cycle() {
		let store = MemoryStore::default();
		let key = TokenKey::new("user-1").expect("Key fixture should be valid.");
		let stored = token("a-1");

		store.store_token(&key, stored.clone()).await.expect("Store should succeed.");

		assert_eq!(store.get_token(&key).await.expect("Get should succeed."), Some(stored));

		store.store_token(&key, token("a-2")).await.expect("Overwrite should succeed.");

		assert_eq!(store.len(), 1);

		store.delete_token(&key).await.expect("Delete should succeed.");
		store.delete_token(&key).await.expect("Deleting twice should succeed.");

		assert_eq!(store.get_token(&key).await.expect("Get should succeed."), None);
		assert!(store.is_empty());
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn concurrent_writers_never_tear_values() {
		let store = MemoryStore::default();
		let key = TokenKey::new("shared").expect("Key fixture should be valid.");
		let mut tasks = Vec::new();

		for i in 0..32 {
			let store = store.clone();
			let key = key.clone();

			tasks.push(tokio::spawn(async move {
				let value = format!("a-{i}");

				store.store_token(&key, token(&value)).await.expect("Store should succeed.");

				let seen = store
					.get_token(&key)
					.await
					.expect("Get should succeed.")
					.expect("A token should be present.");
				let access = seen.token().expose().to_owned();
				let refresh = seen.refresh_token().map(|secret| secret.expose().to_owned());

				assert_eq!(refresh, Some(format!("{access}-refresh")));
			}));
		}

		for task in tasks {
			task.await.expect("Task should not panic.");
		}
	}
}
