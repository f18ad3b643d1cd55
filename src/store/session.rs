//! Session-scoped tokens for multi-user hosts (one view per caller-supplied session).

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, SessionId, TokenKey},
	store::{StoreFuture, TokenStore},
};

type Sessions = Arc<RwLock<HashMap<SessionId, HashMap<TokenKey, AccessToken>>>>;

/// Registry of per-session token maps.
///
/// Hand each session its own [`SessionScopedStore`] via [`for_session`](Self::for_session);
/// views of different sessions never see each other's tokens even under identical keys.
#[derive(Clone, Debug, Default)]
pub struct SessionStore {
	sessions: Sessions,
}
impl SessionStore {
	/// Returns a [`TokenStore`] view bound to `session`.
	pub fn for_session(&self, session: SessionId) -> SessionScopedStore {
		SessionScopedStore { session, sessions: Arc::clone(&self.sessions) }
	}

	/// Drops every token of `session`, returning how many were removed.
	pub fn end_session(&self, session: &SessionId) -> usize {
		self.sessions.write().remove(session).map_or(0, |tokens| tokens.len())
	}

	/// Number of sessions currently holding at least one token.
	pub fn session_count(&self) -> usize {
		self.sessions.read().len()
	}
}

/// [`TokenStore`] view over one session of a [`SessionStore`].
#[derive(Clone, Debug)]
pub struct SessionScopedStore {
	session: SessionId,
	sessions: Sessions,
}
impl SessionScopedStore {
	/// Session this view is bound to.
	pub fn session(&self) -> &SessionId {
		&self.session
	}
}
impl TokenStore for SessionScopedStore {
	fn get_token<'a>(&'a self, key: &'a TokenKey) -> StoreFuture<'a, Option<AccessToken>> {
		Box::pin(async move {
			Ok(self.sessions.read().get(&self.session).and_then(|tokens| tokens.get(key)).cloned())
		})
	}

	fn store_token<'a>(&'a self, key: &'a TokenKey, token: AccessToken) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.sessions
				.write()
				.entry(self.session.clone())
				.or_default()
				.insert(key.clone(), token);

			Ok(())
		})
	}

	fn delete_token<'a>(&'a self, key: &'a TokenKey) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let mut sessions = self.sessions.write();

			if let Some(tokens) = sessions.get_mut(&self.session) {
				tokens.remove(key);

				if tokens.is_empty() {
					sessions.remove(&self.session);
				}
			}

			Ok(())
		})
	}
}
