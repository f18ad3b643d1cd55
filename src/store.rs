//! Token persistence contract and built-in stores.
//!
//! Every store must tolerate concurrent access to the same key from many tasks, and a reader
//! sees either the previous token or the new one, never a mix of both.

pub mod file;
pub mod memory;
pub mod session;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use session::{SessionScopedStore, SessionStore};

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, TokenKey},
};

/// Future type returned by [`TokenStore`] implementations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Persistence contract for issued tokens, one token per [`TokenKey`].
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Fetches the token stored under `key`, if any.
	fn get_token<'a>(&'a self, key: &'a TokenKey) -> StoreFuture<'a, Option<AccessToken>>;

	/// Stores `token` under `key`, replacing any previous value wholesale.
	fn store_token<'a>(&'a self, key: &'a TokenKey, token: AccessToken) -> StoreFuture<'a, ()>;

	/// Removes the token stored under `key`; deleting a missing key succeeds.
	fn delete_token<'a>(&'a self, key: &'a TokenKey) -> StoreFuture<'a, ()>;
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Stored data could not be encoded or decoded.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
