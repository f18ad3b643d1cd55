//! JSON file-backed [`TokenStore`] for single-process deployments and CLIs.

// std
use std::{
	fs::{self, File},
	io::{ErrorKind, Write},
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, TokenKey},
	store::{StoreError, StoreFuture, TokenStore},
};

type Snapshot = BTreeMap<TokenKey, AccessToken>;

/// Persists tokens as one JSON object mapping each key to its token.
///
/// The whole document is rewritten through a sibling temp file that is synced and renamed
/// over the target, so readers never observe a partially written file. The file is removed
/// once the last token is deleted.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<Snapshot>>,
}
impl FileStore {
	/// Opens (or prepares) a store at `path`, eagerly loading existing data.
	///
	/// A missing or empty file is an empty store; a corrupt file is a
	/// [`StoreError::Serialization`] error.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		ensure_parent_exists(&path)?;

		let snapshot = load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Location of the JSON document.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn mutate(&self, apply: impl FnOnce(&mut Snapshot)) -> Result<(), StoreError> {
		let mut guard = self.inner.write();
		let mut next = guard.clone();

		apply(&mut next);
		persist(&self.path, &next)?;

		*guard = next;

		Ok(())
	}
}
impl TokenStore for FileStore {
	fn get_token<'a>(&'a self, key: &'a TokenKey) -> StoreFuture<'a, Option<AccessToken>> {
		Box::pin(async move { Ok(self.inner.read().get(key).cloned()) })
	}

	fn store_token<'a>(&'a self, key: &'a TokenKey, token: AccessToken) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.mutate(|snapshot| {
				snapshot.insert(key.clone(), token);
			})
		})
	}

	fn delete_token<'a>(&'a self, key: &'a TokenKey) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			if !self.inner.read().contains_key(key) {
				return Ok(());
			}

			self.mutate(|snapshot| {
				snapshot.remove(key);
			})
		})
	}
}

fn load_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
	let bytes = match fs::read(path) {
		Ok(bytes) => bytes,
		Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Snapshot::new()),
		Err(e) => return Err(backend(format!("Failed to read {}: {e}", path.display()))),
	};

	if bytes.iter().all(u8::is_ascii_whitespace) {
		return Ok(Snapshot::new());
	}

	let mut deserializer = serde_json::Deserializer::from_slice(&bytes);

	serde_path_to_error::deserialize(&mut deserializer).map_err(|e| StoreError::Serialization {
		message: format!("Failed to parse {} at `{}`: {}", path.display(), e.path(), e.inner()),
	})
}

fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		fs::create_dir_all(parent).map_err(|e| {
			backend(format!("Failed to create store directory {}: {e}", parent.display()))
		})?;
	}

	Ok(())
}

fn persist(path: &Path, snapshot: &Snapshot) -> Result<(), StoreError> {
	if snapshot.is_empty() {
		return match fs::remove_file(path) {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
			Err(e) => Err(backend(format!("Failed to remove {}: {e}", path.display()))),
		};
	}

	ensure_parent_exists(path)?;

	let serialized = serde_json::to_vec_pretty(snapshot).map_err(|e| {
		StoreError::Serialization { message: format!("Failed to serialize tokens: {e}") }
	})?;
	let mut tmp_path = path.as_os_str().to_owned();

	tmp_path.push(".tmp");

	let tmp_path = PathBuf::from(tmp_path);

	{
		let mut file = File::create(&tmp_path)
			.map_err(|e| backend(format!("Failed to create {}: {e}", tmp_path.display())))?;

		file.write_all(&serialized)
			.map_err(|e| backend(format!("Failed to write {}: {e}", tmp_path.display())))?;
		file.sync_all()
			.map_err(|e| backend(format!("Failed to sync {}: {e}", tmp_path.display())))?;
	}

	fs::rename(&tmp_path, path)
		.map_err(|e| backend(format!("Failed to replace {}: {e}", path.display())))
}

fn backend(message: String) -> StoreError {
	StoreError::Backend { message }
}
