//! Token store implementations
//!
//! `load`/`save`/`clear` are individually atomic; callers never hold a lock
//! across an await point, so a read-modify cycle cannot interleave with a
//! concurrent write inside one synchronous turn.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::RwLock;

use tracing::{debug, warn};

use super::TokenPair;

/// Persistence contract for the access/refresh pair.
pub trait TokenStore: Send + Sync {
    /// Current pair, if one is stored.
    fn load(&self) -> Option<TokenPair>;

    /// Replace the stored pair wholesale.
    fn save(&self, pair: &TokenPair);

    /// Delete the stored pair.
    fn clear(&self);
}

/// In-process token store.
///
/// Default for tests and for embedders that keep tokens in their own
/// platform storage and sync them in at startup.
#[derive(Default)]
pub struct MemoryTokenStore {
    pair: RwLock<Option<TokenPair>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-loaded with a pair.
    pub fn with_pair(pair: TokenPair) -> Self {
        Self {
            pair: RwLock::new(Some(pair)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<TokenPair> {
        self.pair.read().expect("token store lock poisoned").clone()
    }

    fn save(&self, pair: &TokenPair) {
        *self.pair.write().expect("token store lock poisoned") = Some(pair.clone());
    }

    fn clear(&self) {
        *self.pair.write().expect("token store lock poisoned") = None;
    }
}

/// File-backed token store.
///
/// JSON file on disk, the native-client equivalent of the session cookie.
/// Saves write to a sibling temp file and rename into place so a concurrent
/// reader in another client instance never observes a torn pair.
pub struct FileTokenStore {
    path: PathBuf,
    cached: RwLock<Option<TokenPair>>,
}

impl FileTokenStore {
    /// Open a store at the given path, reading any existing pair.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cached = read_pair(&path);
        Self {
            path,
            cached: RwLock::new(cached),
        }
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<TokenPair> {
        // Re-read from disk so a refresh done by another instance is seen.
        let on_disk = read_pair(&self.path);
        *self.cached.write().expect("token store lock poisoned") = on_disk.clone();
        on_disk
    }

    fn save(&self, pair: &TokenPair) {
        *self.cached.write().expect("token store lock poisoned") = Some(pair.clone());
        if let Err(e) = write_pair(&self.path, pair) {
            warn!("Failed to persist token pair to {:?}: {}", self.path, e);
        }
    }

    fn clear(&self) {
        *self.cached.write().expect("token store lock poisoned") = None;
        if self.path.exists() {
            if let Err(e) = fs::remove_file(&self.path) {
                warn!("Failed to delete token file {:?}: {}", self.path, e);
            }
        }
    }
}

fn read_pair(path: &PathBuf) -> Option<TokenPair> {
    let bytes = fs::read(path).ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(pair) => Some(pair),
        Err(e) => {
            debug!("Ignoring unreadable token file {:?}: {}", path, e);
            None
        }
    }
}

fn write_pair(path: &PathBuf, pair: &TokenPair) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    {
        let bytes = serde_json::to_vec(pair).map_err(std::io::Error::other)?;
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
}
