//! Per-destination locks, so that two pipelines writing the same asset take turns.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use lazy_static::lazy_static;

#[derive(Default)]
pub struct AssetLocks {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl AssetLocks {
    pub fn new() -> AssetLocks {
        AssetLocks::default()
    }

    /// The process-wide lock set used by the file-level operations.
    pub fn shared() -> &'static AssetLocks {
        lazy_static! {
            static ref SHARED: AssetLocks = AssetLocks::new();
        }

        &SHARED
    }

    fn lock_for(&self, key: &Path) -> Arc<Mutex<()>> {
        // A panic while holding a lock can't leave the map or the unit value inconsistent, so a
        // poisoned lock is still usable.
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);

        locks
            .entry(key.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drops the map's entry for `key` if nobody else holds or waits on `lock`.
    fn release(&self, key: &Path, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);

        // Every other owner got its clone through the map, under this same lock.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
    }

    /// Runs `with` while holding the lock for `path`.
    pub fn with_lock<T>(&self, path: impl AsRef<Path>, with: impl FnOnce() -> T) -> T {
        let key = key(path.as_ref());
        let lock = self.lock_for(&key);

        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            with()
        };

        self.release(&key, lock);

        result
    }
}

/// The canonical parent directory of `path` joined with its file name, so that different spellings
/// of one destination share a lock. Paths whose parent can't be resolved are used as given.
fn key(path: &Path) -> PathBuf {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    match (parent.canonicalize(), path.file_name()) {
        (Ok(parent), Some(name)) => parent.join(name),
        _ => path.to_path_buf(),
    }
}
