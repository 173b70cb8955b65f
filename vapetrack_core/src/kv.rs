//! Key-value document persistence with file locking.
//!
//! Each key holds one complete JSON document that is rewritten in full on
//! every change. The file-backed store writes atomically so a crash never
//! leaves a half-written document behind.

use crate::{Error, Result};
use fs2::FileExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

pub const PROFILE_KEY: &str = "vapetrack_user";
pub const EVENTS_KEY: &str = "vapetrack_logs";
pub const BADGES_KEY: &str = "vapetrack_badges";
pub const JUICE_PURCHASES_KEY: &str = "vapetrack_juice_purchases";
pub const PURCHASED_REWARDS_KEY: &str = "vapetrack_purchased_rewards";
pub const EQUIPPED_REWARDS_KEY: &str = "vapetrack_equipped_rewards";
pub const LAST_XP_CALC_KEY: &str = "vapetrack_last_xp_calc";
pub const SESSION_KEY: &str = "vapetrack_session";

/// Every key the store writes
pub const ALL_KEYS: [&str; 8] = [
    PROFILE_KEY,
    EVENTS_KEY,
    BADGES_KEY,
    JUICE_PURCHASES_KEY,
    PURCHASED_REWARDS_KEY,
    EQUIPPED_REWARDS_KEY,
    LAST_XP_CALC_KEY,
    SESSION_KEY,
];

/// Document storage keyed by name
pub trait KeyValueStore: Send {
    /// Read a document; `Ok(None)` if the key was never written
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the whole document stored under `key`
    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    /// Remove several keys; missing keys are not an error
    fn remove_many(&mut self, keys: &[&str]) -> Result<()>;
}

/// One `<key>.json` file per key inside a directory
pub struct FileKvStore {
    dir: PathBuf,
}

impl FileKvStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileKvStore {
    /// Read under a shared lock
    ///
    /// A document that cannot be opened or read logs a warning and is
    /// treated as absent.
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }

        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!("Unable to open {:?}: {}. Treating as empty.", path, e);
                return Ok(None);
            }
        };

        if let Err(e) = file.lock_shared() {
            tracing::warn!("Unable to lock {:?}: {}. Treating as empty.", path, e);
            return Ok(None);
        }

        let mut contents = String::new();
        let mut reader = std::io::BufReader::new(&file);
        if let Err(e) = reader.read_to_string(&mut contents) {
            let _ = file.unlock();
            tracing::warn!("Failed to read {:?}: {}. Treating as empty.", path, e);
            return Ok(None);
        }

        file.unlock()?;
        Ok(Some(contents))
    }

    /// Atomically replace a document by:
    /// 1. Writing to a temp file in the same directory
    /// 2. Syncing to disk
    /// 3. Renaming over the original
    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        let temp = NamedTempFile::new_in(&self.dir)?;
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            writer.write_all(value.as_bytes())?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;

        let path = self.path_for(key);
        temp.persist(&path).map_err(|e| Error::Io(e.error))?;

        tracing::trace!("Wrote {} ({} bytes)", key, value.len());
        Ok(())
    }

    /// Remove every key, even after a failure. Returns the first error.
    fn remove_many(&mut self, keys: &[&str]) -> Result<()> {
        let mut first_error = None;
        for key in keys {
            let path = self.path_for(key);
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!("Failed to remove {}: {}", key, e);
                    first_error.get_or_insert(Error::Io(e));
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// In-memory store for tests and ephemeral runs
///
/// Clones share contents, so a test can inspect what the store wrote.
#[derive(Clone, Default)]
pub struct MemoryKvStore {
    docs: Arc<Mutex<HashMap<String, String>>>,
    fail_writes: Arc<Mutex<bool>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with an IO error
    pub fn fail_writes(&self, fail: bool) {
        *self.fail_writes.lock() = fail;
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.docs.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.docs.lock().get(key).cloned()
    }

    fn check_writable(&self) -> Result<()> {
        if *self.fail_writes.lock() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "storage is read-only",
            )));
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.docs.lock().get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.check_writable()?;
        self.docs.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_many(&mut self, keys: &[&str]) -> Result<()> {
        self.check_writable()?;
        let mut docs = self.docs.lock();
        for key in keys {
            docs.remove(*key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = FileKvStore::new(temp_dir.path().join("data"));

        store.set(PROFILE_KEY, r#"{"name":"Sam"}"#).unwrap();

        let loaded = store.get(PROFILE_KEY).unwrap();
        assert_eq!(loaded.as_deref(), Some(r#"{"name":"Sam"}"#));
    }

    #[test]
    fn test_missing_key_is_none() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileKvStore::new(temp_dir.path());
        assert!(store.get(EVENTS_KEY).unwrap().is_none());
    }

    #[test]
    fn test_set_overwrites_whole_document() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = FileKvStore::new(temp_dir.path());

        store.set(EVENTS_KEY, "[1,2,3]").unwrap();
        store.set(EVENTS_KEY, "[]").unwrap();

        assert_eq!(store.get(EVENTS_KEY).unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = FileKvStore::new(temp_dir.path());

        store.set(BADGES_KEY, "[]").unwrap();

        let extras: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != "vapetrack_badges.json")
            .collect();
        assert!(extras.is_empty(), "Expected only the document, found {:?}", extras);
    }

    #[test]
    fn test_remove_many_ignores_missing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = FileKvStore::new(temp_dir.path());

        store.set(PROFILE_KEY, "{}").unwrap();
        store.remove_many(&ALL_KEYS).unwrap();

        assert!(store.get(PROFILE_KEY).unwrap().is_none());
    }

    #[test]
    fn test_remove_many_continues_past_failures() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = FileKvStore::new(temp_dir.path());

        store.set(PROFILE_KEY, "{}").unwrap();
        store.set(EVENTS_KEY, "[]").unwrap();
        // A directory where a document should be cannot be removed as a file
        std::fs::create_dir(temp_dir.path().join("stuck.json")).unwrap();

        let result = store.remove_many(&[PROFILE_KEY, "stuck", EVENTS_KEY]);

        assert!(result.is_err());
        assert!(store.get(PROFILE_KEY).unwrap().is_none());
        assert!(store.get(EVENTS_KEY).unwrap().is_none());
    }

    #[test]
    fn test_memory_store_write_failure() {
        let mut store = MemoryKvStore::new();
        store.set(PROFILE_KEY, "{}").unwrap();

        store.fail_writes(true);
        assert!(store.set(PROFILE_KEY, "{\"xp\":1}").is_err());
        assert_eq!(store.raw(PROFILE_KEY).as_deref(), Some("{}"));
    }
}
