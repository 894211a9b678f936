//! Key/value stores that hold the persisted session identifier.
//!
//! [`FileSessionStore`] keeps a flat TOML table on disk so several widgets
//! (each with its own `session_key`) can share one file.
//! [`MemorySessionStore`] is the in-process equivalent used by tests and as a
//! fallback when no config directory is writable.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

// ---------------------------------------------------------------------------
// SessionError
// ---------------------------------------------------------------------------

/// Errors raised while reading or writing a session store.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("session store is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialise session store: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ---------------------------------------------------------------------------
// SessionStore trait
// ---------------------------------------------------------------------------

/// Persistent string map, the native stand-in for browser local storage.
pub trait SessionStore: Send + Sync {
    /// Value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>, SessionError>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), SessionError>;
}

// ---------------------------------------------------------------------------
// FileSessionStore
// ---------------------------------------------------------------------------

/// TOML-file backed store.
///
/// ```toml
/// ai_avatar_session = "k3j9x0a2b1711111111111"
/// daylily_session_id = "p0o9i8u71711111112222"
/// ```
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    // Serialises read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_table(&self) -> Result<BTreeMap<String, String>, SessionError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(toml::from_str(&content)?)
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.read_table()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut table = self.read_table()?;
        table.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, toml::to_string(&table)?)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemorySessionStore
// ---------------------------------------------------------------------------

/// Process-local store; contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_store_missing_file_reads_as_empty() {
        let dir = tempdir().expect("temp dir");
        let store = FileSessionStore::new(dir.path().join("session.toml"));
        assert_eq!(store.get("ai_avatar_session").unwrap(), None);
    }

    #[test]
    fn file_store_keeps_independent_keys() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("session.toml");
        let store = FileSessionStore::new(&path);

        store.set("widget_a", "aaa").unwrap();
        store.set("widget_b", "bbb").unwrap();
        store.set("widget_a", "ccc").unwrap();

        let reopened = FileSessionStore::new(&path);
        assert_eq!(reopened.get("widget_a").unwrap().as_deref(), Some("ccc"));
        assert_eq!(reopened.get("widget_b").unwrap().as_deref(), Some("bbb"));
    }

    #[test]
    fn file_store_reports_corrupt_file() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("session.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();

        let store = FileSessionStore::new(&path);
        assert!(matches!(store.get("k"), Err(SessionError::Parse(_))));
    }

    #[test]
    fn memory_store_set_then_get() {
        let store = MemorySessionStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }
}
