//! Per-profile session identifier.
//!
//! The backend correlates every transcription, speech and avatar request of
//! one user through an opaque session id.  [`SessionManager`] hands out that
//! id: the first call generates one and persists it in a [`SessionStore`]
//! under the configured key; every later call (including from later
//! processes sharing the store) returns the stored value unchanged.
//!
//! There is no expiry, rotation or uniqueness check.

pub mod store;

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

pub use store::{FileSessionStore, MemorySessionStore, SessionError, SessionStore};

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// Opaque session token sent with every backend request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A fresh id: a random base-36 fragment followed by the current Unix
    /// time in milliseconds.
    pub fn generate() -> Self {
        const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

        let mut rng = rand::thread_rng();
        let fragment: String = (0..11)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();

        Self(format!("{fragment}{millis}"))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// SessionManager
// ---------------------------------------------------------------------------

/// Get-or-create access to the persisted session id.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    key: String,
    cached: Mutex<Option<SessionId>>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            cached: Mutex::new(None),
        }
    }

    /// Return the session id, creating and persisting it on first use.
    ///
    /// Store failures never fail the call: an unreadable store is treated as
    /// empty, and a failed write is logged while the generated id is still
    /// used for the lifetime of this manager.
    pub fn session_id(&self) -> SessionId {
        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(id) = cached.as_ref() {
            return id.clone();
        }

        let stored = match self.store.get(&self.key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                log::warn!("session: could not read store ({e}); starting a new session");
                None
            }
        };

        let id = match stored {
            Some(value) => SessionId::new(value),
            None => {
                let id = SessionId::generate();
                if let Err(e) = self.store.set(&self.key, id.as_str()) {
                    log::warn!("session: could not persist new session id: {e}");
                }
                log::info!("session: created new session under key {:?}", self.key);
                id
            }
        };

        *cached = Some(id.clone());
        id
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
