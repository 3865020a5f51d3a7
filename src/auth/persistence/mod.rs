use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

use crate::auth::error::AuthResult;

#[cfg(not(target_arch = "wasm32"))]
mod file;

#[cfg(not(target_arch = "wasm32"))]
pub use file::FilePersistence;

/// Prefix of the persisted signed-in user entry.
pub const AUTH_USER_KEY_PREFIX: &str = "firebase:authUser";
/// Prefix of the persisted user that started a pending link/reauth redirect.
pub const REDIRECT_USER_KEY_PREFIX: &str = "firebase:redirectUser";
/// Prefix of the flag set while a redirect flow is on its way back.
pub const PENDING_REDIRECT_KEY_PREFIX: &str = "firebase:pendingRedirect";

/// Builds the storage key of one entry for the auth instance identified by `auth_key`.
pub fn persistence_key(prefix: &str, auth_key: &str) -> String {
    format!("{prefix}:{auth_key}")
}

/// Key-value storage backend for serialized authentication state.
///
/// Library consumers can implement this trait to plug in platform-specific
/// storage (local storage shims, keychains, databases). Values are JSON
/// documents; an absent key reads as `None`.
pub trait AuthPersistence: Send + Sync {
    fn get(&self, key: &str) -> AuthResult<Option<Value>>;
    fn set(&self, key: &str, value: Value) -> AuthResult<()>;
    fn remove(&self, key: &str) -> AuthResult<()>;
}

/// Process-local persistence. Contents vanish with the process.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    entries: Mutex<HashMap<String, Value>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuthPersistence for InMemoryPersistence {
    fn get(&self, key: &str) -> AuthResult<Option<Value>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> AuthResult<()> {
        self.entries.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> AuthResult<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}
