use std::fs::{remove_file, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};

use crate::auth::error::{AuthError, AuthResult};
use crate::auth::persistence::AuthPersistence;

/// Stores every entry of an auth instance in one JSON object on disk.
#[derive(Clone)]
pub struct FilePersistence {
    path: Arc<PathBuf>,
    write_lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for FilePersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilePersistence").field("path", &self.path).finish()
    }
}

impl FilePersistence {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: Arc::new(path.as_ref().to_path_buf()),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    fn read_entries(&self) -> AuthResult<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }

        let mut file = File::open(&*self.path)
            .map_err(|err| AuthError::internal(format!("Failed to open auth persistence file: {err}")))?;
        let mut buffer = String::new();
        file.read_to_string(&mut buffer)
            .map_err(|err| AuthError::internal(format!("Failed to read auth persistence file: {err}")))?;

        if buffer.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&buffer) {
            Ok(Value::Object(entries)) => Ok(entries),
            Ok(_) => Err(AuthError::internal("Auth persistence file is not a JSON object")),
            Err(err) => Err(AuthError::internal(format!(
                "Failed to parse auth persistence payload: {err}"
            ))),
        }
    }

    fn write_entries(&self, entries: Map<String, Value>) -> AuthResult<()> {
        if entries.is_empty() {
            if self.path.exists() {
                remove_file(&*self.path).map_err(|err| {
                    AuthError::internal(format!("Failed to remove auth persistence file: {err}"))
                })?;
            }
            return Ok(());
        }

        let serialized = serde_json::to_string(&Value::Object(entries))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| {
                AuthError::internal(format!("Failed to create persistence directory: {err}"))
            })?;
        }
        let mut file = File::create(&*self.path).map_err(|err| {
            AuthError::internal(format!("Failed to create auth persistence file: {err}"))
        })?;
        file.write_all(serialized.as_bytes()).map_err(|err| {
            AuthError::internal(format!("Failed to write auth persistence file: {err}"))
        })
    }
}

impl AuthPersistence for FilePersistence {
    fn get(&self, key: &str) -> AuthResult<Option<Value>> {
        Ok(self.read_entries()?.remove(key))
    }

    fn set(&self, key: &str, value: Value) -> AuthResult<()> {
        let _guard = self.write_lock.lock().unwrap();
        let mut entries = self.read_entries()?;
        entries.insert(key.to_string(), value);
        self.write_entries(entries)
    }

    fn remove(&self, key: &str) -> AuthResult<()> {
        let _guard = self.write_lock.lock().unwrap();
        let mut entries = self.read_entries()?;
        if entries.remove(key).is_none() {
            return Ok(());
        }
        self.write_entries(entries)
    }
}
