//! Cross-platform key/value storage in two persistence tiers.
//!
//! - Session tier: lives as long as the tab (web: `sessionStorage`) or the
//!   process (native: [`MemoryStore`]).
//! - Durable tier: survives restarts (web: `localStorage`; native: JSON files
//!   in the platform config directory, see [`FileStore`]):
//!   - Linux: `~/.config/campusnet/`
//!   - macOS: `~/Library/Application Support/campusnet/`
//!   - Windows: `%APPDATA%\campusnet\`

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{de::DeserializeOwned, Serialize};

/// A string key/value store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    /// Returns `true` if the value was stored.
    fn set(&self, key: &str, value: &str) -> bool;
    fn remove(&self, key: &str);
}

/// Save a value as JSON. Returns `true` if the operation succeeded.
pub fn save<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> bool {
    match serde_json::to_string(value) {
        Ok(json) => store.set(key, &json),
        Err(_) => false,
    }
}

/// Load a JSON value. Returns `None` if the key doesn't exist or
/// deserialization fails.
pub fn load<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let json = store.get(key)?;
    serde_json::from_str(&json).ok()
}

/// In-memory store, the native session tier.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> bool {
        match self.values.lock() {
            Ok(mut values) => {
                values.insert(key.to_string(), value.to_string());
                true
            }
            Err(_) => false,
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.remove(key);
        }
    }
}

// =========================================
// Desktop (native) durable tier
// =========================================

/// One file per key inside a directory, the native durable tier.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: std::path::PathBuf,
}

#[cfg(not(target_arch = "wasm32"))]
impl FileStore {
    /// Store rooted at an explicit directory.
    pub fn at(dir: impl Into<std::path::PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store under the platform config directory, e.g. `~/.config/<app_name>`.
    pub fn in_config_dir(app_name: &str) -> Option<Self> {
        let config_dir = dirs::config_dir()?;
        Some(Self::at(config_dir.join(app_name)))
    }

    fn file_path(&self, key: &str) -> Option<std::path::PathBuf> {
        // Ensure the directory exists
        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir).ok()?;
        }
        // Sanitize key to be a valid filename
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        Some(self.dir.join(format!("{}.json", safe_key)))
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        let path = self.file_path(key)?;
        std::fs::read_to_string(path).ok()
    }

    fn set(&self, key: &str, value: &str) -> bool {
        let Some(path) = self.file_path(key) else {
            return false;
        };
        std::fs::write(path, value).is_ok()
    }

    fn remove(&self, key: &str) {
        if let Some(path) = self.file_path(key) {
            let _ = std::fs::remove_file(path);
        }
    }
}

// =========================================
// Web (WASM) tiers
// =========================================

#[cfg(target_arch = "wasm32")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WebStorageKind {
    Session,
    Local,
}

/// Browser `sessionStorage` / `localStorage`.
#[cfg(target_arch = "wasm32")]
#[derive(Debug, Clone, Copy)]
pub struct WebStorage {
    kind: WebStorageKind,
}

#[cfg(target_arch = "wasm32")]
impl WebStorage {
    /// Cleared when the tab ends.
    pub fn session() -> Self {
        Self {
            kind: WebStorageKind::Session,
        }
    }

    /// Survives browser restarts.
    pub fn local() -> Self {
        Self {
            kind: WebStorageKind::Local,
        }
    }

    fn storage(&self) -> Option<web_sys::Storage> {
        let window = web_sys::window()?;
        match self.kind {
            WebStorageKind::Session => window.session_storage().ok()?,
            WebStorageKind::Local => window.local_storage().ok()?,
        }
    }
}

#[cfg(target_arch = "wasm32")]
impl KeyValueStore for WebStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.storage()?.get_item(key).ok()?
    }

    fn set(&self, key: &str, value: &str) -> bool {
        self.storage()
            .map(|s| s.set_item(key, value).is_ok())
            .unwrap_or(false)
    }

    fn remove(&self, key: &str) {
        if let Some(storage) = self.storage() {
            let _ = storage.remove_item(key);
        }
    }
}
