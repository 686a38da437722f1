//! Browser `localStorage` implementation for WebAssembly.

use super::{Storage, StorageError, StorageResult};
use wasm_bindgen::JsValue;

fn js_err(context: &str, err: JsValue) -> StorageError {
    StorageError::Other(format!("{}: {:?}", context, err))
}

/// `window.localStorage` backed storage.
pub struct LocalStorage {
    inner: web_sys::Storage,
}

impl LocalStorage {
    /// Bind to the window's local storage.
    pub fn new() -> StorageResult<Self> {
        let window =
            web_sys::window().ok_or_else(|| StorageError::Other("No window object".to_string()))?;
        let inner = window
            .local_storage()
            .map_err(|e| js_err("localStorage error", e))?
            .ok_or_else(|| StorageError::Other("localStorage not available".to_string()))?;
        Ok(Self { inner })
    }
}

impl Storage for LocalStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.inner
            .get_item(key)
            .map_err(|e| js_err("Failed to read item", e))
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.inner
            .set_item(key, value)
            .map_err(|e| js_err("Failed to write item", e))
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.inner
            .remove_item(key)
            .map_err(|e| js_err("Failed to remove item", e))
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        let len = self
            .inner
            .length()
            .map_err(|e| js_err("Failed to read length", e))?;
        let mut keys = Vec::with_capacity(len as usize);
        for index in 0..len {
            if let Some(key) = self
                .inner
                .key(index)
                .map_err(|e| js_err("Failed to read key", e))?
            {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}
