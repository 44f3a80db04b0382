//! `localStorage` backend for the engine's [`KeyValueStore`] seam.

use unfolds_engine::KeyValueStore;
use web_sys::Storage;

use crate::dom;

#[derive(Debug, thiserror::Error)]
pub enum WebStorageError {
    #[error("localStorage unavailable: {0}")]
    Unavailable(String),
    #[error("localStorage rejected {key}: {message}")]
    Rejected { key: String, message: String },
}

/// Browser `localStorage`, looked up on every call so a storage handle that
/// appears after startup (e.g. private mode toggles) is picked up.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorageStore;

impl LocalStorageStore {
    fn storage() -> Result<Storage, WebStorageError> {
        dom::local_storage()
            .map_err(|err| WebStorageError::Unavailable(dom::js_error_message(&err)))
    }

    fn rejected(key: &str, err: &wasm_bindgen::JsValue) -> WebStorageError {
        WebStorageError::Rejected {
            key: key.to_string(),
            message: dom::js_error_message(err),
        }
    }
}

impl KeyValueStore for LocalStorageStore {
    type Error = WebStorageError;

    fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
        Self::storage()?
            .get_item(key)
            .map_err(|err| Self::rejected(key, &err))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Self::Error> {
        Self::storage()?
            .set_item(key, value)
            .map_err(|err| Self::rejected(key, &err))
    }

    fn remove(&self, key: &str) -> Result<(), Self::Error> {
        Self::storage()?
            .remove_item(key)
            .map_err(|err| Self::rejected(key, &err))
    }
}
