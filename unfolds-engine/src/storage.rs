//! Persistence seams. Platform crates implement [`KeyValueStore`] over
//! whatever string storage they have; [`StoryLoader`] supplies bundled story
//! files.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use thiserror::Error;

use crate::error::PersistenceError;
use crate::schema::StoryDocument;

/// String key-value storage, shaped after the browser's `localStorage`.
pub trait KeyValueStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read a raw value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, Self::Error>;

    /// Write a raw value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store rejects the write.
    fn set(&self, key: &str, value: &str) -> Result<(), Self::Error>;

    /// Remove a key; missing keys are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store rejects the removal.
    fn remove(&self, key: &str) -> Result<(), Self::Error>;
}

/// Source of bundled story documents (e.g. `database.json`).
pub trait StoryLoader {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load every document the source provides.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read or parsed.
    fn load_documents(&self) -> Result<Vec<StoryDocument>, Self::Error>;
}

/// Deserialize the JSON stored under `key`.
///
/// # Errors
///
/// Returns a [`PersistenceError`] if the store fails or the value is not
/// valid JSON for `T`.
pub fn read_json<T, S>(store: &S, key: &str) -> Result<Option<T>, PersistenceError>
where
    T: DeserializeOwned,
    S: KeyValueStore + ?Sized,
{
    let Some(raw) = store
        .get(key)
        .map_err(|err| PersistenceError::storage(key, err))?
    else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| PersistenceError::Serialization {
            key: key.to_string(),
            source,
        })
}

/// Serialize `value` to JSON for `key` without writing it.
///
/// # Errors
///
/// Returns [`PersistenceError::Serialization`] if encoding fails.
pub fn encode_json<T: Serialize + ?Sized>(
    key: &str,
    value: &T,
) -> Result<String, PersistenceError> {
    serde_json::to_string(value).map_err(|source| PersistenceError::Serialization {
        key: key.to_string(),
        source,
    })
}

/// Write several keys, restoring the earlier ones if a later write fails.
///
/// # Errors
///
/// Returns the first write failure after the rollback attempt.
pub fn write_all<S>(store: &S, writes: &[(&str, String)]) -> Result<(), PersistenceError>
where
    S: KeyValueStore + ?Sized,
{
    let changes: Vec<_> = writes
        .iter()
        .map(|(key, value)| (*key, Some(value.as_str())))
        .collect();
    apply_all(store, &changes)
}

/// Remove several keys, restoring the earlier ones if a later removal fails.
///
/// # Errors
///
/// Returns the first removal failure after the rollback attempt.
pub fn remove_all<S>(store: &S, keys: &[&str]) -> Result<(), PersistenceError>
where
    S: KeyValueStore + ?Sized,
{
    let changes: Vec<_> = keys.iter().map(|key| (*key, None)).collect();
    apply_all(store, &changes)
}

/// `Some` sets the key, `None` removes it.
fn apply_all<S>(store: &S, changes: &[(&str, Option<&str>)]) -> Result<(), PersistenceError>
where
    S: KeyValueStore + ?Sized,
{
    let mut done: Vec<(&str, Option<String>)> = Vec::with_capacity(changes.len());
    for &(key, value) in changes {
        let outcome = store.get(key).and_then(|previous| {
            let applied = match value {
                Some(value) => store.set(key, value),
                None => store.remove(key),
            };
            applied.map(|()| previous)
        });
        match outcome {
            Ok(previous) => done.push((key, previous)),
            Err(err) => {
                rollback(store, &done);
                return Err(PersistenceError::storage(key, err));
            }
        }
    }
    Ok(())
}

fn rollback<S: KeyValueStore + ?Sized>(store: &S, done: &[(&str, Option<String>)]) {
    for (key, previous) in done.iter().rev() {
        let restored = match previous {
            Some(value) => store.set(key, value),
            None => store.remove(key),
        };
        if let Err(err) = restored {
            log::warn!("could not restore {key} after a failed write: {err}");
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("memory store rejected write to {key}")]
pub struct MemoryStoreError {
    pub key: String,
}

/// In-memory [`KeyValueStore`]; clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Rc<RefCell<BTreeMap<String, String>>>,
    failing: Rc<RefCell<BTreeSet<String>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later write or removal of `key` fail.
    pub fn fail_writes_to(&self, key: &str) {
        self.failing.borrow_mut().insert(key.to_string());
    }

    pub fn heal(&self) {
        self.failing.borrow_mut().clear();
    }

    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn check(&self, key: &str) -> Result<(), MemoryStoreError> {
        if self.failing.borrow().contains(key) {
            Err(MemoryStoreError {
                key: key.to_string(),
            })
        } else {
            Ok(())
        }
    }
}

impl KeyValueStore for MemoryStore {
    type Error = MemoryStoreError;

    fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
        Ok(self.raw(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Self::Error> {
        self.check(key)?;
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Self::Error> {
        self.check(key)?;
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}
