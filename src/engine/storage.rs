//! Client storage readers.
//!
//! Compiled conditions only ever *read* client state. The browser-side shape is
//! a persistent store with a secondary fallback store behind it (local storage,
//! then cookies); [`LayeredStorage`] mirrors that lookup order.

use std::collections::HashMap;

/// Read-only key/value lookup consumed by condition evaluation.
pub trait StorageReader {
    fn read(&self, key: &str) -> Option<String>;
}

impl<S: StorageReader + ?Sized> StorageReader for &S {
    fn read(&self, key: &str) -> Option<String> {
        (**self).read(key)
    }
}

impl StorageReader for HashMap<String, String> {
    fn read(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// In-memory store, e.g. a snapshot of a visitor's storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, String)> for MemoryStorage {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self { entries: iter.into_iter().collect() }
    }
}

impl StorageReader for MemoryStorage {
    fn read(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }
}

/// Primary store first, secondary store when the primary has no entry.
#[derive(Debug, Clone, Default)]
pub struct LayeredStorage<P, S> {
    primary: P,
    secondary: S,
}

impl<P: StorageReader, S: StorageReader> LayeredStorage<P, S> {
    pub fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary }
    }
}

impl<P: StorageReader, S: StorageReader> StorageReader for LayeredStorage<P, S> {
    fn read(&self, key: &str) -> Option<String> {
        self.primary.read(key).or_else(|| self.secondary.read(key))
    }
}
